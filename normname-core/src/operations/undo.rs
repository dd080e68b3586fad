use super::OperationContext;
use crate::cancel::CancellationToken;
use crate::executor::{ExecutionResult, Progress};
use crate::output::UndoResult;
use crate::scanner::resolve_root;
use anyhow::{Context, Result};
use std::path::Path;

/// Undo operation - reverses the newest recorded batch, for `folder` or for
/// any folder when none is given
pub fn undo_operation(
    folder: Option<&Path>,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancellationToken,
    context: &OperationContext,
) -> Result<UndoResult> {
    let folder = folder
        .map(|f| resolve_root(f).with_context(|| format!("Invalid folder {}", f.display())))
        .transpose()?;

    let engine = context.engine();
    let Some((record, result)) = engine.undo_latest(folder.as_deref(), progress, cancel)? else {
        return Ok(UndoResult {
            undone_id: None,
            undo_id: None,
            result: ExecutionResult::empty(folder.as_deref().unwrap_or_else(|| Path::new("."))),
            use_color: context.use_color,
        });
    };

    Ok(UndoResult {
        undone_id: Some(record.id),
        undo_id: result.operation_id.clone(),
        result,
        use_color: context.use_color,
    })
}
