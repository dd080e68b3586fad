use super::OperationContext;
use crate::guard;
use crate::output::{HistoryItem, StatusResult};
use crate::scanner::resolve_root;
use anyhow::Result;
use std::path::Path;

/// Status operation - latest record and whether it can still be undone
pub fn status_operation(folder: Option<&Path>, context: &OperationContext) -> Result<StatusResult> {
    let folder = folder.map(resolve_root).transpose()?;
    let history = context.history();
    let status = history.status(folder.as_deref())?;

    let last_operation = match &status.latest {
        Some(record) => Some(HistoryItem::from_record(record, history.is_undone(&record.id)?)),
        None => None,
    };

    Ok(StatusResult {
        folder: folder.as_ref().map(|f| f.display().to_string()),
        last_operation,
        undoable: status.undoable,
        history_count: status.total_records,
        busy: folder.as_deref().is_some_and(guard::is_busy),
    })
}
