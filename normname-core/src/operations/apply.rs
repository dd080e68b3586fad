use super::OperationContext;
use crate::cancel::CancellationToken;
use crate::executor::{ExecuteOptions, Progress};
use crate::output::ApplyResult;
use crate::plan::RenamePlan;
use anyhow::Result;
use std::sync::mpsc;

/// Apply operation - executes a previewed plan and records it in history.
///
/// The batch runs on the engine's background worker; progress events are
/// forwarded to `progress` on the calling thread as they arrive.
pub fn apply_operation(
    plan: &RenamePlan,
    options: ExecuteOptions,
    progress: &mut dyn FnMut(Progress),
    cancel: &CancellationToken,
    context: &OperationContext,
) -> Result<ApplyResult> {
    let engine = context.engine();
    let (tx, rx) = mpsc::channel();

    let handle = engine.spawn_execute(
        plan.clone(),
        options,
        move |event| {
            // The receiver outlives the worker
            let _ = tx.send(event);
        },
        cancel.clone(),
    )?;

    // Ends when the worker drops its sender
    for event in rx {
        progress(event);
    }
    let result = handle.join()?;

    Ok(ApplyResult {
        operation_id: result.operation_id.clone(),
        result,
        use_color: context.use_color,
    })
}
