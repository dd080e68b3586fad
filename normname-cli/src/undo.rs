use anyhow::{anyhow, Result};
use normname_core::{undo_operation, CancellationToken, OperationContext, OutputFormatter};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::Incomplete;

pub fn handle_undo(
    dir: Option<&Path>,
    context: &OperationContext,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = undo_operation(dir, &mut |_| {}, cancel, context)?;
    print!("{}", result.format(output.into()));

    if let Some(error) = &result.result.history_error {
        return Err(anyhow!("Files were restored but the undo was not recorded: {error}"));
    }
    if !result.result.is_complete_success() {
        return Err(Incomplete(format!(
            "{} entries could not be restored",
            result.result.failed() + result.result.cancelled()
        ))
        .into());
    }

    Ok(())
}
