use anyhow::Result;
use normname_core::{history_operation, OperationContext, OutputFormatter};

use crate::cli::OutputFormat;

pub fn handle_history(
    limit: Option<usize>,
    context: &OperationContext,
    output: OutputFormat,
) -> Result<()> {
    let result = history_operation(limit, context)?;
    print!("{}", result.format(output.into()));
    Ok(())
}
