use anyhow::Result;
use normname_core::{status_operation, OperationContext, OutputFormatter};
use std::path::Path;

use crate::cli::OutputFormat;

pub fn handle_status(
    dir: Option<&Path>,
    context: &OperationContext,
    output: OutputFormat,
) -> Result<()> {
    let result = status_operation(dir, context)?;
    print!("{}", result.format(output.into()));
    Ok(())
}
