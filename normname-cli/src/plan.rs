use anyhow::Result;
use normname_core::{plan_operation, OperationContext, OutputFormatter, ScanOptions};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::Incomplete;

pub fn handle_plan(
    dir: &Path,
    scan: &ScanOptions,
    context: &OperationContext,
    output: OutputFormat,
) -> Result<()> {
    let result = plan_operation(dir, scan, context)?;
    print!("{}", result.format(output.into()));

    if result.plan.has_conflicts() {
        return Err(Incomplete(format!(
            "{} entries have conflicts and would not be renamed",
            result.plan.conflict_count()
        ))
        .into());
    }

    Ok(())
}
