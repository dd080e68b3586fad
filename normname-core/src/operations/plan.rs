use super::OperationContext;
use crate::output::PlanResult;
use crate::scanner::ScanOptions;
use anyhow::{Context, Result};
use std::path::Path;

/// Plan operation - scans `dir` and builds a plan without touching anything
pub fn plan_operation(
    dir: &Path,
    scan: &ScanOptions,
    context: &OperationContext,
) -> Result<PlanResult> {
    let engine = context.engine();
    let (plan, report) = engine
        .plan(dir, scan)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    Ok(PlanResult {
        plan,
        unreadable: report.skipped,
        use_color: context.use_color,
    })
}
