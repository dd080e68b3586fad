use anyhow::{anyhow, Result};
use normname_core::{
    apply_operation, plan_operation, CancellationToken, ExecuteOptions, OperationContext,
    OutputFormatter, Progress, ScanOptions,
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::Incomplete;

pub fn handle_apply(
    dir: &Path,
    scan: &ScanOptions,
    dry_run: bool,
    yes: bool,
    context: &OperationContext,
    output: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let planned = plan_operation(dir, scan, context)?;
    let plan = &planned.plan;

    if output == OutputFormat::Summary {
        print!("{}", planned.format_summary());
    }

    if plan.pending_count() > 0 && !dry_run && !yes {
        let confirmed = if io::stdin().is_terminal() {
            confirm(plan.pending_count(), &mut io::stdin().lock())?
        } else {
            return Err(anyhow!(
                "Refusing to rename without confirmation; pass --yes to proceed"
            ));
        };
        if !confirmed {
            eprintln!("Aborted, nothing was renamed");
            return Ok(());
        }
    }

    let show_progress = output == OutputFormat::Summary && io::stderr().is_terminal();
    let mut progress = |p: Progress| {
        if show_progress {
            eprint!("\r[{}/{}] {}", p.done, p.total, p.entry.target.display());
            if p.done == p.total {
                eprintln!();
            }
        }
    };

    let applied = apply_operation(
        plan,
        ExecuteOptions { dry_run },
        &mut progress,
        cancel,
        context,
    )?;
    if show_progress && applied.result.was_cancelled() {
        eprintln!();
    }

    print!("{}", applied.format(output.into()));

    let result = &applied.result;
    if let Some(error) = &result.history_error {
        return Err(anyhow!("Renames completed but were not recorded: {error}"));
    }
    if result.failed() > 0 || result.cancelled() > 0 || plan.has_conflicts() {
        return Err(Incomplete(format!(
            "{} failed, {} cancelled, {} blocked by conflicts",
            result.failed(),
            result.cancelled(),
            plan.conflict_count()
        ))
        .into());
    }

    Ok(())
}

fn confirm<R: BufRead>(pending: usize, input: &mut R) -> Result<bool> {
    eprint!("Rename {} items? [y/N] ", pending);
    io::stderr().flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_accepts_yes() {
        assert!(confirm(3, &mut "y\n".as_bytes()).unwrap());
        assert!(confirm(3, &mut "YES\n".as_bytes()).unwrap());
    }

    #[test]
    fn test_confirm_defaults_to_no() {
        assert!(!confirm(3, &mut "\n".as_bytes()).unwrap());
        assert!(!confirm(3, &mut "nope\n".as_bytes()).unwrap());
        assert!(!confirm(3, &mut "".as_bytes()).unwrap());
    }
}
