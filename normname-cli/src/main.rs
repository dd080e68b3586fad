use anyhow::Result;
use clap::Parser;
use normname_core::output::should_use_color;
use normname_core::{CancellationToken, EngineError, OperationContext, ScanOptions};
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

mod apply;
mod cli;
mod history;
mod plan;
mod status;
mod undo;

use cli::args::ScanArgs;
use cli::{Cli, Commands};

/// The command ran but left some entries unrenamed (conflicts, failures
/// or cancellation)
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Incomplete(pub String);

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing the current rename...");
        handler_token.cancel();
    }) {
        tracing::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let use_color = should_use_color(cli.no_color.then_some(false));

    let result = run(cli, use_color, &cancel);

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(exit_code(&e));
        },
    }
}

fn run(cli: Cli, use_color: bool, cancel: &CancellationToken) -> Result<()> {
    let context = OperationContext::load(cli.state_dir.as_deref(), use_color)?;
    let output = cli.output;

    match cli.command {
        Commands::Plan { dir, scan } => {
            let options = scan_options(&context, &scan);
            plan::handle_plan(&dir, &options, &context, output)
        },
        Commands::Apply {
            dir,
            scan,
            dry_run,
            yes,
        } => {
            let options = scan_options(&context, &scan);
            apply::handle_apply(&dir, &options, dry_run, yes, &context, output, cancel)
        },
        Commands::Undo { dir } => undo::handle_undo(dir.as_deref(), &context, output, cancel),
        Commands::History { limit } => history::handle_history(limit, &context, output),
        Commands::Status { dir } => status::handle_status(dir.as_deref(), &context, output),
    }
}

/// Flags switch options on; they never switch off what config.toml enabled
fn scan_options(context: &OperationContext, args: &ScanArgs) -> ScanOptions {
    let mut options = context.config.scan.clone();
    options.recursive |= args.recursive;
    options.include_hidden |= args.hidden;
    options
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "warn,normname_core=info",
            _ => "debug",
        })
    });

    // A second init (tests driving main twice) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<Incomplete>().is_some() {
        return 1;
    }
    match error.downcast_ref::<EngineError>() {
        Some(
            EngineError::RootNotFound(_)
            | EngineError::RootNotDirectory(_)
            | EngineError::NotUndoable(..),
        ) => 2,
        Some(EngineError::OperationInProgress(_)) => 1,
        _ => 3,
    }
}
