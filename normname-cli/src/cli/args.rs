use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use super::types::OutputFormat;

/// Normalize file names in bulk: strip diacritics, lowercase, clean up
/// punctuation and spacing, with a preview first and undo afterwards
#[derive(Parser, Debug)]
#[command(name = "normname")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding config.toml and history (default: ./.normname)
    #[arg(long, global = true, env = "NORMNAME_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Summary)]
    pub output: OutputFormat,
}

/// Which entries to scan
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Include all descendants, not only immediate children
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Include names starting with a dot
    #[arg(long)]
    pub hidden: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the proposed renames for a directory without changing anything
    Plan {
        /// Directory to scan
        dir: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Preview, confirm and rename
    Apply {
        /// Directory to scan
        dir: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,

        /// Report what would happen without renaming anything
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation
        #[arg(short = 'y', long = "yes", env = "NORMNAME_YES")]
        yes: bool,
    },

    /// Undo the most recent batch
    Undo {
        /// Only consider operations on this directory
        dir: Option<PathBuf>,
    },

    /// List recorded operations, newest first
    History {
        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the latest operation and whether it can be undone
    Status {
        /// Only consider operations on this directory
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["normname", "apply", "photos", "-r", "--dry-run", "-y"]);
        match cli.command {
            Commands::Apply {
                dir,
                scan,
                dry_run,
                yes,
            } => {
                assert_eq!(dir, PathBuf::from("photos"));
                assert!(scan.recursive);
                assert!(!scan.hidden);
                assert!(dry_run);
                assert!(yes);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["normname", "history", "--output", "json", "-vv"]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
    }
}
