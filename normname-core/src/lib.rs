#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod guard;
pub mod history;
pub mod normalize;
pub mod operations;
pub mod output;
pub mod plan;
pub mod scanner;
pub mod undo;

pub use cancel::CancellationToken;
pub use config::{resolve_state_dir, Config, HistoryConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use executor::{
    EntryOutcome, EntryStatus, ExecuteOptions, ExecutionHandle, ExecutionResult, Executor,
    Filesystem, Progress, RealFilesystem, RenameOp,
};
pub use guard::FolderGuard;
pub use history::{HistoryStatus, HistoryStore, OperationKind, OperationRecord, RecordEntry};
pub use normalize::{normalize, normalize_steps, normalize_with, NormalizeRules, NormalizeStep};
pub use operations::{
    apply_operation, history_operation, plan_operation, status_operation, undo_operation,
    OperationContext,
};
pub use output::{
    ApplyResult, HistoryItem, HistoryResult, OutputFormat, OutputFormatter, PlanResult,
    StatusResult, UndoResult,
};
pub use plan::{build_plan, ConflictReason, EntryState, RenameConflict, RenameEntry, RenamePlan};
pub use scanner::{scan, FileRecord, ScanOptions, ScanReport, SkippedEntry};
pub use undo::UndoEngine;
