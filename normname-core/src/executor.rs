use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::plan::RenamePlan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Filesystem calls the executor depends on
pub trait Filesystem: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Whether anything exists at `path`, without following symlinks
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

/// A single rename the executor is asked to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOp {
    pub source: PathBuf,
    pub target: PathBuf,
    pub is_dir: bool,
    /// Source and target name the same file on a case-insensitive filesystem
    #[serde(default)]
    pub case_only: bool,
}

impl RenameOp {
    /// Pending plan entries in execution order
    pub fn from_plan(plan: &RenamePlan) -> Vec<Self> {
        plan.pending_in_order()
            .map(|entry| Self {
                source: entry.source.path.clone(),
                target: entry.target_path.clone(),
                is_dir: entry.source.is_dir,
                case_only: plan.case_insensitive_fs && entry.is_case_only(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Failed,
    Cancelled,
}

/// What happened to one rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub source: PathBuf,
    pub target: PathBuf,
    pub is_dir: bool,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EntryOutcome {
    fn new(op: &RenameOp, status: EntryStatus) -> Self {
        Self {
            source: op.source.clone(),
            target: op.target.clone(),
            is_dir: op.is_dir,
            status,
            error_kind: None,
            detail: None,
        }
    }

    fn failed(op: &RenameOp, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            detail: Some(detail.into()),
            ..Self::new(op, EntryStatus::Failed)
        }
    }
}

/// Aggregate result of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub folder: PathBuf,
    /// One outcome per attempted or cancelled rename, in execution order
    pub outcomes: Vec<EntryOutcome>,
    /// Plan entries that were never eligible (skipped or conflicted)
    pub not_executed: usize,
    pub dry_run: bool,
    /// History record written for this batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Set when the renames happened but could not be recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

impl ExecutionResult {
    pub fn empty(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            outcomes: Vec::new(),
            not_executed: 0,
            dry_run: false,
            operation_id: None,
            history_error: None,
        }
    }

    fn count(&self, status: EntryStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(EntryStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(EntryStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(EntryStatus::Cancelled)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled() > 0
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == EntryStatus::Success)
    }

    /// Attach the outcome of writing this result to history.
    ///
    /// The renames have already happened, so a failed write is kept on the
    /// result instead of replacing it.
    pub(crate) fn note_recorded(&mut self, recorded: EngineResult<String>) {
        match recorded {
            Ok(id) => {
                tracing::info!("Recorded operation {}", id);
                self.operation_id = Some(id);
            },
            Err(e) => {
                tracing::warn!("Renames in {} were not recorded: {}", self.folder.display(), e);
                self.history_error = Some(e.to_string());
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// Validate and report without renaming anything
    pub dry_run: bool,
}

/// Sent to the progress callback after each entry
#[derive(Debug, Clone)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub entry: EntryOutcome,
}

/// Applies rename batches one entry at a time
#[derive(Clone)]
pub struct Executor {
    fs: Arc<dyn Filesystem>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Arc::new(RealFilesystem))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }

    /// Execute the pending entries of a plan
    pub fn execute_plan(
        &self,
        plan: &RenamePlan,
        options: ExecuteOptions,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let ops = RenameOp::from_plan(plan);
        let mut result = self.run(&plan.root, &ops, options, progress, cancel);
        result.not_executed = plan.entries.len() - ops.len();
        result
    }

    /// Execute renames strictly in the given order.
    ///
    /// A failed entry never stops the batch. Cancellation is observed
    /// between entries; every entry not yet attempted is reported as
    /// cancelled.
    pub fn run(
        &self,
        folder: &Path,
        ops: &[RenameOp],
        options: ExecuteOptions,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let total = ops.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut sim = DryRunState::default();

        tracing::info!(
            folder = %folder.display(),
            total,
            dry_run = options.dry_run,
            "Starting batch"
        );

        for (i, op) in ops.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Cancelled after {} of {} entries", i, total);
                outcomes.extend(
                    ops[i..]
                        .iter()
                        .map(|op| EntryOutcome::new(op, EntryStatus::Cancelled)),
                );
                break;
            }

            let outcome = if options.dry_run {
                self.simulate(op, &mut sim)
            } else {
                self.apply(op)
            };

            progress(Progress {
                done: i + 1,
                total,
                entry: outcome.clone(),
            });
            outcomes.push(outcome);
        }

        let result = ExecutionResult {
            folder: folder.to_path_buf(),
            outcomes,
            not_executed: 0,
            dry_run: options.dry_run,
            operation_id: None,
            history_error: None,
        };

        tracing::info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            cancelled = result.cancelled(),
            "Batch finished"
        );

        result
    }

    /// Check the source is still there and the target still free
    fn revalidate(
        &self,
        op: &RenameOp,
        exists: impl Fn(&Path) -> bool,
    ) -> Result<(), EntryOutcome> {
        if !exists(&op.source) {
            return Err(EntryOutcome::failed(
                op,
                ErrorKind::SourceMissing,
                format!("{} no longer exists", op.source.display()),
            ));
        }
        if !op.case_only && exists(&op.target) {
            return Err(EntryOutcome::failed(
                op,
                ErrorKind::TargetConflict,
                format!("{} already exists", op.target.display()),
            ));
        }
        Ok(())
    }

    fn apply(&self, op: &RenameOp) -> EntryOutcome {
        if let Err(outcome) = self.revalidate(op, |p| self.fs.exists(p)) {
            tracing::warn!(
                "Skipping {}: {}",
                op.source.display(),
                outcome.detail.as_deref().unwrap_or_default()
            );
            return outcome;
        }

        tracing::debug!("Renaming {} -> {}", op.source.display(), op.target.display());

        match self.perform_rename(op) {
            Ok(()) => EntryOutcome::new(op, EntryStatus::Success),
            Err(e) => {
                let kind = ErrorKind::classify(&e);
                tracing::warn!(
                    "Failed to rename {} -> {}: {} ({})",
                    op.source.display(),
                    op.target.display(),
                    e,
                    kind
                );
                EntryOutcome::failed(op, kind, e.to_string())
            },
        }
    }

    fn perform_rename(&self, op: &RenameOp) -> io::Result<()> {
        if !op.case_only {
            return self.fs.rename(&op.source, &op.target);
        }

        // Case-only change on a case-insensitive filesystem: go through a
        // temporary name so the filesystem sees two distinct renames
        let temp = temp_name_for(&op.source);
        tracing::debug!("Case-only rename, using temp: {}", temp.display());

        self.fs.rename(&op.source, &temp)?;
        if let Err(e) = self.fs.rename(&temp, &op.target) {
            // Put the file back under its original name
            if let Err(restore) = self.fs.rename(&temp, &op.source) {
                tracing::warn!(
                    "Could not restore {} from {}: {}",
                    op.source.display(),
                    temp.display(),
                    restore
                );
            }
            return Err(e);
        }
        Ok(())
    }

    fn simulate(&self, op: &RenameOp, sim: &mut DryRunState) -> EntryOutcome {
        let exists = |p: &Path| sim.exists(p, self.fs.as_ref());
        if let Err(outcome) = self.revalidate(op, exists) {
            return outcome;
        }
        sim.vacated.insert(op.source.clone());
        sim.created.insert(op.target.clone());
        sim.vacated.remove(&op.target);
        EntryOutcome::new(op, EntryStatus::Success)
    }
}

/// Paths a dry run pretends to have moved
#[derive(Default)]
struct DryRunState {
    vacated: HashSet<PathBuf>,
    created: HashSet<PathBuf>,
}

impl DryRunState {
    fn exists(&self, path: &Path, fs: &dyn Filesystem) -> bool {
        if self.created.contains(path) && !self.vacated.contains(path) {
            return true;
        }
        !self.vacated.contains(path) && fs.exists(path)
    }
}

fn temp_name_for(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!(".{}.{}.normname.tmp", name, std::process::id()))
}

/// A batch running on a background thread
#[derive(Debug)]
pub struct ExecutionHandle {
    handle: JoinHandle<EngineResult<ExecutionResult>>,
    cancel: CancellationToken,
}

impl ExecutionHandle {
    pub(crate) fn new(
        handle: JoinHandle<EngineResult<ExecutionResult>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { handle, cancel }
    }

    /// Ask the batch to stop before its next entry
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the batch to finish
    pub fn join(self) -> EngineResult<ExecutionResult> {
        self.handle
            .join()
            .unwrap_or(Err(EngineError::WorkerPanicked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizeRules;
    use crate::plan::build_plan;
    use crate::scanner::{scan, ScanOptions};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn noop(_: Progress) {}

    fn plan_in(root: &Path) -> RenamePlan {
        let report = scan(root, &ScanOptions::default()).unwrap();
        build_plan(&report.root, report.records, &NormalizeRules::default())
    }

    /// Wraps the real filesystem and records every rename
    #[derive(Default)]
    struct RecordingFs {
        renames: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl Filesystem for RecordingFs {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.renames
                .lock()
                .unwrap()
                .push((from.to_path_buf(), to.to_path_buf()));
            fs::rename(from, to)
        }

        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    #[test]
    fn test_executes_pending_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Nguyễn Văn A.txt"), "a").unwrap();
        fs::write(root.join("already.txt"), "b").unwrap();

        let plan = plan_in(root);
        let mut events = Vec::new();
        let result = Executor::default().execute_plan(
            &plan,
            ExecuteOptions::default(),
            &mut |p| events.push((p.done, p.total)),
            &CancellationToken::new(),
        );

        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.not_executed, 1);
        assert_eq!(events, vec![(1, 1)]);
        assert!(root.join("nguyen van a.txt").exists());
        assert!(!root.join("Nguyễn Văn A.txt").exists());
    }

    #[test]
    fn test_revalidation_catches_external_changes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Gone.txt"), "a").unwrap();
        fs::write(root.join("Taken.txt"), "b").unwrap();

        let plan = plan_in(root);
        fs::remove_file(root.join("Gone.txt")).unwrap();
        fs::write(root.join("taken.txt"), "someone else").unwrap();

        let result = Executor::default().execute_plan(
            &plan,
            ExecuteOptions::default(),
            &mut noop,
            &CancellationToken::new(),
        );

        let kinds: Vec<_> = result.outcomes.iter().map(|o| o.error_kind).collect();
        if plan.case_insensitive_fs {
            // taken.txt and Taken.txt are the same file here
            assert_eq!(kinds[0], Some(ErrorKind::SourceMissing));
        } else {
            assert_eq!(
                kinds,
                vec![Some(ErrorKind::SourceMissing), Some(ErrorKind::TargetConflict)]
            );
            assert_eq!(fs::read_to_string(root.join("taken.txt")).unwrap(), "someone else");
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("A.txt"), "a").unwrap();
        fs::write(root.join("B.txt"), "b").unwrap();

        let plan = plan_in(root);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            Executor::default().execute_plan(&plan, ExecuteOptions::default(), &mut noop, &cancel);

        assert_eq!(result.cancelled(), 2);
        assert!(root.join("A.txt").exists());
        assert!(root.join("B.txt").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("A.txt"), "a").unwrap();

        let plan = plan_in(root);
        let recording = Arc::new(RecordingFs::default());
        let result = Executor::new(recording.clone()).execute_plan(
            &plan,
            ExecuteOptions { dry_run: true },
            &mut noop,
            &CancellationToken::new(),
        );

        assert!(result.dry_run);
        assert_eq!(result.succeeded(), 1);
        assert!(recording.renames.lock().unwrap().is_empty());
        assert!(root.join("A.txt").exists());
    }

    #[test]
    fn test_dry_run_follows_dependency_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();

        let ops = vec![
            RenameOp {
                source: root.join("b.txt"),
                target: root.join("c.txt"),
                is_dir: false,
                case_only: false,
            },
            RenameOp {
                source: root.join("a.txt"),
                target: root.join("b.txt"),
                is_dir: false,
                case_only: false,
            },
        ];

        let result = Executor::default().run(
            root,
            &ops,
            ExecuteOptions { dry_run: true },
            &mut noop,
            &CancellationToken::new(),
        );
        assert!(result.is_complete_success());
    }

    #[test]
    fn test_case_only_rename_uses_temp_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("Photo.JPG"), "p").unwrap();

        let op = RenameOp {
            source: root.join("Photo.JPG"),
            target: root.join("photo.jpg"),
            is_dir: false,
            case_only: true,
        };
        let recording = Arc::new(RecordingFs::default());
        let result = Executor::new(recording.clone()).run(
            root,
            &[op],
            ExecuteOptions::default(),
            &mut noop,
            &CancellationToken::new(),
        );

        assert!(result.is_complete_success());
        let renames = recording.renames.lock().unwrap();
        assert_eq!(renames.len(), 2);
        assert_eq!(renames[1].1, root.join("photo.jpg"));
        assert!(root.join("photo.jpg").exists());
    }
}
