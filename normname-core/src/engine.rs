use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecuteOptions, ExecutionHandle, ExecutionResult, Executor, Filesystem, Progress};
use crate::guard::FolderGuard;
use crate::history::{HistoryStore, OperationRecord};
use crate::normalize::NormalizeRules;
use crate::plan::{build_plan, RenamePlan};
use crate::scanner::{scan, FileRecord, ScanOptions, ScanReport};
use crate::undo::UndoEngine;
use std::path::Path;
use std::sync::Arc;

/// Entry points for a front end: scan, preview, execute and undo.
///
/// The engine keeps no session state. Each call takes what it needs and
/// returns its result; the only thing shared between calls is the
/// per-folder operation guard.
#[derive(Debug, Clone)]
pub struct Engine {
    rules: NormalizeRules,
    history: HistoryStore,
    executor: Executor,
    max_records: Option<usize>,
}

impl Engine {
    pub fn new(rules: NormalizeRules, history: HistoryStore) -> Self {
        Self {
            rules,
            history,
            executor: Executor::default(),
            max_records: None,
        }
    }

    /// Use a different filesystem for renames
    #[must_use]
    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.executor = Executor::new(fs);
        self
    }

    /// Prune history to this many records after each batch
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn rules(&self) -> &NormalizeRules {
        &self.rules
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn scan(&self, root: &Path, options: &ScanOptions) -> EngineResult<ScanReport> {
        scan(root, options)
    }

    /// Build a plan for scanned records under `root`
    pub fn preview(&self, root: &Path, records: Vec<FileRecord>) -> RenamePlan {
        build_plan(root, records, &self.rules)
    }

    /// Scan then preview
    pub fn plan(&self, root: &Path, options: &ScanOptions) -> EngineResult<(RenamePlan, ScanReport)> {
        let mut report = self.scan(root, options)?;
        let records = std::mem::take(&mut report.records);
        let plan = self.preview(&report.root, records);
        Ok((plan, report))
    }

    /// Execute a plan on the calling thread and record the outcome.
    ///
    /// Dry runs and batches with nothing to do are not recorded. The id of
    /// the written record is in [`ExecutionResult::operation_id`].
    pub fn execute(
        &self,
        plan: &RenamePlan,
        options: ExecuteOptions,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> EngineResult<ExecutionResult> {
        let guard = FolderGuard::acquire(&plan.root)?;
        let result = self.execute_guarded(plan, options, progress, cancel);
        drop(guard);
        Ok(result)
    }

    /// A history failure after the renames lands in
    /// [`ExecutionResult::history_error`]; the outcomes are always returned.
    fn execute_guarded(
        &self,
        plan: &RenamePlan,
        options: ExecuteOptions,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut result = self.executor.execute_plan(plan, options, progress, cancel);

        if !result.dry_run && !result.outcomes.is_empty() {
            let recorded = self.history.record(&result, &plan.root).map(|r| r.id);
            result.note_recorded(recorded);

            if let (Some(max), Some(_)) = (self.max_records, &result.operation_id) {
                if let Err(e) = self.history.prune(max) {
                    tracing::warn!("Failed to prune history: {}", e);
                }
            }
        }

        result
    }

    /// Execute a plan on a background thread.
    ///
    /// The folder guard is taken before the thread starts, so a second
    /// operation on the same folder fails here rather than in the worker.
    pub fn spawn_execute<P>(
        &self,
        plan: RenamePlan,
        options: ExecuteOptions,
        mut progress: P,
        cancel: CancellationToken,
    ) -> EngineResult<ExecutionHandle>
    where
        P: FnMut(Progress) + Send + 'static,
    {
        let guard = FolderGuard::acquire(&plan.root)?;
        let engine = self.clone();
        let worker_cancel = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("normname-executor".to_string())
            .spawn(move || {
                let _guard = guard;
                Ok(engine.execute_guarded(&plan, options, &mut progress, &worker_cancel))
            })?;

        Ok(ExecutionHandle::new(handle, cancel))
    }

    /// Undo a recorded batch
    pub fn undo(
        &self,
        record: &OperationRecord,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> EngineResult<ExecutionResult> {
        let _guard = FolderGuard::acquire(&record.folder_path)?;
        UndoEngine::new(&self.history, self.executor.clone()).undo(record, progress, cancel)
    }

    /// Undo the newest record, for one folder or any folder
    pub fn undo_latest(
        &self,
        folder: Option<&Path>,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> EngineResult<Option<(OperationRecord, ExecutionResult)>> {
        let Some(record) = self.history.latest(folder)? else {
            return Ok(None);
        };
        if record.is_undo() {
            return Err(EngineError::NotUndoable(
                record.id,
                "the latest operation was already undone".to_string(),
            ));
        }
        let result = self.undo(&record, progress, cancel)?;
        Ok(Some((record, result)))
    }
}
