use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::executor::{EntryStatus, ExecuteOptions, ExecutionResult, Executor, Progress, RenameOp};
use crate::history::{HistoryStore, OperationRecord};
use crate::plan::detect_case_insensitive_fs;
use std::path::Path;

/// Reverses the successful renames of a recorded batch
#[derive(Debug)]
pub struct UndoEngine<'a> {
    history: &'a HistoryStore,
    executor: Executor,
}

impl<'a> UndoEngine<'a> {
    pub fn new(history: &'a HistoryStore, executor: Executor) -> Self {
        Self { history, executor }
    }

    /// The renames that put a record's successful entries back, newest first
    pub fn reverse_ops(record: &OperationRecord) -> Vec<RenameOp> {
        let has_case_only = record.succeeded().any(|e| is_case_only(&e.new, &e.original));
        let case_insensitive = has_case_only && detect_case_insensitive_fs(&record.folder_path);

        record
            .entries
            .iter()
            .rev()
            .filter(|e| e.status == EntryStatus::Success)
            .map(|e| RenameOp {
                source: e.new.clone(),
                target: e.original.clone(),
                is_dir: e.is_dir,
                case_only: case_insensitive && is_case_only(&e.new, &e.original),
            })
            .collect()
    }

    /// Undo `record` and record the outcome.
    ///
    /// Undoing a record that was already undone is a no-op with no outcomes.
    /// Only the newest record for a folder can be undone, and undo records
    /// themselves cannot.
    pub fn undo(
        &self,
        record: &OperationRecord,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancellationToken,
    ) -> EngineResult<ExecutionResult> {
        if record.is_undo() {
            return Err(EngineError::NotUndoable(
                record.id.clone(),
                "it is itself an undo".to_string(),
            ));
        }

        if self.history.is_undone(&record.id)? {
            tracing::info!("Operation {} was already undone, nothing to do", record.id);
            return Ok(ExecutionResult::empty(&record.folder_path));
        }

        let latest = self.history.latest(Some(&record.folder_path))?;
        if latest.as_ref().is_some_and(|latest| latest.id != record.id) {
            return Err(EngineError::NotUndoable(
                record.id.clone(),
                "a newer operation exists for this folder".to_string(),
            ));
        }

        let ops = Self::reverse_ops(record);
        tracing::info!(
            "Undoing operation {} ({} renames) in {}",
            record.id,
            ops.len(),
            record.folder_path.display()
        );

        let mut result = self.executor.run(
            &record.folder_path,
            &ops,
            ExecuteOptions::default(),
            progress,
            cancel,
        );
        let recorded = self
            .history
            .record_undo(&result, &record.folder_path, &record.id)
            .map(|r| r.id);
        result.note_recorded(recorded);

        Ok(result)
    }
}

fn is_case_only(a: &Path, b: &Path) -> bool {
    a != b && a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::history::{OperationKind, RecordEntry};
    use std::fs;
    use tempfile::TempDir;

    fn noop(_: Progress) {}

    fn record_for(store: &HistoryStore, folder: &Path, renames: &[(&str, &str)]) -> OperationRecord {
        let entries = renames
            .iter()
            .map(|(from, to)| RecordEntry {
                original: folder.join(from),
                new: folder.join(to),
                is_dir: false,
                status: EntryStatus::Success,
                error_kind: None,
                error_detail: None,
            })
            .collect();
        let result = ExecutionResult::empty(folder);
        let mut record = store.record(&result, folder).unwrap();
        record.entries = entries;
        record
    }

    #[test]
    fn test_reverse_ops_skip_unsuccessful_entries() {
        let record = OperationRecord {
            id: "abc".to_string(),
            timestamp: String::new(),
            folder_path: "/x".into(),
            kind: OperationKind::Batch,
            entries: vec![
                RecordEntry {
                    original: "/x/A".into(),
                    new: "/x/a".into(),
                    is_dir: false,
                    status: EntryStatus::Success,
                    error_kind: None,
                    error_detail: None,
                },
                RecordEntry {
                    original: "/x/B".into(),
                    new: "/x/b".into(),
                    is_dir: false,
                    status: EntryStatus::Failed,
                    error_kind: Some(ErrorKind::FileLocked),
                    error_detail: None,
                },
                RecordEntry {
                    original: "/x/C D".into(),
                    new: "/x/c d".into(),
                    is_dir: false,
                    status: EntryStatus::Success,
                    error_kind: None,
                    error_detail: None,
                },
            ],
        };

        let ops = UndoEngine::reverse_ops(&record);
        let pairs: Vec<_> = ops
            .iter()
            .map(|op| (op.source.to_str().unwrap(), op.target.to_str().unwrap()))
            .collect();
        assert_eq!(pairs, vec![("/x/c d", "/x/C D"), ("/x/a", "/x/A")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_undo_keeps_result_when_not_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().canonicalize().unwrap();
        let store = HistoryStore::open(&folder.join(".state"));
        fs::write(folder.join("renamed.txt"), "x").unwrap();
        let record = record_for(&store, &folder, &[("Renamed Orig.txt", "renamed.txt")]);

        // Reads see an empty history; appends fail because the link points
        // into a directory that does not exist
        let broken_dir = folder.join(".broken");
        fs::create_dir(&broken_dir).unwrap();
        let broken_path = broken_dir.join("history.jsonl");
        std::os::unix::fs::symlink(folder.join("missing").join("history.jsonl"), &broken_path)
            .unwrap();
        let broken = HistoryStore::at_path(broken_path);

        let result = UndoEngine::new(&broken, Executor::default())
            .undo(&record, &mut noop, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.succeeded(), 1);
        assert!(result.operation_id.is_none());
        assert!(result.history_error.is_some());
        assert!(folder.join("Renamed Orig.txt").exists());
    }

    #[test]
    fn test_undo_revalidates_against_disk() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().canonicalize().unwrap();
        let store = HistoryStore::open(&folder.join(".state"));

        fs::write(folder.join("moved.txt"), "ok").unwrap();
        fs::write(folder.join("taken.txt"), "mine").unwrap();
        fs::write(folder.join("Taken Orig.txt"), "unrelated").unwrap();

        let record = record_for(
            &store,
            &folder,
            &[
                ("Moved Orig.txt", "moved.txt"),
                ("Gone Orig.txt", "gone.txt"),
                ("Taken Orig.txt", "taken.txt"),
            ],
        );

        let engine = UndoEngine::new(&store, Executor::default());
        let result = engine
            .undo(&record, &mut noop, &CancellationToken::new())
            .unwrap();

        let kinds: Vec<_> = result.outcomes.iter().map(|o| (o.status, o.error_kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (EntryStatus::Failed, Some(ErrorKind::TargetConflict)),
                (EntryStatus::Failed, Some(ErrorKind::SourceMissing)),
                (EntryStatus::Success, None),
            ]
        );
        assert!(folder.join("Moved Orig.txt").exists());
        assert_eq!(fs::read_to_string(folder.join("Taken Orig.txt")).unwrap(), "unrelated");
    }

    #[test]
    fn test_undo_of_undo_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::open(temp_dir.path());
        let folder = temp_dir.path();

        let batch = store.record(&ExecutionResult::empty(folder), folder).unwrap();
        let undo = store
            .record_undo(&ExecutionResult::empty(folder), folder, &batch.id)
            .unwrap();

        let engine = UndoEngine::new(&store, Executor::default());
        let err = engine
            .undo(&undo, &mut noop, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotUndoable(..)));

        // The batch itself is already undone
        let result = engine
            .undo(&batch, &mut noop, &CancellationToken::new())
            .unwrap();
        assert!(result.outcomes.is_empty());
    }

    #[test]
    fn test_only_latest_record_is_undoable() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::open(temp_dir.path());
        let folder = temp_dir.path();

        let older = store.record(&ExecutionResult::empty(folder), folder).unwrap();
        store.record(&ExecutionResult::empty(folder), folder).unwrap();

        let engine = UndoEngine::new(&store, Executor::default());
        let err = engine
            .undo(&older, &mut noop, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotUndoable(..)));
    }
}
