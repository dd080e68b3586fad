use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::executor::{EntryStatus, ExecutionResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;

const HISTORY_FILE_NAME: &str = "history.jsonl";

/// Distinguishes records written within the same instant
static RECORD_SEQ: AtomicU64 = AtomicU64::new(0);

/// What produced a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    /// A batch executed from a plan
    Batch,
    /// The reversal of an earlier record
    Undo { undo_of: String },
}

/// One file in a persisted operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub original: PathBuf,
    pub new: PathBuf,
    #[serde(default)]
    pub is_dir: bool,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// The persisted outcome of one executed batch or undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    /// RFC 3339 local time
    pub timestamp: String,
    pub folder_path: PathBuf,
    pub kind: OperationKind,
    pub entries: Vec<RecordEntry>,
}

impl OperationRecord {
    /// Build a record from an execution result
    pub fn from_result(result: &ExecutionResult, folder: &Path, kind: OperationKind) -> Self {
        let timestamp = chrono::Local::now().to_rfc3339();
        let entries = result
            .outcomes
            .iter()
            .map(|o| RecordEntry {
                original: o.source.clone(),
                new: o.target.clone(),
                is_dir: o.is_dir,
                status: o.status,
                error_kind: o.error_kind,
                error_detail: o.detail.clone(),
            })
            .collect::<Vec<_>>();

        Self {
            id: generate_operation_id(folder, &timestamp, entries.len()),
            timestamp,
            folder_path: folder.to_path_buf(),
            kind,
            entries,
        }
    }

    pub fn is_undo(&self) -> bool {
        matches!(self.kind, OperationKind::Undo { .. })
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RecordEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Success)
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

fn generate_operation_id(folder: &Path, timestamp: &str, entries: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(folder.to_string_lossy().as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(entries.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(RECORD_SEQ.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Where the latest record for a folder stands
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStatus {
    pub latest: Option<OperationRecord>,
    /// The latest record is a batch with successful entries that was not undone
    pub undoable: bool,
    pub total_records: usize,
}

/// Append-only JSON-lines log of operation records
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store under the given state directory. Nothing is read or created
    /// until first use.
    pub fn open(state_dir: &Path) -> Self {
        Self::at_path(state_dir.join(HISTORY_FILE_NAME))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl std::fmt::Display) -> EngineError {
        EngineError::History {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    /// All records, oldest first.
    ///
    /// A line that does not parse (e.g. a write cut short by a crash) is
    /// logged and ignored.
    pub fn load_all(&self) -> EngineResult<Vec<OperationRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(format!("Failed to open history file: {e}"))),
        };

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.error(format!("Failed to read history: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OperationRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Ignoring unreadable history line {} in {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    fn append(&self, record: &OperationRecord) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.error(format!("Failed to create state directory: {e}")))?;
        }

        let mut line = serde_json::to_string(record)
            .map_err(|e| self.error(format!("Failed to serialize record: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.error(format!("Failed to open history file: {e}")))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| self.error(format!("Failed to write history file: {e}")))?;

        tracing::debug!("Recorded operation {} in {}", record.id, self.path.display());
        Ok(())
    }

    /// Persist the outcome of an executed batch
    pub fn record(&self, result: &ExecutionResult, folder: &Path) -> EngineResult<OperationRecord> {
        let record = OperationRecord::from_result(result, folder, OperationKind::Batch);
        self.append(&record)?;
        Ok(record)
    }

    /// Persist the outcome of undoing `undo_of`
    pub fn record_undo(
        &self,
        result: &ExecutionResult,
        folder: &Path,
        undo_of: &str,
    ) -> EngineResult<OperationRecord> {
        let kind = OperationKind::Undo {
            undo_of: undo_of.to_string(),
        };
        let record = OperationRecord::from_result(result, folder, kind);
        self.append(&record)?;
        Ok(record)
    }

    /// Most recent record, optionally restricted to one folder
    pub fn latest(&self, folder: Option<&Path>) -> EngineResult<Option<OperationRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .rev()
            .find(|r| folder.map_or(true, |f| r.folder_path == f)))
    }

    /// Most recent records first
    pub fn list(&self, limit: Option<usize>) -> EngineResult<Vec<OperationRecord>> {
        let records = self.load_all()?.into_iter().rev();
        Ok(match limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        })
    }

    /// Find a record by id or unique id prefix
    pub fn find(&self, id: &str) -> EngineResult<Option<OperationRecord>> {
        let mut matches: Vec<_> = self
            .load_all()?
            .into_iter()
            .filter(|r| r.id.starts_with(id))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(self.error(format!("Id prefix '{id}' matches {n} records"))),
        }
    }

    /// Whether an undo record already exists for `id`
    pub fn is_undone(&self, id: &str) -> EngineResult<bool> {
        Ok(self
            .load_all()?
            .iter()
            .any(|r| matches!(&r.kind, OperationKind::Undo { undo_of } if undo_of == id)))
    }

    pub fn status(&self, folder: Option<&Path>) -> EngineResult<HistoryStatus> {
        let records = self.load_all()?;
        let latest = records
            .iter()
            .rev()
            .find(|r| folder.map_or(true, |f| r.folder_path == f))
            .cloned();

        let undoable = latest.as_ref().is_some_and(|record| {
            !record.is_undo()
                && record.succeeded().next().is_some()
                && !records.iter().any(
                    |r| matches!(&r.kind, OperationKind::Undo { undo_of } if *undo_of == record.id),
                )
        });

        Ok(HistoryStatus {
            latest,
            undoable,
            total_records: records.len(),
        })
    }

    /// Keep only the newest `max_records` records.
    ///
    /// The log is rewritten to a temporary file and moved into place, so
    /// readers see either the old or the new log.
    pub fn prune(&self, max_records: usize) -> EngineResult<usize> {
        let records = self.load_all()?;
        if records.len() <= max_records {
            return Ok(0);
        }

        let removed = records.len() - max_records;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(parent)
            .map_err(|e| self.error(format!("Failed to create temp file: {e}")))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            for record in &records[removed..] {
                serde_json::to_writer(&mut writer, record)
                    .map_err(|e| self.error(format!("Failed to serialize record: {e}")))?;
                writer
                    .write_all(b"\n")
                    .map_err(|e| self.error(format!("Failed to write history file: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| self.error(format!("Failed to write history file: {e}")))?;
        }

        temp.persist(&self.path)
            .map_err(|e| self.error(format!("Failed to replace history file: {e}")))?;

        tracing::info!("Pruned {} old history records", removed);
        Ok(removed)
    }
}
