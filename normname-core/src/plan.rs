use crate::normalize::{normalize_with, NormalizeRules};
use crate::scanner::FileRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Windows reserved filenames that cannot be used
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters rejected by at least one common target filesystem
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Will be attempted by the executor
    Pending,
    /// Blocked until the caller resolves it
    Conflict,
    /// Already normalized, nothing to do
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Several entries map to the same target
    DuplicateTarget,
    /// The target is an existing file that stays where it is
    ExistingFile,
    /// Reserved name, illegal character or over-long name
    InvalidName,
    /// Entries that would each need the other to move first
    Cycle,
}

impl ConflictReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DuplicateTarget => "duplicate target",
            Self::ExistingFile => "target exists",
            Self::InvalidName => "invalid name",
            Self::Cycle => "rename cycle",
        }
    }
}

/// One proposed rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameEntry {
    pub source: FileRecord,
    pub proposed_name: String,
    pub target_path: PathBuf,
    pub state: EntryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictReason>,
}

impl RenameEntry {
    fn new(source: FileRecord, proposed_name: String) -> Self {
        let target_path = source.parent().join(&proposed_name);
        let state = if proposed_name == source.name {
            EntryState::Skipped
        } else {
            EntryState::Pending
        };
        Self {
            source,
            proposed_name,
            target_path,
            state,
            conflict: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == EntryState::Pending
    }

    /// Source and target differ only by letter case
    pub fn is_case_only(&self) -> bool {
        self.source.name != self.proposed_name
            && self.source.name.to_lowercase() == self.proposed_name.to_lowercase()
    }

    fn mark_conflict(&mut self, reason: ConflictReason) {
        self.state = EntryState::Conflict;
        self.conflict = Some(reason);
    }
}

/// A group of entries blocked for the same reason on the same target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameConflict {
    pub target: PathBuf,
    pub sources: Vec<PathBuf>,
    pub reason: ConflictReason,
}

/// The full set of proposed renames for one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    /// Folder the plan was built for
    pub root: PathBuf,
    /// Entries in scan order, including skipped and conflicted ones
    pub entries: Vec<RenameEntry>,
    pub conflicts: Vec<RenameConflict>,
    /// Indices of pending entries in the order they must be executed
    pub order: Vec<usize>,
    pub case_insensitive_fs: bool,
    pub rules: NormalizeRules,
}

impl RenamePlan {
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Skipped)
            .count()
    }

    pub fn conflict_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Conflict)
            .count()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Pending entries in execution order
    pub fn pending_in_order(&self) -> impl Iterator<Item = &RenameEntry> {
        self.order.iter().map(|&i| &self.entries[i])
    }

    /// Replace the proposed name of one entry and re-run conflict detection.
    ///
    /// This is how a caller resolves a conflict before execution. Returns
    /// `false` when `index` is out of range.
    pub fn override_name(&mut self, index: usize, name: &str) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        *entry = RenameEntry::new(entry.source.clone(), name.to_string());
        self.detect_conflicts();
        true
    }

    fn target_key(&self, path: &Path) -> String {
        let key = path.to_string_lossy();
        if self.case_insensitive_fs {
            key.to_lowercase()
        } else {
            key.into_owned()
        }
    }

    /// Recompute entry states, conflicts and execution order from scratch
    pub fn detect_conflicts(&mut self) {
        for entry in &mut self.entries {
            entry.conflict = None;
            entry.state = if entry.proposed_name == entry.source.name {
                EntryState::Skipped
            } else {
                EntryState::Pending
            };
        }

        // Invalid names never reach the filesystem. Paths that are not valid
        // UTF-8 could not be written to history, so they are blocked too.
        let max_len = self.rules.max_name_len;
        for entry in &mut self.entries {
            let unrecordable =
                entry.source.path.to_str().is_none() || entry.target_path.to_str().is_none();
            if entry.is_pending()
                && (unrecordable || validate_name(&entry.proposed_name, max_len).is_err())
            {
                entry.mark_conflict(ConflictReason::InvalidName);
            }
        }

        // Collisions between proposed targets
        let mut by_target: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.is_pending() {
                by_target
                    .entry(self.target_key(&entry.target_path))
                    .or_default()
                    .push(i);
            }
        }
        for indices in by_target.values().filter(|v| v.len() > 1) {
            for &i in indices {
                self.entries[i].mark_conflict(ConflictReason::DuplicateTarget);
            }
        }

        // Check target existence once, in parallel
        let target_occupied: Vec<bool> = self
            .entries
            .par_iter()
            .map(|e| e.is_pending() && fs::symlink_metadata(&e.target_path).is_ok())
            .collect();

        // Collisions with files that stay in place. A conflict can make
        // another entry's target stay occupied, so repeat until stable.
        loop {
            let vacated: HashSet<String> = self
                .entries
                .iter()
                .filter(|e| e.is_pending())
                .map(|e| self.target_key(&e.source.path))
                .collect();

            let mut changed = false;
            for i in 0..self.entries.len() {
                let entry = &self.entries[i];
                if !entry.is_pending() || !target_occupied[i] {
                    continue;
                }
                let occupied_by_self = self.case_insensitive_fs && entry.is_case_only();
                let target_key = self.target_key(&entry.target_path);
                let source_key = self.target_key(&entry.source.path);
                let moving_away = target_key != source_key && vacated.contains(&target_key);
                if !occupied_by_self && !moving_away {
                    self.entries[i].mark_conflict(ConflictReason::ExistingFile);
                    changed = true;
                }
            }

            changed |= self.order_pending();

            if !changed {
                break;
            }
        }

        self.conflicts = self.collect_conflicts();

        tracing::debug!(
            pending = self.pending_count(),
            skipped = self.skipped_count(),
            conflicts = self.conflict_count(),
            "Conflict detection finished"
        );
    }

    /// Order pending entries: deeper paths first so children are renamed
    /// before their parent directory, then any entry whose target is another
    /// entry's source after that entry. Returns true if a cycle was marked.
    fn order_pending(&mut self) -> bool {
        let mut base: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].is_pending())
            .collect();
        base.sort_by(|&a, &b| {
            let pa = &self.entries[a].source.path;
            let pb = &self.entries[b].source.path;
            pb.components()
                .count()
                .cmp(&pa.components().count())
                .then_with(|| pa.cmp(pb))
        });

        let by_source: HashMap<String, usize> = base
            .iter()
            .map(|&i| (self.target_key(&self.entries[i].source.path), i))
            .collect();

        // Each pending entry waits for at most one other: the one whose
        // source is its target.
        let depends_on: HashMap<usize, usize> = base
            .iter()
            .filter_map(|&i| {
                let entry = &self.entries[i];
                if self.case_insensitive_fs && entry.is_case_only() {
                    return None;
                }
                by_source
                    .get(&self.target_key(&entry.target_path))
                    .filter(|&&j| j != i)
                    .map(|&j| (i, j))
            })
            .collect();

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks: HashMap<usize, Mark> = base.iter().map(|&i| (i, Mark::New)).collect();
        let mut order = Vec::with_capacity(base.len());
        let mut cycles = Vec::new();

        for &start in &base {
            let mut chain = Vec::new();
            let mut current = Some(start);
            let mut cyclic = false;

            while let Some(i) = current {
                match marks[&i] {
                    Mark::New => {
                        marks.insert(i, Mark::Active);
                        chain.push(i);
                        current = depends_on.get(&i).copied();
                    },
                    Mark::Active => {
                        cyclic = true;
                        break;
                    },
                    Mark::Done => break,
                }
            }

            for &i in &chain {
                marks.insert(i, Mark::Done);
            }
            if cyclic {
                cycles.extend(chain);
            } else {
                order.extend(chain.into_iter().rev());
            }
        }

        for &i in &cycles {
            self.entries[i].mark_conflict(ConflictReason::Cycle);
        }
        self.order = order;
        !cycles.is_empty()
    }

    fn collect_conflicts(&self) -> Vec<RenameConflict> {
        let mut groups: HashMap<(String, ConflictReason), RenameConflict> = HashMap::new();
        for entry in &self.entries {
            if let Some(reason) = entry.conflict {
                groups
                    .entry((self.target_key(&entry.target_path), reason))
                    .or_insert_with(|| RenameConflict {
                        target: entry.target_path.clone(),
                        sources: Vec::new(),
                        reason,
                    })
                    .sources
                    .push(entry.source.path.clone());
            }
        }

        let mut conflicts: Vec<_> = groups.into_values().collect();
        conflicts.sort_by(|a, b| a.target.cmp(&b.target));
        conflicts
    }
}

/// Build a rename plan for scanned records.
///
/// Names are normalized in parallel; the resulting entries keep the records'
/// order.
pub fn build_plan(root: &Path, records: Vec<FileRecord>, rules: &NormalizeRules) -> RenamePlan {
    let entries: Vec<RenameEntry> = records
        .into_par_iter()
        .map(|record| {
            let proposed = normalize_with(&record.name, rules);
            RenameEntry::new(record, proposed)
        })
        .collect();

    let case_insensitive_fs = detect_case_insensitive_fs(root);

    let mut plan = RenamePlan {
        root: root.to_path_buf(),
        entries,
        conflicts: Vec::new(),
        order: Vec::new(),
        case_insensitive_fs,
        rules: rules.clone(),
    };
    plan.detect_conflicts();

    tracing::info!(
        root = %root.display(),
        pending = plan.pending_count(),
        skipped = plan.skipped_count(),
        conflicts = plan.conflict_count(),
        "Plan built"
    );

    plan
}

/// Check if the filesystem at the given path is case-insensitive.
///
/// Read-only: takes a child of `path` (or `path` itself) whose name has
/// cased letters and looks it up again with the case swapped. Nothing is
/// created in the folder.
pub fn detect_case_insensitive_fs(path: &Path) -> bool {
    let child = fs::read_dir(path).ok().and_then(|entries| {
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|p| has_cased_name(p))
    });
    let candidate = child.or_else(|| path.ancestors().find(|p| has_cased_name(p)).map(Path::to_path_buf));

    // Nothing with letters in it: case can't matter here
    candidate.is_some_and(|p| resolves_with_swapped_case(&p))
}

fn has_cased_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.chars().any(|c| c.is_lowercase() || c.is_uppercase()))
}

fn swap_case(name: &str) -> String {
    name.chars()
        .flat_map(|c| {
            if c.is_lowercase() {
                c.to_uppercase().collect::<Vec<_>>()
            } else {
                c.to_lowercase().collect::<Vec<_>>()
            }
        })
        .collect()
}

fn resolves_with_swapped_case(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let swapped = path.with_file_name(swap_case(name));
    match (fs::symlink_metadata(path), fs::symlink_metadata(&swapped)) {
        (Ok(original), Ok(other)) => same_file(&original, &other),
        _ => false,
    }
}

#[cfg(unix)]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

// Without inode numbers, a swapped-case twin of a listed entry is taken as
// the same entry
#[cfg(not(unix))]
fn same_file(_: &fs::Metadata, _: &fs::Metadata) -> bool {
    true
}

/// Check if a filename is a Windows reserved name.
/// Always checks regardless of platform so plans are portable.
pub fn is_windows_reserved(name: &str) -> bool {
    let base = name.split('.').next().unwrap_or(name).trim_end().to_uppercase();
    WINDOWS_RESERVED.contains(&base.as_str())
}

/// Why a proposed name cannot be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameProblem {
    Empty,
    Reserved,
    IllegalChar(char),
    TrailingDotOrSpace,
    TooLong(usize),
}

/// Validate a proposed file name for use on common filesystems
pub fn validate_name(name: &str, max_len: usize) -> Result<(), NameProblem> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(NameProblem::Empty);
    }
    if let Some(c) = name
        .chars()
        .find(|c| ILLEGAL_CHARS.contains(c) || c.is_control())
    {
        return Err(NameProblem::IllegalChar(c));
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Err(NameProblem::TrailingDotOrSpace);
    }
    if is_windows_reserved(name) {
        return Err(NameProblem::Reserved);
    }
    if name.len() > max_len {
        return Err(NameProblem::TooLong(name.len()));
    }
    Ok(())
}
