use crate::executor::{EntryStatus, ExecutionResult};
use crate::history::{OperationKind, OperationRecord};
use crate::plan::{EntryState, RenamePlan};
use crate::scanner::SkippedEntry;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use nu_ansi_term::Color as AnsiColor;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write;
use std::io::{self, IsTerminal};
use std::path::Path;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Summary,
    Json,
}

/// Determine whether to use colors based on explicit preference or terminal detection
pub fn should_use_color_with_detector<F>(use_color: Option<bool>, is_terminal: F) -> bool
where
    F: Fn() -> bool,
{
    match use_color {
        Some(explicit_color) => explicit_color,
        None => is_terminal(),
    }
}

pub fn should_use_color(use_color: Option<bool>) -> bool {
    should_use_color_with_detector(use_color, || io::stdout().is_terminal())
}

/// Trait for formatting output in different formats
pub trait OutputFormatter {
    fn format(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => self.format_json(),
            OutputFormat::Summary => self.format_summary(),
        }
    }
    fn format_json(&self) -> String;
    fn format_summary(&self) -> String;
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map_or_else(|_| path.display().to_string(), |p| p.display().to_string())
}

fn paint(use_color: bool, color: AnsiColor, text: &str) -> String {
    if use_color {
        color.paint(text).to_string()
    } else {
        text.to_string()
    }
}

/// Render every plan entry as a table row
pub fn render_plan_table(plan: &RenamePlan, use_color: bool) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(if io::stdout().is_terminal() {
        ContentArrangement::Dynamic
    } else {
        ContentArrangement::Disabled
    });

    if use_color {
        table.enforce_styling();
        table.set_header(vec![
            Cell::new("Current").fg(Color::Cyan),
            Cell::new("Proposed").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);
    } else {
        table.set_header(vec!["Current", "Proposed", "Status"]);
    }

    for entry in &plan.entries {
        let current = display_relative(&entry.source.path, &plan.root);
        let (status, color) = match entry.state {
            EntryState::Pending => ("rename".to_string(), Color::Green),
            EntryState::Skipped => ("unchanged".to_string(), Color::DarkGrey),
            EntryState::Conflict => (
                format!(
                    "conflict: {}",
                    entry.conflict.map_or("unknown", |r| r.as_str())
                ),
                Color::Red,
            ),
        };

        if use_color {
            table.add_row(vec![
                Cell::new(current),
                Cell::new(&entry.proposed_name),
                Cell::new(status).fg(color),
            ]);
        } else {
            table.add_row(vec![current, entry.proposed_name.clone(), status]);
        }
    }

    table.to_string()
}

/// Result of a plan operation
#[derive(Debug, Serialize)]
pub struct PlanResult {
    pub plan: RenamePlan,
    /// Entries the scanner could not read
    pub unreadable: Vec<SkippedEntry>,
    #[serde(skip)]
    pub use_color: bool,
}

impl OutputFormatter for PlanResult {
    fn format_json(&self) -> String {
        serde_json::to_string(&json!({
            "success": true,
            "operation": "plan",
            "root": self.plan.root,
            "summary": {
                "entries": self.plan.entries.len(),
                "pending": self.plan.pending_count(),
                "skipped": self.plan.skipped_count(),
                "conflicts": self.plan.conflict_count(),
                "unreadable": self.unreadable.len(),
            },
            "plan": self.plan,
            "unreadable": self.unreadable,
        }))
        .unwrap_or_default()
    }

    fn format_summary(&self) -> String {
        let plan = &self.plan;
        if plan.entries.is_empty() {
            return format!("No entries found in {}\n", plan.root.display());
        }

        let mut output = render_plan_table(plan, self.use_color);
        output.push('\n');

        let _ = writeln!(
            output,
            "Renames: {}, unchanged: {}, conflicts: {}",
            plan.pending_count(),
            plan.skipped_count(),
            plan.conflict_count()
        );

        for conflict in &plan.conflicts {
            let sources: Vec<_> = conflict
                .sources
                .iter()
                .map(|s| display_relative(s, &plan.root))
                .collect();
            let _ = writeln!(
                output,
                "{} {} <- {} ({})",
                paint(self.use_color, AnsiColor::Red, "✗"),
                display_relative(&conflict.target, &plan.root),
                sources.join(", "),
                conflict.reason.as_str()
            );
        }

        for skipped in &self.unreadable {
            let _ = writeln!(
                output,
                "{} Could not read {} ({})",
                paint(self.use_color, AnsiColor::Yellow, "!"),
                skipped.path.display(),
                skipped.kind
            );
        }

        output
    }
}

/// Result of an apply operation
#[derive(Debug, Serialize)]
pub struct ApplyResult {
    /// Id of the history record, absent for dry runs and empty batches
    pub operation_id: Option<String>,
    pub result: ExecutionResult,
    #[serde(skip)]
    pub use_color: bool,
}

fn write_outcomes(output: &mut String, result: &ExecutionResult, use_color: bool) {
    for outcome in &result.outcomes {
        if outcome.status == EntryStatus::Failed {
            let _ = writeln!(
                output,
                "{} {}: {}",
                paint(use_color, AnsiColor::Red, "✗"),
                display_relative(&outcome.source, &result.folder),
                outcome
                    .error_kind
                    .map_or("unknown", crate::error::ErrorKind::as_str)
            );
        }
    }

    if result.succeeded() > 0 {
        let _ = writeln!(
            output,
            "{} Renamed {} items",
            paint(use_color, AnsiColor::Green, "✓"),
            result.succeeded()
        );
    }
    if result.failed() > 0 {
        let _ = writeln!(output, "Failed: {}", result.failed());
    }
    if result.cancelled() > 0 {
        let _ = writeln!(output, "Cancelled: {}", result.cancelled());
    }
    if let Some(error) = &result.history_error {
        let _ = writeln!(
            output,
            "{} Not recorded in history, these renames cannot be undone: {}",
            paint(use_color, AnsiColor::Yellow, "!"),
            error
        );
    }
}

impl OutputFormatter for ApplyResult {
    fn format_json(&self) -> String {
        serde_json::to_string(&json!({
            "success": self.result.is_complete_success() && self.result.history_error.is_none(),
            "operation": "apply",
            "operation_id": self.operation_id,
            "history_error": self.result.history_error,
            "dry_run": self.result.dry_run,
            "summary": {
                "succeeded": self.result.succeeded(),
                "failed": self.result.failed(),
                "cancelled": self.result.cancelled(),
                "not_executed": self.result.not_executed,
            },
            "outcomes": self.result.outcomes,
        }))
        .unwrap_or_default()
    }

    fn format_summary(&self) -> String {
        let mut output = String::new();

        if self.result.outcomes.is_empty() {
            output.push_str("Nothing to rename\n");
            return output;
        }

        if self.result.dry_run {
            output.push_str("Dry run, no files were renamed\n");
        }

        write_outcomes(&mut output, &self.result, self.use_color);

        if let Some(id) = &self.operation_id {
            if self.result.succeeded() > 0 {
                let _ = writeln!(output, "Undo with: normname undo (operation {})", id);
            }
        }

        output
    }
}

/// Result of an undo operation
#[derive(Debug, Serialize)]
pub struct UndoResult {
    /// Record that was undone
    pub undone_id: Option<String>,
    /// Record written for the undo itself
    pub undo_id: Option<String>,
    pub result: ExecutionResult,
    #[serde(skip)]
    pub use_color: bool,
}

impl OutputFormatter for UndoResult {
    fn format_json(&self) -> String {
        serde_json::to_string(&json!({
            "success": self.result.is_complete_success() && self.result.history_error.is_none(),
            "operation": "undo",
            "history_error": self.result.history_error,
            "undone_id": self.undone_id,
            "undo_id": self.undo_id,
            "summary": {
                "restored": self.result.succeeded(),
                "failed": self.result.failed(),
                "cancelled": self.result.cancelled(),
            },
            "outcomes": self.result.outcomes,
        }))
        .unwrap_or_default()
    }

    fn format_summary(&self) -> String {
        let Some(id) = &self.undone_id else {
            return "Nothing to undo\n".to_string();
        };
        if self.result.outcomes.is_empty() {
            return format!("Operation {} has nothing left to undo\n", id);
        }

        let mut output = format!("Undid operation {}\n", id);
        write_outcomes(&mut output, &self.result, self.use_color);
        output
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub id: String,
    pub operation: String,
    pub timestamp: String,
    pub folder: String,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub undone: bool,
}

impl HistoryItem {
    pub fn from_record(record: &OperationRecord, undone: bool) -> Self {
        let operation = match &record.kind {
            OperationKind::Batch => "apply".to_string(),
            OperationKind::Undo { undo_of } => format!("undo {}", undo_of),
        };
        Self {
            id: record.id.clone(),
            operation,
            timestamp: record.timestamp.clone(),
            folder: record.folder_path.display().to_string(),
            succeeded: record.count(EntryStatus::Success),
            failed: record.count(EntryStatus::Failed),
            cancelled: record.count(EntryStatus::Cancelled),
            undone,
        }
    }
}

/// Result of a history operation
#[derive(Debug, Serialize)]
pub struct HistoryResult {
    pub entries: Vec<HistoryItem>,
    #[serde(skip)]
    pub use_color: bool,
}

impl OutputFormatter for HistoryResult {
    fn format_json(&self) -> String {
        serde_json::to_string(&json!({
            "entries": self.entries
        }))
        .unwrap_or_default()
    }

    fn format_summary(&self) -> String {
        if self.entries.is_empty() {
            return "No history entries found\n".to_string();
        }

        let mut table = Table::new();
        if self.use_color {
            table.enforce_styling();
            table.set_header(vec![
                Cell::new("ID").fg(Color::Cyan),
                Cell::new("Date").fg(Color::Cyan),
                Cell::new("Type").fg(Color::Cyan),
                Cell::new("Folder").fg(Color::Cyan),
                Cell::new("Renamed").fg(Color::Cyan),
                Cell::new("Failed").fg(Color::Cyan),
            ]);
        } else {
            table.set_header(vec!["ID", "Date", "Type", "Folder", "Renamed", "Failed"]);
        }

        for entry in &self.entries {
            let date = entry
                .timestamp
                .split('T')
                .next()
                .unwrap_or(&entry.timestamp);
            let operation = if entry.undone {
                format!("{} [UNDONE]", entry.operation)
            } else {
                entry.operation.clone()
            };
            table.add_row(vec![
                &entry.id[..8.min(entry.id.len())],
                date,
                &operation,
                &entry.folder,
                &entry.succeeded.to_string(),
                &entry.failed.to_string(),
            ]);
        }

        let mut output = table.to_string();
        output.push('\n');
        output
    }
}

/// Result of a status operation
#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub folder: Option<String>,
    pub last_operation: Option<HistoryItem>,
    pub undoable: bool,
    pub history_count: usize,
    /// Another operation on the folder is running in this process
    pub busy: bool,
}

impl OutputFormatter for StatusResult {
    fn format_json(&self) -> String {
        serde_json::to_string(&self).unwrap_or_default()
    }

    fn format_summary(&self) -> String {
        let mut output = String::new();

        if let Some(folder) = &self.folder {
            let _ = writeln!(output, "Folder: {}", folder);
        }

        match &self.last_operation {
            Some(op) => {
                let _ = writeln!(
                    output,
                    "Last operation: {} [{}] {} ({} renamed, {} failed)",
                    op.id, op.operation, op.timestamp, op.succeeded, op.failed
                );
                let _ = writeln!(
                    output,
                    "Undo available: {}",
                    if self.undoable { "yes" } else { "no" }
                );
            },
            None => output.push_str("No operations recorded\n"),
        }

        let _ = writeln!(output, "History entries: {}", self.history_count);

        if self.busy {
            output.push_str("An operation is currently running\n");
        }

        output
    }
}
