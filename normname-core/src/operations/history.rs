use super::OperationContext;
use crate::history::OperationKind;
use crate::output::{HistoryItem, HistoryResult};
use anyhow::Result;
use std::collections::HashSet;

/// History operation - returns structured data, newest first
pub fn history_operation(limit: Option<usize>, context: &OperationContext) -> Result<HistoryResult> {
    let records = context.history().list(None)?;

    let undone: HashSet<&str> = records
        .iter()
        .filter_map(|r| match &r.kind {
            OperationKind::Undo { undo_of } => Some(undo_of.as_str()),
            OperationKind::Batch => None,
        })
        .collect();

    let entries = records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|r| HistoryItem::from_record(r, undone.contains(r.id.as_str())))
        .collect();

    Ok(HistoryResult {
        entries,
        use_color: context.use_color,
    })
}
