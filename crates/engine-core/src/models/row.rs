//! Per-row error channel (§9 redesign note: "per-row exceptions for control
//! flow" → an explicit result type per row instead of an exception that
//! aborts a whole page).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowErrorKind {
    /// Row could not be parsed or normalized.
    Data,
    /// Row conflicted with an existing row or referenced a missing parent.
    Integrity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row_id: String,
    pub kind: RowErrorKind,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} error on row {}: {}", self.kind, self.row_id, self.message)
    }
}

impl std::error::Error for RowError {}

/// Outcome of processing a single row: the executor collects these instead
/// of letting one bad row abort the whole batch.
pub type RowResult<T> = std::result::Result<T, RowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_error_display_includes_row_id() {
        let error = RowError {
            row_id: "p-42".to_string(),
            kind: RowErrorKind::Data,
            message: "bad date".to_string(),
        };
        assert!(error.to_string().contains("p-42"));
    }
}
