//! Append-only sync audit trail (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of sync run produced a [`SyncHistoryRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Full,
    Incremental,
    /// An incremental sync that failed and was retried as a full sync (§4.4).
    FullFallback,
    Discovery,
}

impl SyncKind {
    pub fn is_full(&self) -> bool {
        matches!(self, SyncKind::Full | SyncKind::FullFallback)
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncKind::Full => "full",
            SyncKind::Incremental => "incremental",
            SyncKind::FullFallback => "full_fallback",
            SyncKind::Discovery => "discovery",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncKind::Full),
            "incremental" => Ok(SyncKind::Incremental),
            "full_fallback" => Ok(SyncKind::FullFallback),
            "discovery" => Ok(SyncKind::Discovery),
            other => Err(format!("unknown sync kind: {other}")),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Terminal status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Failed,
}

/// One append-only audit row. Never updated after being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryRow {
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_event_id: Option<String>,
    pub sync_kind: SyncKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub records_seen: i64,
    pub records_upserted: i64,
    pub errors: i64,
    pub reason: Option<String>,
}

impl SyncHistoryRow {
    pub fn started(partner_id: i64, provider_id: impl Into<String>, sync_kind: SyncKind) -> Self {
        Self {
            partner_id,
            provider_id: provider_id.into(),
            provider_event_id: None,
            sync_kind,
            started_at: Utc::now(),
            finished_at: None,
            status: SyncStatus::Failed,
            records_seen: 0,
            records_upserted: 0,
            errors: 0,
            reason: None,
        }
    }

    pub fn for_event(mut self, provider_event_id: impl Into<String>) -> Self {
        self.provider_event_id = Some(provider_event_id.into());
        self
    }

    pub fn complete(mut self, records_seen: i64, records_upserted: i64, errors: i64) -> Self {
        self.finished_at = Some(Utc::now());
        self.status = SyncStatus::Completed;
        self.records_seen = records_seen;
        self.records_upserted = records_upserted;
        self.errors = errors;
        self
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.finished_at = Some(Utc::now());
        self.status = SyncStatus::Failed;
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_row_finished_at_is_after_started_at() {
        let row = SyncHistoryRow::started(1, "runsignup", SyncKind::Full).complete(10, 10, 0);
        assert!(row.finished_at.unwrap() >= row.started_at);
        assert_eq!(row.status, SyncStatus::Completed);
    }

    #[test]
    fn failed_row_carries_reason() {
        let row = SyncHistoryRow::started(1, "haku", SyncKind::Incremental).fail("auth failed");
        assert_eq!(row.status, SyncStatus::Failed);
        assert_eq!(row.reason.as_deref(), Some("auth failed"));
    }

    #[test]
    fn full_fallback_is_a_full_sync() {
        assert!(SyncKind::FullFallback.is_full());
        assert!(!SyncKind::Incremental.is_full());
    }
}
