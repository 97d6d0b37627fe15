//! Canonical data model (§3).

pub mod checkpoint;
pub mod event;
pub mod participant;
pub mod partner;
pub mod row;
pub mod sync_history;

pub use checkpoint::{BackfillCheckpoint, BackfillWorkItem};
pub use event::{Event, Race};
pub use participant::Participant;
pub use partner::{ProviderCredential, TimingPartner};
pub use row::{RowError, RowErrorKind, RowResult};
pub use sync_history::{SyncHistoryRow, SyncKind, SyncStatus};
