//! # Engine Core
//!
//! Canonical data model, error taxonomy, scheduling math, and configuration
//! shared by every crate in the provider integration engine:
//!
//! - [`models`] — [`Event`], [`Race`], [`Participant`], [`TimingPartner`],
//!   [`ProviderCredential`], [`SyncHistoryRow`], [`BackfillCheckpoint`] (§3)
//! - [`error`] — [`EngineError`], the crate-wide error taxonomy (§7)
//! - [`config`] — [`EngineConfig`], loaded once at startup and handed down
//!   by value (§13)
//! - [`scheduling`] — priority-band classification shared by the scheduler
//!   and sync executor (§4.6)
//!
//! ## Features
//!
//! - `monitoring` — enables Prometheus error-conversion support (default on)

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod models;
pub mod scheduling;

pub use config::EngineConfig;
pub use error::{EngineError, ErrorCategory, ErrorSeverity, Result};

/// Current version of engine-core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::error::{EngineError, Result};
    pub use crate::models::{
        BackfillCheckpoint, BackfillWorkItem, Event, Participant, ProviderCredential, Race,
        RowError, RowResult, SyncHistoryRow, SyncKind, SyncStatus, TimingPartner,
    };
    pub use crate::scheduling::{classify, is_due, Band};
    pub use crate::EngineConfig;
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}