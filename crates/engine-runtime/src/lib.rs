//! Scheduler, sync executor, discovery worker, and checkpoint store: the
//! runtime that drives provider adapters against the canonical store.

pub mod checkpoint;
pub mod discovery;
pub mod executor;
pub mod lock;
#[cfg(feature = "monitoring")]
pub mod metrics;
pub mod scheduler;

pub use checkpoint::{CheckpointStore, DbCheckpointStore, FileCheckpointStore};
pub use discovery::{DiscoveryOutcome, DiscoveryWorker};
pub use executor::{ExecutedAs, SyncExecutor};
pub use lock::{EventLockRegistry, EventKey, InstanceLock};
pub use scheduler::{Scheduler, SchedulerConfig};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
