//! Concurrency guards for the scheduler (C6, §5): a process-wide advisory
//! lock so two instances never run the same engine against the same
//! database, and a per-event mutex registry so the same event is never
//! synced by two workers at once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine_core::error::EngineError;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A file-based advisory lock taken for the lifetime of the process. Not a
/// distributed lock in the strict sense — it only protects against two
/// instances sharing the same local lock file path, which is the deployment
/// model this engine assumes (single scheduler instance per environment).
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Attempts to acquire the lock by creating the lock file exclusively.
    /// Returns [`EngineError::LockHeld`] if another process already holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);

        match options.open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(EngineError::LockHeld {
                    message: format!("lock file {} already exists", path.display()),
                })
            }
            Err(e) => Err(EngineError::LockHeld {
                message: format!("failed to create lock file {}: {e}", path.display()),
            }),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Key identifying one provider event within one partner, the unit a
/// per-event lock is scoped to.
pub type EventKey = (i64, String, String);

/// Ensures at most one worker syncs a given `(partner_id, provider_id,
/// provider_event_id)` at a time, even when the scheduler's tick loop would
/// otherwise enqueue it twice before the first run finishes (§5).
#[derive(Default)]
pub struct EventLockRegistry {
    locks: Mutex<HashMap<EventKey, Arc<Mutex<()>>>>,
}

impl EventLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard held until dropped; a second caller for the same key
    /// awaits until the first guard is released.
    pub async fn lock(&self, key: EventKey) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        entry.lock_owned().await
    }

    /// Best-effort, non-blocking variant used by the scheduler to skip an
    /// event that's already mid-sync rather than queueing behind it.
    pub async fn try_lock(&self, key: EventKey) -> Option<OwnedMutexGuard<()>> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        entry.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let registry = EventLockRegistry::new();
        let key = (1, "runsignup".to_string(), "100".to_string());
        let _guard = registry.lock(key.clone()).await;
        assert!(registry.try_lock(key).await.is_none());
    }

    #[tokio::test]
    async fn try_lock_succeeds_after_release() {
        let registry = EventLockRegistry::new();
        let key = (1, "runsignup".to_string(), "100".to_string());
        {
            let _guard = registry.lock(key.clone()).await;
        }
        assert!(registry.try_lock(key).await.is_some());
    }

    #[tokio::test]
    async fn distinct_events_do_not_contend() {
        let registry = EventLockRegistry::new();
        let a = (1, "runsignup".to_string(), "100".to_string());
        let b = (1, "runsignup".to_string(), "200".to_string());
        let _guard_a = registry.lock(a).await;
        assert!(registry.try_lock(b).await.is_some());
    }

    #[test]
    fn acquiring_an_already_held_instance_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.lock");
        let _first = InstanceLock::acquire(&path).unwrap();
        let second = InstanceLock::acquire(&path);
        assert!(matches!(second, Err(EngineError::LockHeld { .. })));
    }

    #[test]
    fn releasing_an_instance_lock_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.lock");
        {
            let _first = InstanceLock::acquire(&path).unwrap();
        }
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}
