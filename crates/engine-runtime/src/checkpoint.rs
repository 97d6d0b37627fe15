//! Checkpoint/Resume Store (C7, §4.7): durable progress markers for
//! long-running backfills, so a restart resumes instead of starting over.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use engine_core::error::EngineError;
use engine_core::models::BackfillCheckpoint;
use uuid::Uuid;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &BackfillCheckpoint) -> Result<(), EngineError>;
    async fn load(&self, run_id: Uuid) -> Result<Option<BackfillCheckpoint>, EngineError>;
    /// Removes a run's checkpoint once its backfill has finished, so a
    /// completed run's stale progress marker can't be mistaken for one still
    /// in flight. A no-op if the run was never checkpointed.
    async fn delete(&self, run_id: Uuid) -> Result<(), EngineError>;
}

/// Writes checkpoints as JSON files, one per run, using a write-to-tmp then
/// rename so a crash mid-write never leaves a half-written checkpoint that
/// a resume would trust.
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.directory.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &BackfillCheckpoint) -> Result<(), EngineError> {
        let directory = self.directory.clone();
        let final_path = self.path_for(checkpoint.run_id);
        let checkpoint = checkpoint.clone();

        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&directory)
                .map_err(|e| EngineError::database(format!("failed to create checkpoint dir: {e}")))?;

            let tmp_path = directory.join(format!("{}.tmp", checkpoint.run_id));
            let contents = serde_json::to_vec_pretty(&checkpoint)
                .map_err(|e| EngineError::protocol("checkpoint", e.to_string()))?;
            std::fs::write(&tmp_path, &contents)
                .map_err(|e| EngineError::database(format!("failed to write checkpoint tmp file: {e}")))?;
            std::fs::rename(&tmp_path, &final_path)
                .map_err(|e| EngineError::database(format!("failed to rename checkpoint into place: {e}")))
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))?
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<BackfillCheckpoint>, EngineError> {
        let path = self.path_for(run_id);
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            let contents = std::fs::read(&path)
                .map_err(|e| EngineError::database(format!("failed to read checkpoint file: {e}")))?;
            let checkpoint = serde_json::from_slice(&contents)
                .map_err(|e| EngineError::protocol("checkpoint", e.to_string()))?;
            Ok(Some(checkpoint))
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))?
    }

    async fn delete(&self, run_id: Uuid) -> Result<(), EngineError> {
        let path = self.path_for(run_id);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::database(format!("failed to delete checkpoint file: {e}"))),
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))?
    }
}

/// Persists checkpoints in the canonical store's `backfill_checkpoints`
/// table instead of the local filesystem, so a backfill survives the
/// scheduler moving to a different host.
pub struct DbCheckpointStore {
    pool: engine_store::PgPool,
}

impl DbCheckpointStore {
    pub fn new(pool: engine_store::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for DbCheckpointStore {
    async fn save(&self, checkpoint: &BackfillCheckpoint) -> Result<(), EngineError> {
        use diesel::prelude::*;
        use engine_store::schema::backfill_checkpoints;

        let row = engine_store::models::NewCheckpointRow::from_core(checkpoint);
        let mut conn = engine_store::get_connection(&self.pool)
            .await
            .map_err(|e| EngineError::database(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            diesel::insert_into(backfill_checkpoints::table)
                .values(&row)
                .on_conflict(backfill_checkpoints::run_id)
                .do_update()
                .set(&row)
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| EngineError::database(e.to_string()))
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))?
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<BackfillCheckpoint>, EngineError> {
        use diesel::prelude::*;
        use engine_store::models::CheckpointRow;
        use engine_store::schema::backfill_checkpoints;

        let mut conn = engine_store::get_connection(&self.pool)
            .await
            .map_err(|e| EngineError::database(e.to_string()))?;

        let row = tokio::task::spawn_blocking(move || {
            backfill_checkpoints::table
                .find(run_id)
                .select((
                    backfill_checkpoints::run_id,
                    backfill_checkpoints::work_items,
                    backfill_checkpoints::last_completed_index,
                    backfill_checkpoints::in_progress_cursor,
                    backfill_checkpoints::updated_at,
                ))
                .first::<CheckpointRow>(&mut conn)
                .optional()
                .map_err(|e| EngineError::database(e.to_string()))
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))??;

        row.map(|r| {
            BackfillCheckpoint::try_from(r).map_err(|e| EngineError::protocol("checkpoint", e.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, run_id: Uuid) -> Result<(), EngineError> {
        use diesel::prelude::*;
        use engine_store::schema::backfill_checkpoints;

        let mut conn = engine_store::get_connection(&self.pool)
            .await
            .map_err(|e| EngineError::database(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            diesel::delete(backfill_checkpoints::table.find(run_id))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| EngineError::database(e.to_string()))
        })
        .await
        .map_err(|e| EngineError::database(e.to_string()))?
    }
}

/// Returns the remaining work items to process for a backfill run, loading
/// an existing checkpoint if one is present or starting fresh otherwise.
pub async fn resume_or_start(
    store: &dyn CheckpointStore,
    run_id: Uuid,
    fresh: impl FnOnce(Uuid) -> BackfillCheckpoint,
) -> Result<BackfillCheckpoint, EngineError> {
    match store.load(run_id).await? {
        Some(existing) => Ok(existing),
        None => Ok(fresh(run_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::models::BackfillWorkItem;

    fn sample_checkpoint() -> BackfillCheckpoint {
        BackfillCheckpoint::new(
            Uuid::new_v4(),
            vec![
                BackfillWorkItem { partner_id: 1, provider_id: "runsignup".to_string(), provider_event_id: "100".to_string() },
                BackfillWorkItem { partner_id: 1, provider_id: "runsignup".to_string(), provider_event_id: "101".to_string() },
            ],
        )
    }

    #[tokio::test]
    async fn file_store_round_trips_a_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let checkpoint = sample_checkpoint();

        store.save(&checkpoint).await.unwrap();
        let loaded = store.load(checkpoint.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, checkpoint.run_id);
        assert_eq!(loaded.work_items.len(), 2);
    }

    #[tokio::test]
    async fn file_store_load_of_unknown_run_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_delete_removes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let checkpoint = sample_checkpoint();
        store.save(&checkpoint).await.unwrap();

        store.delete(checkpoint.run_id).await.unwrap();
        assert!(store.load(checkpoint.run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_delete_of_unknown_run_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.delete(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn resume_or_start_prefers_existing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let mut checkpoint = sample_checkpoint();
        checkpoint.mark_completed(0);
        store.save(&checkpoint).await.unwrap();

        let resumed = resume_or_start(&store, checkpoint.run_id, |_| panic!("should not start fresh"))
            .await
            .unwrap();
        assert_eq!(resumed.last_completed_index, 0);
    }

    #[tokio::test]
    async fn resume_or_start_falls_back_to_fresh_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let run_id = Uuid::new_v4();
        let fresh = resume_or_start(&store, run_id, |id| {
            BackfillCheckpoint::new(id, vec![])
        })
        .await
        .unwrap();
        assert_eq!(fresh.last_completed_index, -1);
        assert_eq!(fresh.run_id, run_id);
    }
}
