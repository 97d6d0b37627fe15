//! Checkpoint/Resume Store types for one-shot backfill jobs (§4.7).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of backfill work: fully sync one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackfillWorkItem {
    pub partner_id: i64,
    pub provider_id: String,
    pub provider_event_id: String,
}

/// Durable progress marker for a backfill run. Rewritten atomically after
/// each completed work item (write-to-tmp + rename, or a single DB upsert —
/// the store implementation decides which).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillCheckpoint {
    pub run_id: Uuid,
    pub work_items: Vec<BackfillWorkItem>,
    /// Index into `work_items` of the last item that fully completed, or
    /// `-1` if none have yet.
    pub last_completed_index: i64,
    /// Provider-specific resumption cursor for the item currently in
    /// progress (e.g. a pagination token), if the adapter exposes one.
    pub in_progress_cursor: Option<String>,
}

impl BackfillCheckpoint {
    pub fn new(run_id: Uuid, work_items: Vec<BackfillWorkItem>) -> Self {
        Self {
            run_id,
            work_items,
            last_completed_index: -1,
            in_progress_cursor: None,
        }
    }

    /// Work items still remaining, in order, starting right after the last
    /// completed index (§4.7 resume semantics).
    pub fn remaining(&self) -> &[BackfillWorkItem] {
        let next = (self.last_completed_index + 1).max(0) as usize;
        if next >= self.work_items.len() {
            &[]
        } else {
            &self.work_items[next..]
        }
    }

    pub fn mark_completed(&mut self, index: usize) {
        self.last_completed_index = index as i64;
        self.in_progress_cursor = None;
    }

    pub fn is_done(&self) -> bool {
        self.remaining().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_items(n: usize) -> Vec<BackfillWorkItem> {
        (0..n)
            .map(|i| BackfillWorkItem {
                partner_id: 1,
                provider_id: "runsignup".to_string(),
                provider_event_id: i.to_string(),
            })
            .collect()
    }

    #[test]
    fn fresh_checkpoint_has_all_items_remaining() {
        let checkpoint = BackfillCheckpoint::new(Uuid::new_v4(), work_items(3));
        assert_eq!(checkpoint.remaining().len(), 3);
        assert!(!checkpoint.is_done());
    }

    #[test]
    fn resume_starts_after_last_completed() {
        let mut checkpoint = BackfillCheckpoint::new(Uuid::new_v4(), work_items(3));
        checkpoint.mark_completed(0);
        assert_eq!(checkpoint.remaining().len(), 2);
        assert_eq!(checkpoint.remaining()[0].provider_event_id, "1");
    }

    #[test]
    fn completing_all_items_marks_done() {
        let mut checkpoint = BackfillCheckpoint::new(Uuid::new_v4(), work_items(2));
        checkpoint.mark_completed(0);
        checkpoint.mark_completed(1);
        assert!(checkpoint.is_done());
    }
}
