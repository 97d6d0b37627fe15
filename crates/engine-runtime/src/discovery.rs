//! Discovery Worker (C5, §4.5): finds new/changed events and races for each
//! provider credential, twice a day, without touching participants.
//!
//! Shares the same [`RateLimiter`] token bucket as the sync executor — a
//! partner whose participant syncs are saturating its quota will cause
//! discovery to yield rather than starve the executor of tokens.

use std::sync::Arc;

use engine_core::error::EngineError;
use engine_core::models::{ProviderCredential, SyncHistoryRow, SyncKind};
use engine_providers::{ProviderAdapter, RateLimiter};
use engine_store::StoreGateway;

pub struct DiscoveryWorker {
    gateway: Arc<dyn StoreGateway>,
    limiter: Arc<RateLimiter>,
}

/// Summary of one discovery pass over one credential, for logging/metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscoveryOutcome {
    pub events_seen: u64,
    pub races_seen: u64,
}

impl DiscoveryWorker {
    pub fn new(gateway: Arc<dyn StoreGateway>, limiter: Arc<RateLimiter>) -> Self {
        Self { gateway, limiter }
    }

    /// Yields if the credential's bucket is nearly empty, so a busy executor
    /// isn't starved by a discovery pass competing for the same tokens.
    async fn wait_for_capacity(&self, partner_id: i64, provider_id: &str) {
        self.limiter.acquire(partner_id, provider_id).await;
    }

    /// Upserts every not-already-known event and its races visible to
    /// `credential`, leaving participants untouched, then appends one
    /// `discovery` sync-history row summarising the run (§4.5 steps 2-3).
    /// Used on the twice-daily discovery schedule and by the CLI's
    /// `discover-once` mode.
    pub async fn discover(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        credential: &ProviderCredential,
    ) -> Result<DiscoveryOutcome, EngineError> {
        let history = SyncHistoryRow::started(credential.partner_id, credential.provider_id.clone(), SyncKind::Discovery);

        match self.discover_inner(&adapter, credential).await {
            Ok(outcome) => {
                let completed = history.complete(outcome.events_seen as i64, outcome.events_seen as i64, 0);
                self.gateway.append_history_row(&completed).await?;
                Ok(outcome)
            }
            Err(e) => {
                let failed = history.fail(e.to_string());
                if let Err(log_err) = self.gateway.append_history_row(&failed).await {
                    tracing::error!(error = %log_err, "failed to persist failed discovery sync-history row");
                }
                Err(e)
            }
        }
    }

    async fn discover_inner(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        credential: &ProviderCredential,
    ) -> Result<DiscoveryOutcome, EngineError> {
        self.wait_for_capacity(credential.partner_id, &credential.provider_id).await;
        adapter.authenticate(credential).await?;

        let events = adapter.list_events(credential).await?;
        let mut outcome = DiscoveryOutcome::default();

        for event in &events {
            let known = self
                .gateway
                .event_known(event.partner_id, &event.provider_id, &event.provider_event_id)
                .await?;
            if known {
                continue;
            }

            self.gateway.upsert_event(event).await?;
            outcome.events_seen += 1;

            self.wait_for_capacity(credential.partner_id, &credential.provider_id).await;
            let races = adapter.list_races(credential, event).await?;
            for race in &races {
                self.gateway.upsert_race(race).await?;
                outcome.races_seen += 1;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use engine_core::models::{Event, Participant, Race, RowResult};
    use engine_providers::ParticipantPage;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct RecordingGateway {
        events_upserted: StdMutex<u64>,
        races_upserted: StdMutex<u64>,
        known_events: StdMutex<std::collections::HashSet<String>>,
        history_rows: StdMutex<Vec<engine_core::models::SyncHistoryRow>>,
    }

    impl RecordingGateway {
        fn new() -> Self {
            Self {
                events_upserted: StdMutex::new(0),
                races_upserted: StdMutex::new(0),
                known_events: StdMutex::new(std::collections::HashSet::new()),
                history_rows: StdMutex::new(vec![]),
            }
        }

        fn with_known_events(known: &[&str]) -> Self {
            let gateway = Self::new();
            gateway.known_events.lock().unwrap().extend(known.iter().map(|s| s.to_string()));
            gateway
        }
    }

    #[async_trait]
    impl StoreGateway for RecordingGateway {
        async fn check_schema(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn get_credentials(&self, _provider_id: &str) -> Result<Vec<ProviderCredential>, EngineError> {
            Ok(vec![])
        }
        async fn event_known(&self, _partner_id: i64, _provider_id: &str, provider_event_id: &str) -> Result<bool, EngineError> {
            Ok(self.known_events.lock().unwrap().contains(provider_event_id))
        }
        async fn upsert_event(&self, _event: &Event) -> Result<(), EngineError> {
            *self.events_upserted.lock().unwrap() += 1;
            Ok(())
        }
        async fn upsert_race(&self, _race: &Race) -> Result<(), EngineError> {
            *self.races_upserted.lock().unwrap() += 1;
            Ok(())
        }
        async fn commit_event_batch(&self, _rows: &[Participant], history: engine_core::models::SyncHistoryRow) -> Result<engine_core::models::SyncHistoryRow, EngineError> {
            Ok(history)
        }
        async fn append_history_row(&self, row: &engine_core::models::SyncHistoryRow) -> Result<(), EngineError> {
            self.history_rows.lock().unwrap().push(row.clone());
            Ok(())
        }
        async fn last_sync_time(&self, _partner_id: i64, _provider_id: &str, _provider_event_id: &str) -> Result<Option<DateTime<Utc>>, EngineError> {
            Ok(None)
        }
        async fn future_events(&self, _partner_id: Option<i64>, _horizon: chrono::Duration) -> Result<Vec<Event>, EngineError> {
            Ok(vec![])
        }
    }

    struct TwoEventAdapter;

    #[async_trait]
    impl ProviderAdapter for TwoEventAdapter {
        fn provider_name(&self) -> &str {
            "fake"
        }
        async fn authenticate(&self, _credential: &ProviderCredential) -> Result<(), EngineError> {
            Ok(())
        }
        async fn list_events(&self, _credential: &ProviderCredential) -> Result<Vec<Event>, EngineError> {
            Ok(vec![sample_event("100"), sample_event("101")])
        }
        async fn list_races(&self, _credential: &ProviderCredential, event: &Event) -> Result<Vec<Race>, EngineError> {
            Ok(vec![Race {
                partner_id: 1,
                provider_id: "fake".to_string(),
                provider_race_id: format!("{}-race", event.provider_event_id),
                provider_event_id: event.provider_event_id.clone(),
                name: "5K".to_string(),
                distance_meters: Some(5000.0),
                start_time: None,
                raw_payload: serde_json::Value::Null,
            }])
        }
        async fn list_participants(
            &self,
            _credential: &ProviderCredential,
            _race: &Race,
            _event: &Event,
            _since: Option<DateTime<Utc>>,
            _cursor: Option<String>,
        ) -> Result<(ParticipantPage, Option<String>), EngineError> {
            let _: Vec<RowResult<Participant>> = vec![];
            unreachable!("discovery never lists participants")
        }
    }

    fn sample_event(id: &str) -> Event {
        Event {
            partner_id: 1,
            provider_id: "fake".to_string(),
            provider_event_id: id.to_string(),
            name: "Event".to_string(),
            start_time: Utc::now(),
            created_at: Utc::now(),
            raw_payload: serde_json::Value::Null,
        }
    }

    fn credential() -> ProviderCredential {
        ProviderCredential {
            partner_id: 1,
            provider_id: "fake".to_string(),
            principal: "p".to_string(),
            secret: "s".to_string(),
            additional_config: serde_json::Value::Null,
            active: true,
        }
    }

    #[tokio::test]
    async fn discovery_upserts_every_event_and_race_without_listing_participants() {
        let gateway = Arc::new(RecordingGateway::new());
        let limiter = Arc::new(RateLimiter::new(HashMap::new()));
        let worker = DiscoveryWorker::new(gateway.clone(), limiter);
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(TwoEventAdapter);

        let outcome = worker.discover(adapter, &credential()).await.unwrap();
        assert_eq!(outcome.events_seen, 2);
        assert_eq!(outcome.races_seen, 2);
        assert_eq!(*gateway.events_upserted.lock().unwrap(), 2);
        assert_eq!(*gateway.races_upserted.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn discovery_skips_already_known_events_entirely() {
        let gateway = Arc::new(RecordingGateway::with_known_events(&["100"]));
        let limiter = Arc::new(RateLimiter::new(HashMap::new()));
        let worker = DiscoveryWorker::new(gateway.clone(), limiter);
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(TwoEventAdapter);

        let outcome = worker.discover(adapter, &credential()).await.unwrap();
        assert_eq!(outcome.events_seen, 1);
        assert_eq!(outcome.races_seen, 1);
        assert_eq!(*gateway.events_upserted.lock().unwrap(), 1);
        assert_eq!(*gateway.races_upserted.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn discovery_appends_one_summary_history_row_per_run() {
        let gateway = Arc::new(RecordingGateway::new());
        let limiter = Arc::new(RateLimiter::new(HashMap::new()));
        let worker = DiscoveryWorker::new(gateway.clone(), limiter);
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(TwoEventAdapter);

        worker.discover(adapter, &credential()).await.unwrap();

        let rows = gateway.history_rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sync_kind, engine_core::models::SyncKind::Discovery);
        assert_eq!(rows[0].status, engine_core::models::SyncStatus::Completed);
        assert_eq!(rows[0].records_seen, 2);
    }
}
