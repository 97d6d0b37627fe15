//! Sync Executor (C4, §4.4): decides full vs. incremental, drives one
//! provider adapter through one event's races and participants, and commits
//! the result through the canonical store gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use engine_core::error::EngineError;
use engine_core::models::{Event, ProviderCredential, SyncHistoryRow, SyncKind};
use engine_providers::{ProviderAdapter, RateLimiter};
use engine_store::StoreGateway;

/// How a sync run was actually carried out, returned alongside the
/// completed history row so callers can log/metric on it without
/// re-deriving it from the row's `sync_kind` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutedAs {
    Full,
    Incremental,
    FullFallback,
}

pub struct SyncExecutor {
    gateway: Arc<dyn StoreGateway>,
    limiter: Arc<RateLimiter>,
    incremental_horizon: chrono::Duration,
}

impl SyncExecutor {
    pub fn new(gateway: Arc<dyn StoreGateway>, limiter: Arc<RateLimiter>, incremental_horizon: chrono::Duration) -> Self {
        Self { gateway, limiter, incremental_horizon }
    }

    /// Full if never synced, forced, or the watermark is older than the
    /// incremental horizon; incremental otherwise (§4.4).
    pub fn decide_kind(&self, last_sync: Option<DateTime<Utc>>, force_full: bool, now: DateTime<Utc>) -> SyncKind {
        if force_full {
            return SyncKind::Full;
        }
        match last_sync {
            None => SyncKind::Full,
            Some(watermark) if now - watermark > self.incremental_horizon => SyncKind::Full,
            Some(_) => SyncKind::Incremental,
        }
    }

    /// Runs one sync for `event`. An incremental sync that fails for a
    /// reason other than rate limiting is retried exactly once as a full
    /// resync (`full_fallback`) before giving up (§4.4).
    pub async fn sync_event(
        &self,
        adapter: Arc<dyn ProviderAdapter>,
        credential: &ProviderCredential,
        event: &Event,
        force_full: bool,
    ) -> Result<SyncHistoryRow, EngineError> {
        let now = Utc::now();
        let last_sync = self
            .gateway
            .last_sync_time(event.partner_id, &event.provider_id, &event.provider_event_id)
            .await?;
        let kind = self.decide_kind(last_sync, force_full, now);
        let since = if kind == SyncKind::Incremental { last_sync } else { None };

        match self.run_once(&adapter, credential, event, kind, since).await {
            Ok(history) => Ok(history),
            Err(e) if kind == SyncKind::Incremental && e.aborts_sync_only() => {
                tracing::warn!(
                    partner_id = event.partner_id,
                    provider_id = %event.provider_id,
                    provider_event_id = %event.provider_event_id,
                    error = %e,
                    "incremental sync failed, retrying once as full_fallback"
                );
                self.run_once(&adapter, credential, event, SyncKind::FullFallback, None).await
            }
            Err(e) => Err(e),
        }
    }

    /// Retries `f` with exponential backoff (1s, 2s, 4s, ... capped at 60s,
    /// 3 attempts total) as long as the error it returns is [`EngineError::is_retryable`]
    /// (§7). Rate limiting is excluded — `is_retryable` already returns
    /// `false` for it, and it's handled by the caller's own
    /// acquire/on_rate_limited loop instead.
    async fn with_retry<T, F, Fut>(&self, provider: &str, mut f: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, EngineError>>,
    {
        const MAX_ATTEMPTS: u32 = 3;
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(provider, attempt, delay_secs = delay.as_secs(), error = %e, "retryable error, backing off");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(60));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends a `failed` sync-history row for every failure path that
    /// doesn't already go through [`StoreGateway::commit_event_batch`]'s own
    /// DB-error recording (§4.4 step 6, §8 scenario 5).
    async fn record_failure(&self, history: &SyncHistoryRow, error: &EngineError) {
        let failed = history.clone().fail(error.to_string());
        if let Err(log_err) = self.gateway.append_history_row(&failed).await {
            tracing::error!(error = %log_err, "failed to persist failed sync-history row");
        }
    }

    async fn run_once(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        credential: &ProviderCredential,
        event: &Event,
        kind: SyncKind,
        since: Option<DateTime<Utc>>,
    ) -> Result<SyncHistoryRow, EngineError> {
        let mut history = SyncHistoryRow::started(event.partner_id, event.provider_id.clone(), kind)
            .for_event(event.provider_event_id.clone());

        if let Err(e) = self.gateway.upsert_event(event).await {
            self.record_failure(&history, &e).await;
            return Err(e);
        }

        let races = match self.with_retry(&event.provider_id, || adapter.list_races(credential, event)).await {
            Ok(races) => races,
            Err(e) => {
                self.record_failure(&history, &e).await;
                return Err(e);
            }
        };

        let mut all_participants = Vec::new();
        let mut records_seen = 0i64;
        let mut row_errors = 0i64;

        for race in &races {
            if let Err(e) = self.gateway.upsert_race(race).await {
                self.record_failure(&history, &e).await;
                return Err(e);
            }

            let mut cursor = None;
            loop {
                self.limiter.acquire(event.partner_id, &event.provider_id).await;

                let page_result = self
                    .with_retry(&event.provider_id, || {
                        adapter.list_participants(credential, race, event, since, cursor.clone())
                    })
                    .await;
                let (page, next_cursor) = match page_result {
                    Ok(v) => v,
                    Err(EngineError::RateLimited { retry_after_secs, .. }) => {
                        self.limiter.on_rate_limited(event.partner_id, &event.provider_id, Duration::from_secs(retry_after_secs));
                        tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                        continue;
                    }
                    Err(e) => {
                        self.record_failure(&history, &e).await;
                        return Err(e);
                    }
                };

                let has_more = page.has_more;
                for row in page.participants {
                    records_seen += 1;
                    match row {
                        Ok(participant) => all_participants.push(participant),
                        Err(row_error) => {
                            row_errors += 1;
                            tracing::warn!(row_id = %row_error.row_id, error = %row_error.message, "dropping unparseable participant row");
                        }
                    }
                }

                if !has_more {
                    break;
                }
                cursor = next_cursor;
            }
        }

        history.records_seen = records_seen;
        history.errors = row_errors;
        let committed = self.gateway.commit_event_batch(&all_participants, history).await?;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::models::{Participant, Race, RowResult};
    use engine_providers::ParticipantPage;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeGateway {
        last_sync: Option<DateTime<Utc>>,
        committed: StdMutex<Vec<SyncHistoryRow>>,
    }

    #[async_trait]
    impl StoreGateway for FakeGateway {
        async fn check_schema(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn get_credentials(&self, _provider_id: &str) -> Result<Vec<ProviderCredential>, EngineError> {
            Ok(vec![])
        }
        async fn event_known(&self, _partner_id: i64, _provider_id: &str, _provider_event_id: &str) -> Result<bool, EngineError> {
            Ok(false)
        }
        async fn upsert_event(&self, _event: &Event) -> Result<(), EngineError> {
            Ok(())
        }
        async fn upsert_race(&self, _race: &Race) -> Result<(), EngineError> {
            Ok(())
        }
        async fn commit_event_batch(&self, rows: &[Participant], history: SyncHistoryRow) -> Result<SyncHistoryRow, EngineError> {
            let completed = history.complete(rows.len() as i64, rows.len() as i64, 0);
            self.committed.lock().unwrap().push(completed.clone());
            Ok(completed)
        }
        async fn append_history_row(&self, row: &SyncHistoryRow) -> Result<(), EngineError> {
            self.committed.lock().unwrap().push(row.clone());
            Ok(())
        }
        async fn last_sync_time(&self, _partner_id: i64, _provider_id: &str, _provider_event_id: &str) -> Result<Option<DateTime<Utc>>, EngineError> {
            Ok(self.last_sync)
        }
        async fn future_events(&self, _partner_id: Option<i64>, _horizon: chrono::Duration) -> Result<Vec<Event>, EngineError> {
            Ok(vec![])
        }
    }

    struct FakeAdapter {
        races: Vec<Race>,
        rows: Vec<RowResult<Participant>>,
        fail_incremental: bool,
        fail_list_races: bool,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn provider_name(&self) -> &str {
            "fake"
        }
        async fn authenticate(&self, _credential: &ProviderCredential) -> Result<(), EngineError> {
            Ok(())
        }
        async fn list_events(&self, _credential: &ProviderCredential) -> Result<Vec<Event>, EngineError> {
            Ok(vec![])
        }
        async fn list_races(&self, _credential: &ProviderCredential, _event: &Event) -> Result<Vec<Race>, EngineError> {
            if self.fail_list_races {
                return Err(EngineError::auth("fake", "bad credentials"));
            }
            Ok(self.races.clone())
        }
        async fn list_participants(
            &self,
            _credential: &ProviderCredential,
            _race: &Race,
            _event: &Event,
            since: Option<DateTime<Utc>>,
            _cursor: Option<String>,
        ) -> Result<(ParticipantPage, Option<String>), EngineError> {
            if self.fail_incremental && since.is_some() {
                return Err(EngineError::protocol("fake", "incremental endpoint unavailable"));
            }
            Ok((
                ParticipantPage { participants: self.rows.clone(), has_more: false },
                None,
            ))
        }
    }

    fn event() -> Event {
        Event {
            partner_id: 1,
            provider_id: "fake".to_string(),
            provider_event_id: "100".to_string(),
            name: "Test Event".to_string(),
            start_time: Utc::now(),
            created_at: Utc::now(),
            raw_payload: serde_json::Value::Null,
        }
    }

    fn race() -> Race {
        Race {
            partner_id: 1,
            provider_id: "fake".to_string(),
            provider_race_id: "1".to_string(),
            provider_event_id: "100".to_string(),
            name: "5K".to_string(),
            distance_meters: Some(5000.0),
            start_time: None,
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

    fn executor(gateway: Arc<dyn StoreGateway>) -> SyncExecutor {
        let limiter = Arc::new(RateLimiter::new(HashMap::new()));
        SyncExecutor::new(gateway, limiter, chrono::Duration::days(7))
    }

    #[test]
    fn never_synced_event_is_classified_full() {
        let gateway: Arc<dyn StoreGateway> = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let executor = executor(gateway);
        let kind = executor.decide_kind(None, false, Utc::now());
        assert_eq!(kind, SyncKind::Full);
    }

    #[test]
    fn recently_synced_event_is_classified_incremental() {
        let gateway: Arc<dyn StoreGateway> = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let executor = executor(gateway);
        let kind = executor.decide_kind(Some(Utc::now()), false, Utc::now());
        assert_eq!(kind, SyncKind::Incremental);
    }

    #[test]
    fn stale_watermark_beyond_horizon_falls_back_to_full() {
        let gateway: Arc<dyn StoreGateway> = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let executor = executor(gateway);
        let stale = Utc::now() - chrono::Duration::days(30);
        let kind = executor.decide_kind(Some(stale), false, Utc::now());
        assert_eq!(kind, SyncKind::Full);
    }

    #[test]
    fn force_full_overrides_everything() {
        let gateway: Arc<dyn StoreGateway> = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let executor = executor(gateway);
        let kind = executor.decide_kind(Some(Utc::now()), true, Utc::now());
        assert_eq!(kind, SyncKind::Full);
    }

    #[tokio::test]
    async fn successful_full_sync_completes_with_correct_counts() {
        let gateway = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(FakeAdapter {
            races: vec![race()],
            rows: vec![Ok(sample_participant())],
            fail_incremental: false,
            fail_list_races: false,
        });
        let executor = executor(gateway.clone());
        let history = executor.sync_event(adapter, &credential(), &event(), false).await.unwrap();
        assert_eq!(history.sync_kind, SyncKind::Full);
        assert_eq!(history.records_seen, 1);
        assert_eq!(gateway.committed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_incremental_sync_retries_as_full_fallback() {
        let gateway = Arc::new(FakeGateway { last_sync: Some(Utc::now()), committed: StdMutex::new(vec![]) });
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(FakeAdapter {
            races: vec![race()],
            rows: vec![Ok(sample_participant())],
            fail_incremental: true,
            fail_list_races: false,
        });
        let executor = executor(gateway.clone());
        let history = executor.sync_event(adapter, &credential(), &event(), false).await.unwrap();
        assert_eq!(history.sync_kind, SyncKind::FullFallback);
    }

    #[tokio::test]
    async fn incremental_auth_failure_is_not_retried_as_full_fallback() {
        let gateway = Arc::new(FakeGateway { last_sync: Some(Utc::now()), committed: StdMutex::new(vec![]) });
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(FakeAdapter {
            races: vec![race()],
            rows: vec![Ok(sample_participant())],
            fail_incremental: false,
            fail_list_races: true,
        });
        let executor = executor(gateway.clone());
        let result = executor.sync_event(adapter, &credential(), &event(), false).await;
        assert!(result.is_err());
        assert_eq!(gateway.committed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_db_failure_appends_a_failed_history_row() {
        let gateway = Arc::new(FakeGateway { last_sync: None, committed: StdMutex::new(vec![]) });
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(FakeAdapter {
            races: vec![],
            rows: vec![],
            fail_incremental: false,
            fail_list_races: true,
        });
        let executor = executor(gateway.clone());
        let result = executor.sync_event(adapter, &credential(), &event(), false).await;
        assert!(result.is_err());

        let committed = gateway.committed.lock().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].status, engine_core::models::SyncStatus::Failed);
        assert_eq!(committed[0].reason.as_deref(), Some("authentication failed for provider fake: bad credentials"));
    }

    fn sample_participant() -> Participant {
        Participant {
            partner_id: 1,
            provider_id: "fake".to_string(),
            provider_event_id: "100".to_string(),
            provider_race_id: "1".to_string(),
            provider_participant_id: "p1".to_string(),
            registration_id: None,
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: None,
            gender: None,
            age: None,
            bib_number: None,
            chip_number: None,
            phone: None,
            registration_date: None,
            last_modified: None,
            fetched_date: Utc::now(),
            team_info: serde_json::Value::Null,
            payment_info: serde_json::Value::Null,
            address: serde_json::Value::Null,
            additional_data: serde_json::Value::Null,
            raw_payload: serde_json::Value::Null,
        }
    }
}
