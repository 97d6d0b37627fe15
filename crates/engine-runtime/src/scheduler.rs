//! Event-Driven Scheduler (C6, §4.6): a tick loop that classifies every
//! upcoming event into a priority band, finds which are due for resync, and
//! dispatches workers while respecting per-band caps and per-partner
//! concurrency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use engine_core::config::BandConfig;
use engine_core::error::EngineError;
use engine_core::models::ProviderCredential;
use engine_core::scheduling::{classify, is_due, Band};
use engine_providers::ProviderFactory;
use engine_store::StoreGateway;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::executor::SyncExecutor;
use crate::lock::EventLockRegistry;

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub per_partner_concurrency: usize,
    pub incremental_horizon: chrono::Duration,
}

pub struct Scheduler {
    gateway: Arc<dyn StoreGateway>,
    executor: Arc<SyncExecutor>,
    factory: Arc<ProviderFactory>,
    locks: Arc<EventLockRegistry>,
    band_config: BandConfig,
    config: SchedulerConfig,
    partner_semaphores: StdMutex<HashMap<i64, Arc<Semaphore>>>,
}

impl Scheduler {
    pub fn new(
        gateway: Arc<dyn StoreGateway>,
        executor: Arc<SyncExecutor>,
        factory: Arc<ProviderFactory>,
        locks: Arc<EventLockRegistry>,
        band_config: BandConfig,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            gateway,
            executor,
            factory,
            locks,
            band_config,
            config,
            partner_semaphores: StdMutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, partner_id: i64) -> Arc<Semaphore> {
        let mut map = self.partner_semaphores.lock().unwrap();
        map.entry(partner_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_partner_concurrency)))
            .clone()
    }

    /// Runs until `shutdown` is cancelled, ticking every `tick_interval`.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler received shutdown signal, stopping tick loop");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// One scheduling pass: classify, filter to what's due, dispatch in
    /// High → Medium → Low order, each band capped at its configured
    /// `cycle_cap` so a flood of Low-band events can never starve High out
    /// of its slot in a single tick (§4.6).
    pub async fn tick(&self) -> Result<usize, EngineError> {
        let now = Utc::now();
        let lookahead = chrono::Duration::hours(self.band_config.medium_lookahead_hours);
        let candidates = self.gateway.future_events(None, lookahead).await?;

        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();

        for event in candidates {
            let Some(band) = classify(event.start_time, now, &self.band_config) else { continue };
            let last_sync = self
                .gateway
                .last_sync_time(event.partner_id, &event.provider_id, &event.provider_event_id)
                .await?;
            if !is_due(band, last_sync, now, &self.band_config) {
                continue;
            }
            match band {
                Band::High => high.push(event),
                Band::Medium => medium.push(event),
                Band::Low => low.push(event),
            }
        }

        let mut credentials: HashMap<(i64, String), ProviderCredential> = HashMap::new();
        let mut dispatched = 0usize;

        for (band, events) in [(Band::High, high), (Band::Medium, medium), (Band::Low, low)] {
            let cap = band.cycle_cap(&self.band_config);
            for event in events.into_iter().take(cap) {
                let key = (event.partner_id, event.provider_id.clone());
                if !credentials.contains_key(&key) {
                    for credential in self.gateway.get_credentials(&event.provider_id).await? {
                        credentials.insert((credential.partner_id, credential.provider_id.clone()), credential);
                    }
                }
                let Some(credential) = credentials.get(&key).cloned() else {
                    tracing::warn!(partner_id = event.partner_id, provider_id = %event.provider_id, "no active credential for due event, skipping");
                    continue;
                };

                let Some(guard) = self.locks.try_lock((event.partner_id, event.provider_id.clone(), event.provider_event_id.clone())).await else {
                    tracing::debug!(provider_event_id = %event.provider_event_id, "event already syncing, skipping this tick");
                    continue;
                };

                let semaphore = self.semaphore_for(event.partner_id);
                let Ok(permit) = semaphore.try_acquire_owned() else {
                    tracing::debug!(partner_id = event.partner_id, "partner concurrency limit reached, skipping this tick");
                    continue;
                };

                let adapter = match self.factory.get(&event.provider_id) {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(provider_id = %event.provider_id, error = %e, "no adapter for provider");
                        continue;
                    }
                };

                let executor = self.executor.clone();
                dispatched += 1;

                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    match executor.sync_event(adapter, &credential, &event, false).await {
                        Ok(history) => {
                            tracing::info!(
                                partner_id = event.partner_id,
                                provider_id = %event.provider_id,
                                provider_event_id = %event.provider_event_id,
                                sync_kind = %history.sync_kind,
                                records_seen = history.records_seen,
                                records_upserted = history.records_upserted,
                                "sync completed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                partner_id = event.partner_id,
                                provider_id = %event.provider_id,
                                provider_event_id = %event.provider_event_id,
                                error = %e,
                                "sync failed"
                            );
                        }
                    }
                });
            }
        }

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::config::BandConfig;

    #[test]
    fn high_band_cap_is_respected_conceptually() {
        // The dispatch loop takes at most `cycle_cap` items per band; this
        // is exercised end-to-end in executor/discovery tests where a real
        // gateway double is available. Here we just pin the documented
        // default so a change to BandConfig::default is a visible diff.
        let config = BandConfig::default();
        assert_eq!(config.high_cycle_cap, 50);
        assert_eq!(config.medium_cycle_cap, 20);
        assert_eq!(config.low_cycle_cap, 10);
    }
}
