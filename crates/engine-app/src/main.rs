mod config;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use config::{Cli, ExitCode, Mode};
use engine_core::config::EngineConfig;
use engine_providers::{ProviderBaseUrls, ProviderFactory, RateLimiter};
use engine_runtime::{
    CheckpointStore, DiscoveryWorker, EventLockRegistry, InstanceLock, Scheduler, SchedulerConfig, SyncExecutor,
};
use engine_store::{PgStoreGateway, PoolConfig, StoreGateway};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    config::init_logging();

    let cli = Cli::parse();
    let exit_code = run(cli).await;
    std::process::exit(exit_code.into());
}

async fn run(cli: Cli) -> ExitCode {
    let engine_config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::ConfigurationError;
        }
    };
    if let Err(e) = engine_config.validate() {
        error!(error = %e, "configuration failed validation");
        return ExitCode::ConfigurationError;
    }

    let _instance_lock = match InstanceLock::acquire(&engine_config.lock_file_path) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "another instance already holds the scheduler lock");
            return ExitCode::LockHeld;
        }
    };

    let pool = match PoolConfig::new(engine_config.database_url.clone()).build() {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to build database connection pool");
            return ExitCode::ConfigurationError;
        }
    };

    let gateway: Arc<dyn StoreGateway> = Arc::new(PgStoreGateway::new(pool));
    if let Err(e) = gateway.check_schema().await {
        error!(error = %e, "canonical store schema check failed at startup");
        return ExitCode::ConfigurationError;
    }

    let limiter = Arc::new(RateLimiter::new(engine_config.rate_limits.clone()));
    let factory = Arc::new(ProviderFactory::new(ProviderBaseUrls::default(), engine_config.http_timeout));
    let incremental_horizon = chrono::Duration::days(
        cli.incremental_horizon_days.unwrap_or(engine_config.incremental_horizon_days),
    );
    let executor = Arc::new(SyncExecutor::new(gateway.clone(), limiter.clone(), incremental_horizon));
    let locks = Arc::new(EventLockRegistry::new());

    info!(mode = ?cli.mode, dry_run = cli.dry_run, "starting provider integration engine");

    match cli.mode {
        Mode::Scheduler => run_scheduler(gateway, executor, factory, locks, &engine_config).await,
        Mode::DiscoverOnce => run_discover_once(gateway, limiter, factory).await,
        Mode::Once => run_once(gateway, executor, factory, cli).await,
        Mode::Backfill => run_backfill(gateway, executor, factory, cli).await,
    }
}

async fn run_scheduler(
    gateway: Arc<dyn StoreGateway>,
    executor: Arc<SyncExecutor>,
    factory: Arc<ProviderFactory>,
    locks: Arc<EventLockRegistry>,
    engine_config: &EngineConfig,
) -> ExitCode {
    let scheduler = Arc::new(Scheduler::new(
        gateway,
        executor,
        factory,
        locks,
        engine_config.band.clone(),
        SchedulerConfig {
            tick_interval: engine_config.tick_interval,
            per_partner_concurrency: engine_config.per_partner_concurrency,
            incremental_horizon: chrono::Duration::days(engine_config.incremental_horizon_days),
        },
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining in-flight syncs");
        shutdown_signal.cancel();
    });

    scheduler.run(shutdown).await;
    ExitCode::Success
}

async fn run_discover_once(
    gateway: Arc<dyn StoreGateway>,
    limiter: Arc<RateLimiter>,
    factory: Arc<ProviderFactory>,
) -> ExitCode {
    let worker = DiscoveryWorker::new(gateway.clone(), limiter);
    let mut had_failure = false;

    for provider_id in ["runsignup", "haku", "race_roster", "lets_do_this", "chronotrack"] {
        let credentials = match gateway.get_credentials(provider_id).await {
            Ok(c) => c,
            Err(e) => {
                error!(provider_id, error = %e, "failed to load credentials");
                had_failure = true;
                continue;
            }
        };
        let adapter = match factory.get(provider_id) {
            Ok(a) => a,
            Err(e) => {
                error!(provider_id, error = %e, "no adapter registered");
                had_failure = true;
                continue;
            }
        };

        for credential in &credentials {
            match worker.discover(adapter.clone(), credential).await {
                Ok(outcome) => info!(
                    partner_id = credential.partner_id,
                    provider_id,
                    events_seen = outcome.events_seen,
                    races_seen = outcome.races_seen,
                    "discovery pass complete"
                ),
                Err(e) => {
                    error!(partner_id = credential.partner_id, provider_id, error = %e, "discovery pass failed");
                    had_failure = true;
                }
            }
        }
    }

    if had_failure { ExitCode::PartialFailure } else { ExitCode::Success }
}

async fn run_once(
    gateway: Arc<dyn StoreGateway>,
    executor: Arc<SyncExecutor>,
    factory: Arc<ProviderFactory>,
    cli: Cli,
) -> ExitCode {
    let Some(partner_id) = cli.partner else {
        error!("--mode once requires --partner");
        return ExitCode::ConfigurationError;
    };

    let events = match gateway.future_events(Some(partner_id), chrono::Duration::days(365)).await {
        Ok(events) => events,
        Err(e) => {
            error!(partner_id, error = %e, "failed to list events for partner");
            return ExitCode::PartialFailure;
        }
    };

    let mut had_failure = false;
    let mut credentials_by_provider: HashMap<String, Vec<engine_core::models::ProviderCredential>> = HashMap::new();

    for event in events {
        let creds = match credentials_by_provider.get(&event.provider_id) {
            Some(c) => c,
            None => {
                let fetched = match gateway.get_credentials(&event.provider_id).await {
                    Ok(c) => c,
                    Err(e) => {
                        error!(provider_id = %event.provider_id, error = %e, "failed to load credentials");
                        had_failure = true;
                        continue;
                    }
                };
                credentials_by_provider.entry(event.provider_id.clone()).or_insert(fetched)
            }
        };
        let Some(credential) = creds.iter().find(|c| c.partner_id == partner_id) else {
            continue;
        };
        let adapter = match factory.get(&event.provider_id) {
            Ok(a) => a,
            Err(e) => {
                error!(provider_id = %event.provider_id, error = %e, "no adapter registered");
                had_failure = true;
                continue;
            }
        };

        if cli.dry_run {
            info!(provider_event_id = %event.provider_event_id, "dry run: would sync this event");
            continue;
        }

        match executor.sync_event(adapter, credential, &event, cli.force_full).await {
            Ok(history) => info!(
                provider_event_id = %event.provider_event_id,
                sync_kind = %history.sync_kind,
                records_seen = history.records_seen,
                "sync complete"
            ),
            Err(e) => {
                error!(provider_event_id = %event.provider_event_id, error = %e, "sync failed");
                had_failure = true;
            }
        }
    }

    if had_failure { ExitCode::PartialFailure } else { ExitCode::Success }
}

async fn run_backfill(
    gateway: Arc<dyn StoreGateway>,
    executor: Arc<SyncExecutor>,
    factory: Arc<ProviderFactory>,
    cli: Cli,
) -> ExitCode {
    let Some(partner_id) = cli.partner else {
        error!("--mode backfill requires --partner");
        return ExitCode::ConfigurationError;
    };

    let Some(provider_id) = cli.provider.as_deref() else {
        error!("--mode backfill requires --provider");
        return ExitCode::ConfigurationError;
    };

    let checkpoint_store = engine_runtime::FileCheckpointStore::new("/var/lib/provider-engine/checkpoints");
    let run_id = cli.run_id.unwrap_or_else(Uuid::new_v4);

    let credentials = match gateway.get_credentials(provider_id).await {
        Ok(c) => c.into_iter().filter(|c| c.partner_id == partner_id).collect::<Vec<_>>(),
        Err(e) => {
            error!(partner_id, error = %e, "failed to load credentials for backfill");
            return ExitCode::PartialFailure;
        }
    };
    let Some(credential) = credentials.first() else {
        error!(partner_id, "no active credential found for backfill");
        return ExitCode::ConfigurationError;
    };

    let adapter = match factory.get(&credential.provider_id) {
        Ok(a) => a,
        Err(e) => {
            error!(provider_id = %credential.provider_id, error = %e, "no adapter registered");
            return ExitCode::ConfigurationError;
        }
    };

    let events = match adapter.list_events(credential).await {
        Ok(events) => events,
        Err(e) => {
            error!(error = %e, "failed to list events for backfill");
            return ExitCode::PartialFailure;
        }
    };

    let work_items: Vec<_> = events
        .iter()
        .map(|e| engine_core::models::BackfillWorkItem {
            partner_id: e.partner_id,
            provider_id: e.provider_id.clone(),
            provider_event_id: e.provider_event_id.clone(),
        })
        .collect();

    let checkpoint = match engine_runtime::checkpoint::resume_or_start(&checkpoint_store, run_id, |id| {
        engine_core::models::BackfillCheckpoint::new(id, work_items)
    })
    .await
    {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load or create backfill checkpoint");
            return ExitCode::PartialFailure;
        }
    };

    let mut checkpoint = checkpoint;
    let mut had_failure = false;

    for (offset, item) in checkpoint.remaining().to_vec().into_iter().enumerate() {
        let index = (checkpoint.last_completed_index + 1) as usize + offset;
        let event = events.iter().find(|e| e.provider_event_id == item.provider_event_id);
        let Some(event) = event else { continue };

        match executor.sync_event(adapter.clone(), credential, event, true).await {
            Ok(_) => {
                checkpoint.mark_completed(index);
                if let Err(e) = checkpoint_store.save(&checkpoint).await {
                    error!(error = %e, "failed to persist backfill checkpoint");
                }
            }
            Err(e) => {
                error!(provider_event_id = %item.provider_event_id, error = %e, "backfill item failed");
                had_failure = true;
            }
        }
    }

    if !had_failure && checkpoint.remaining().is_empty() {
        if let Err(e) = checkpoint_store.delete(run_id).await {
            error!(run_id = %run_id, error = %e, "failed to delete completed backfill checkpoint");
        }
    }

    info!(run_id = %run_id, partner_id, "backfill finished");
    if had_failure { ExitCode::PartialFailure } else { ExitCode::Success }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
