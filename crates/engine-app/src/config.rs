//! CLI surface and process-wide logging setup (§6, §11).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Which component of the engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Long-running scheduler tick loop plus twice-daily discovery (§4.5, §4.6).
    Scheduler,
    /// One-shot historical backfill of a fixed work list, resumable via checkpoint (§4.7).
    Backfill,
    /// Runs discovery once for every active credential and exits.
    DiscoverOnce,
    /// Runs exactly one sync for `--partner`/a single event and exits.
    Once,
}

#[derive(Debug, Parser)]
#[command(name = "provider-engine", about = "Provider integration engine for the race-timing platform")]
pub struct Cli {
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// Force a full resync instead of the scheduler's incremental decision.
    #[arg(long)]
    pub force_full: bool,

    /// Overrides `incremental_horizon_days` from the config file for this run.
    #[arg(long)]
    pub incremental_horizon_days: Option<i64>,

    /// Restricts the run to a single partner. Required for `--mode once` and
    /// `--mode backfill`.
    #[arg(long)]
    pub partner: Option<i64>,

    /// Provider id to backfill (e.g. `runsignup`). Required for `--mode backfill`.
    #[arg(long)]
    pub provider: Option<String>,

    /// Resumes a prior `--mode backfill` run's checkpoint by id instead of
    /// starting a fresh one. Omit to start (and checkpoint) a new run.
    #[arg(long)]
    pub run_id: Option<Uuid>,

    /// Logs what would be synced without writing to the canonical store.
    #[arg(long)]
    pub dry_run: bool,

    /// Path to the TOML config file. Defaults to built-in defaults plus env.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Process exit codes (§6): distinguish "ran fine", "ran but something
/// degraded", and "could not even start" so an operator's monitoring can
/// alert differently on each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    PartialFailure = 1,
    ConfigurationError = 2,
    LockHeld = 3,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Initializes JSON structured logging. Every event carries `component`,
/// and sync-path events additionally carry `partner_id`, `provider_id`,
/// `event_id`, and `sync_kind` as structured fields rather than being baked
/// into the message string, so log aggregation can filter/group on them.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer().with_target(true).with_thread_ids(false).json();

    tracing_subscriber::registry().with(env_filter).with(formatting_layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_scheduler_mode() {
        let cli = Cli::parse_from(["provider-engine", "--mode", "scheduler"]);
        assert_eq!(cli.mode, Mode::Scheduler);
        assert!(!cli.force_full);
    }

    #[test]
    fn cli_parses_once_mode_with_partner_and_force_full() {
        let cli = Cli::parse_from(["provider-engine", "--mode", "once", "--partner", "7", "--force-full"]);
        assert_eq!(cli.mode, Mode::Once);
        assert_eq!(cli.partner, Some(7));
        assert!(cli.force_full);
    }

    #[test]
    fn exit_code_converts_to_process_exit_status() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::ConfigurationError), 2);
    }
}
