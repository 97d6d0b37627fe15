//! Prometheus metrics for sync throughput, rate-limiter pressure, and queue
//! depth (§9: "expose basic counters/gauges for operability").

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Completed sync runs by provider, kind, and terminal status.
    pub static ref SYNCS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("syncs_total", "Total number of completed sync runs")
            .namespace("provider_engine")
            .subsystem("sync"),
        &["provider", "kind", "status"]
    ).unwrap();

    /// Duration of a single sync run.
    pub static ref SYNC_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("sync_duration_seconds", "Duration of a sync run in seconds")
            .namespace("provider_engine")
            .subsystem("sync")
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 1800.0]),
        &["provider", "kind"]
    ).unwrap();

    /// Time a worker spent blocked on the rate limiter before a token was
    /// available.
    pub static ref RATE_LIMIT_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("rate_limit_wait_seconds", "Time spent waiting for a rate limiter token")
            .namespace("provider_engine")
            .subsystem("rate_limiter")
            .buckets(vec![0.0, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).unwrap();

    /// Number of event-syncs currently queued per band, sampled each tick.
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("queue_depth", "Number of due event-syncs queued by priority band")
            .namespace("provider_engine")
            .subsystem("scheduler"),
        &["band"]
    ).unwrap();

    /// Number of event-syncs currently running.
    pub static ref ACTIVE_SYNCS: IntGauge = IntGauge::with_opts(
        Opts::new("active_syncs", "Number of sync tasks currently executing")
            .namespace("provider_engine")
            .subsystem("scheduler")
    ).unwrap();

    /// Per-row data errors encountered during normalization, by provider.
    pub static ref ROW_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("row_errors_total", "Total number of per-row errors encountered during sync")
            .namespace("provider_engine")
            .subsystem("sync"),
        &["provider", "kind"]
    ).unwrap();
}

/// Registers every metric above with the global registry. Must run once at
/// startup before any handler reads or writes a metric.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_WAIT_SECONDS.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_SYNCS.clone()))?;
    REGISTRY.register(Box::new(ROW_ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Renders the registry in Prometheus text-exposition format.
pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder.encode_to_string(&metric_families)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_after_init_contains_known_metric_names() {
        // Registering twice (once per test process run) would error, so guard
        // with a check on whether the family already shows up.
        let _ = init_metrics();
        let output = export_metrics().unwrap();
        assert!(output.contains("provider_engine_sync_syncs_total") || output.contains("syncs_total"));
    }
}
