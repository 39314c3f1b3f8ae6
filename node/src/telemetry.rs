// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize telemetry (logs + metrics). Safe to call more than once.
pub fn init_telemetry() {
    // 1. Tracing
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "brook_node=info,brook_cli=info".into()),
    );
    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }

    // 2. Metrics (Prometheus)
    if PROM_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                if PROM_HANDLE.set(handle).is_err() {
                    tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to install Prometheus recorder"),
        }
    }

    describe_metrics();
    metrics::gauge!("brook_engine_up", 1.0);
}

pub fn describe_metrics() {
    metrics::describe_counter!("brook_events_appended_total", "Events committed by the appender");
    metrics::describe_histogram!("brook_append_duration_seconds", "Time taken to append a batch");
    metrics::describe_counter!("brook_store_retries_total", "Store calls retried after a transient failure");
    metrics::describe_counter!("brook_recovery_total", "Pending appends resolved by recovery, by outcome");
    metrics::describe_counter!("brook_read_aborted_total", "Range reads aborted by consistency lag");
    metrics::describe_counter!("brook_snapshot_cache_hits_total", "Models served straight from cache");
    metrics::describe_counter!("brook_snapshot_cache_misses_total", "Model requests that needed replay");
    metrics::describe_counter!(
        "brook_snapshot_fingerprint_mismatch_total",
        "Snapshots ignored because the reducer set changed"
    );
    metrics::describe_counter!("brook_snapshot_base_used_total", "Rebuilds seeded from an earlier snapshot");
    metrics::describe_counter!("brook_snapshot_persist_failures_total", "Best-effort snapshot writes that failed");
    metrics::describe_histogram!("brook_snapshot_rebuild_duration_seconds", "Time taken to rebuild a model");
    metrics::describe_histogram!("brook_snapshot_rebuild_events", "Events replayed per rebuild");
}

/// Render the Prometheus exposition text.
pub fn render_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
