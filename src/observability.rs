use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "roomwarden_bookings_created_total";

/// Counter: staff decisions committed. Labels: action.
pub const DECISIONS_TOTAL: &str = "roomwarden_decisions_total";

/// Counter: operations rejected on a time-slot conflict.
pub const CONFLICTS_TOTAL: &str = "roomwarden_conflicts_total";

/// Counter: bookings moved to Expired/Completed by the sweep.
pub const SWEEP_TRANSITIONS_TOTAL: &str = "roomwarden_sweep_transitions_total";

/// Counter: best-effort event publications that failed (logged, not surfaced).
pub const PUBLISH_FAILURES_TOTAL: &str = "roomwarden_publish_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomwarden_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomwarden_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port
/// is None.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Default tracing setup for embedding binaries; honors `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
