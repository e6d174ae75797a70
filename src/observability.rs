use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "lendpool_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "lendpool_request_duration_seconds";

/// Counter: bookings created (status WAITING).
pub const BOOKINGS_CREATED_TOTAL: &str = "lendpool_bookings_created_total";

/// Counter: booking attempts rejected by the conflict check.
pub const BOOKING_CONFLICTS_TOTAL: &str = "lendpool_booking_conflicts_total";

/// Counter: owner decisions. Labels: decision.
pub const BOOKING_DECISIONS_TOTAL: &str = "lendpool_booking_decisions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lendpool_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lendpool_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
