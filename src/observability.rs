use std::net::SocketAddr;

// ── Booking flow (request-driven) ───────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "farmstay_bookings_created_total";

/// Counter: create requests rejected. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "farmstay_bookings_rejected_total";

/// Counter: status transitions applied. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "farmstay_transitions_total";

/// Counter: status transitions rejected. Labels: reason.
pub const TRANSITIONS_REJECTED_TOTAL: &str = "farmstay_transitions_rejected_total";

/// Histogram: create_booking latency in seconds.
pub const CREATE_DURATION_SECONDS: &str = "farmstay_create_duration_seconds";

// ── Engine state ────────────────────────────────────────────────

/// Gauge: bookings currently occupying dates (pending + confirmed).
pub const ACTIVE_BOOKINGS: &str = "farmstay_active_bookings";

/// Counter: bookings auto-completed by the sweeper.
pub const AUTO_COMPLETED_TOTAL: &str = "farmstay_auto_completed_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "farmstay_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "farmstay_journal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
