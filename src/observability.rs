use std::net::SocketAddr;

use ulid::Ulid;

use crate::engine::EngineError;
use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "rentd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "rentd_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "rentd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "rentd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "rentd_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "rentd_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rentd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rentd_wal_flush_batch_size";

// ── Domain events ───────────────────────────────────────────────

/// Counter: booking requests rejected by validation. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "rentd_bookings_rejected_total";

/// Counter: car status changes produced by the reconciler.
pub const CAR_STATUS_CHANGES_TOTAL: &str = "rentd_car_status_changes_total";

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

/// Structured event: a booking create/update/delete was rejected.
pub fn booking_rejected(err: &EngineError) {
    metrics::counter!(BOOKINGS_REJECTED_TOTAL, "reason" => err.label()).increment(1);
    tracing::warn!(reason = err.label(), "booking rejected: {err}");
}

/// Structured event: the reconciler changed a car's status.
pub fn car_status_changed(car_id: Ulid, status: u32) {
    metrics::counter!(CAR_STATUS_CHANGES_TOTAL).increment(1);
    tracing::info!(car_id = %car_id, status, "car status reconciled");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertCar { .. } => "insert_car",
        Command::UpdateCar { .. } => "update_car",
        Command::DeleteCar { .. } => "delete_car",
        Command::InsertBooking { .. } => "insert_booking",
        Command::BatchInsertBookings { .. } => "batch_insert_bookings",
        Command::UpdateBooking { .. } => "update_booking",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::InsertReview { .. } => "insert_review",
        Command::UpdateReview { .. } => "update_review",
        Command::DeleteReview { .. } => "delete_review",
        Command::InsertStatusType { .. } => "insert_status_type",
        Command::SelectCars { .. } => "select_cars",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectReviews { .. } => "select_reviews",
        Command::SelectStatusTypes { .. } => "select_status_types",
        Command::SelectAvailability { .. } => "select_availability",
    }
}
