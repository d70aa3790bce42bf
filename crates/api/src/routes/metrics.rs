//! Prometheus exposition of projector, seeder and search metrics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for every metric the service emits.
pub fn describe() {
    describe_counter!(
        "projector_events_applied_total",
        "Events applied to the index and acknowledged"
    );
    describe_counter!(
        "projector_events_dropped_total",
        "Malformed events acknowledged without being applied"
    );
    describe_counter!(
        "projector_events_requeued_total",
        "Events handed back to the broker after a store failure"
    );
    describe_counter!(
        "projector_stale_stock_ignored_total",
        "Stock writes rejected because newer stock was already indexed"
    );
    describe_counter!(
        "seeder_items_inserted_total",
        "Reference items written by the bootstrap seeder"
    );
    describe_counter!("search_requests_total", "Search requests by outcome");
    describe_histogram!(
        "search_duration_seconds",
        Unit::Seconds,
        "Time spent answering a search request"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
