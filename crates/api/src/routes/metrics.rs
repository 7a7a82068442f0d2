//! Prometheus exposition of the order and inventory metrics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics: renders the installed recorder.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        handle.render(),
    )
}

/// Registers descriptions for the metrics the services emit.
pub fn describe_metrics() {
    metrics::describe_counter!("orders_placed_total", "Orders successfully placed");
    metrics::describe_counter!(
        "order_inventory_conflicts_total",
        "Order placements rejected for insufficient stock"
    );
    metrics::describe_counter!("order_status_updates_total", "Order status changes by target status");
    metrics::describe_counter!(
        "delivery_status_updates_total",
        "Delivery status changes by target status"
    );
    metrics::describe_histogram!(
        "order_placement_duration_seconds",
        metrics::Unit::Seconds,
        "Time to validate, reserve and persist an order"
    );
}
