//! HTTP API server with observability for the farm delivery marketplace.
//!
//! Provides REST endpoints for order placement, status updates and
//! statistics, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, put};
use domain::MarketplaceStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::metrics::describe_metrics;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: MarketplaceStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route("/orders/client", get(routes::orders::client_orders::<S>))
        .route("/orders/farmer", get(routes::orders::farmer_orders::<S>))
        .route("/orders/recent", get(routes::orders::recent::<S>))
        .route("/orders/stats", get(routes::stats::dashboard::<S>))
        .route("/orders/delivery-stats", get(routes::stats::deliveries::<S>))
        .route("/orders/payment-stats", get(routes::stats::payments::<S>))
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).delete(routes::orders::delete::<S>),
        )
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route(
            "/orders/{id}/delivery-status",
            put(routes::orders::update_delivery_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
