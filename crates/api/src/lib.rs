//! HTTP surface for the clinical order fulfillment workflow.
//!
//! Exposes the orchestration façade as REST endpoints, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod directory;
pub mod error;
pub mod orchestrator;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use settlement::SequentialReceiptNumbers;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use directory::Directory;
use orchestrator::OrchestrationApi;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/advance", post(routes::orders::advance::<S>))
        .route(
            "/orders/{id}/coverage",
            post(routes::orders::verify_coverage::<S>),
        )
        .route("/orders/{id}/amend", post(routes::orders::amend::<S>))
        .route("/orders/{id}/settle", post(routes::orders::settle::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/receipt", get(routes::orders::receipt::<S>))
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

/// Wires the workflow engine and settlement service over `store`.
pub fn create_state<S: OrderStore + Clone + 'static>(
    store: S,
    config: &Config,
    directory: Arc<dyn Directory>,
) -> Arc<AppState<S>> {
    let allocator = SequentialReceiptNumbers::with_prefix(store.clone(), config.receipt_prefix.as_str());
    let api = OrchestrationApi::new(
        store,
        allocator,
        config.workflow_config(),
        config.retry_policy(),
    );

    Arc::new(AppState { api, directory })
}
