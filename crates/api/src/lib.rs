//! HTTP API server for the ticketing core.
//!
//! Exposes the hold and order commands over REST with structured logging
//! (tracing) and Prometheus metrics. Identity arrives pre-authenticated
//! from the gateway as headers and is converted to a typed context at the
//! boundary.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use common::SystemClock;
use inventory::HoldManager;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::SettlementService;
use store::TicketStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use routes::holds::AppState;

/// Creates the application state over the given store.
pub fn create_state<S>(store: S) -> Arc<AppState<S>>
where
    S: TicketStore + Clone,
{
    Arc::new(AppState {
        holds: Arc::new(HoldManager::new(store.clone(), SystemClock)),
        settlement: Arc::new(SettlementService::new(store, SystemClock)),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: TicketStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/holds", post(routes::holds::create::<S>))
        .route("/holds/{id}", get(routes::holds::get::<S>))
        .route("/holds/{id}", delete(routes::holds::release::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/summary", get(routes::orders::summary::<S>))
        .route("/orders/{id}/state", patch(routes::orders::update_state::<S>))
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
