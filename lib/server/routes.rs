//! Route definitions for the HTTP server.

use axum::routing::{get, post};
use axum::Router;

use super::{handlers, state::ServerState};

/// Builds the router for every endpoint the server exposes, bound to
/// `state`.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/v1/replicate", post(handlers::replicate_handler))
        .route("/api/v1/replicate-tree", post(handlers::replicate_tree_handler))
        .route("/api/v1/status/{job_id}", get(handlers::status_handler))
        .with_state(state)
}
