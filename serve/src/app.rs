//! Axum app: state and route table.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use lectern::Service;

use super::routes;

/// Shared state: the fully wired service graph.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
}

pub fn router(service: Arc<Service>) -> Router {
    let state = AppState { service };
    Router::new()
        .route("/api/conversation", post(routes::conversation))
        .route("/api/page/generate", post(routes::page_generate))
        .route("/api/page/patch", post(routes::page_patch))
        .route("/api/workflow/generate", post(routes::workflow_generate))
        .route("/api/health", get(routes::health))
        .with_state(state)
}
