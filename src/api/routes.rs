use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::handler::Handler;

pub struct AppState {
    pub handler: Handler,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/run", post(handlers::run_job))
        .route("/runsync", post(handlers::run_job))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
