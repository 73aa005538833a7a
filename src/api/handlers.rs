//! Axum request handlers for the serverless front.
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::routes::AppState;
use crate::job::JobResult;

pub async fn root() -> &'static str {
    "ComfyUI Edit Worker"
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

/// Run one job synchronously. The job outcome is always a 200 with a
/// `JobResult` body; `status` tells success from failure.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Json<JobResult> {
    Json(state.handler.handle(payload).await)
}
