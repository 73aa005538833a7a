//! HTTP front: routing and JSON shape of job results.
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use comfyui_edit_worker::api::routes::{router, AppState};
use common::{fake_runner, handler_for, serial};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let app = router(Arc::new(AppState {
        handler: handler_for("run_workflow".into(), Duration::from_secs(1)),
    }));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "healthy"}));
}

#[tokio::test]
async fn runsync_accepts_envelope_and_returns_ok_result() {
    let _guard = serial();
    let dir = tempfile::tempdir().unwrap();
    let runner = fake_runner(dir.path(), r#"printf 'PNG' > "$out""#);
    let app = router(Arc::new(AppState { handler: handler_for(runner, Duration::from_secs(10)) }));

    let response = app
        .oneshot(post_json("/runsync", json!({"input": {"image1_b64": "YQ==", "image2_b64": "Yg=="}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["output_b64"], "UE5H");
    assert!(body["elapsed_s"].is_number());
    assert!(body.get("returncode").is_none());
}

#[tokio::test]
async fn run_returns_error_result_with_200() {
    let app = router(Arc::new(AppState {
        handler: handler_for("run_workflow".into(), Duration::from_secs(1)),
    }));

    let response = app.oneshot(post_json("/run", json!({"image1_b64": "YQ=="}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "error", "message": "image1_b64 and image2_b64 required"})
    );
}
