//! Common error type and result alias.
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A required request field is missing or empty.
    #[error("{0}")]
    Validation(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 in '{field}': {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workflow runner timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// ComfyUI answered with a non-success status.
    #[error("ComfyUI returned {status}: {body}")]
    ComfyUIStatus { status: u16, body: String },

    #[error("ComfyUI error: {0}")]
    ComfyUI(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("No usable ComfyUI execution endpoint found. Tried: {tried:?}")]
    ProbeExhausted { tried: Vec<String> },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// True when ComfyUI rejected the shape of a request rather than failing
    /// to run it.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            AppError::ComfyUIStatus { status: 400 | 404 | 405 | 422, .. }
        )
    }
}
