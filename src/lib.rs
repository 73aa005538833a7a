//! ComfyUI image-edit worker library
//!
//! Modules:
//! - `api`: Axum router and handlers for the serverless `/run` endpoint.
//! - `handler`: Per-job staging, runner invocation and result classification.
//! - `job`: Job request/result payloads.
//! - `process`: Child-process execution with a timeout.
//! - `runner`: The `run_workflow` entry point and its exit codes.
//! - `probe`: Finding a ComfyUI endpoint and running the graph on it.
//! - `comfyui`: Thin client for ComfyUI REST endpoints.
//! - `workflow`: API-format graph loading, input wiring and params.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `Handler`,
//! `JobResult`, `ComfyUIClient` and `Prober`.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod probe;
pub mod process;
pub mod runner;
pub mod workflow;

pub use comfyui::client::ComfyUIClient;
pub use config::Config;
pub use handler::{Handler, HandlerConfig};
pub use job::{JobRequest, JobResult, JobStatus};
pub use probe::Prober;
