//! Env-driven configuration for the worker, the runner and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults match the serverless image layout.
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WORKFLOW: &str =
    "/workspace/runpod-slim/ComfyUI/workflows/image_qwen_image_edit_2509_API.json";
pub const DEFAULT_COMFYUI_URLS: &str = "http://127.0.0.1:8188,http://localhost:8188";
pub const RUNNER_BIN_NAME: &str = "run_workflow";

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_urls: Vec<String>,
    pub default_workflow: String,
    pub runner_bin: PathBuf,
    pub runner_timeout: Duration,
    pub runner_wait: Duration,
    pub poll_interval: Duration,
    pub api_host: String,
    pub api_port: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Result<Self, env::VarError> {
        Ok(Config {
            comfyui_urls: split_urls(
                &env::var("COMFYUI_URLS").unwrap_or_else(|_| DEFAULT_COMFYUI_URLS.to_string()),
            ),
            default_workflow: env::var("DEFAULT_WORKFLOW")
                .unwrap_or_else(|_| DEFAULT_WORKFLOW.to_string()),
            runner_bin: env::var("RUNNER_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_runner_bin()),
            runner_timeout: Duration::from_secs(parse_or("RUNNER_TIMEOUT_SECS", 600)),
            runner_wait: Duration::from_secs(parse_or("RUNNER_WAIT_SECS", 570)),
            poll_interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", 1000)),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8000".to_string()),
        })
    }

    pub fn log_env_vars() {
        for key in [
            "COMFYUI_URLS",
            "DEFAULT_WORKFLOW",
            "RUNNER_BIN",
            "RUNNER_TIMEOUT_SECS",
            "RUNNER_WAIT_SECS",
            "POLL_INTERVAL_MS",
            "API_HOST",
            "API_PORT",
        ] {
            let value = env::var(key).unwrap_or_else(|_| "<unset>".to_string());
            tracing::info!("{}: {}", key, value);
        }
    }
}

/// Split a comma separated URL list, dropping blanks and trailing slashes.
pub fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} '{}', falling back to {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

// The runner ships next to the worker binary in the image.
fn default_runner_bin() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(RUNNER_BIN_NAME)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(RUNNER_BIN_NAME))
}
