//! Locating a ComfyUI that will run the edit graph, and running it there.
//!
//! The search is a fixed enumeration: every configured base URL, under each
//! known route prefix, with each [`CallShape`]. A server counts as present
//! when `/system_stats` answers. A shape the server rejects with a client
//! status moves on to the next shape; any other failure abandons that
//! endpoint. The first accepted prompt ends the search, so a job is never
//! queued twice.
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::comfyui::client::ComfyUIClient;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::workflow::{apply_params, collect_output_images, wire_input_images, ImageRef};

/// Route prefixes tried under each base URL. Newer frontends serve the API
/// under `/api` as well as at the root.
pub const ROUTE_PREFIXES: &[&str] = &["", "/api"];

/// How the input images are handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Upload both inputs through `/upload/image` and reference the stored names.
    Uploaded,
    /// Reference the staged files by absolute path; needs a shared filesystem.
    LocalPath,
}

impl CallShape {
    pub const ALL: [CallShape; 2] = [CallShape::Uploaded, CallShape::LocalPath];
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallShape::Uploaded => f.write_str("uploaded"),
            CallShape::LocalPath => f.write_str("local-path"),
        }
    }
}

pub struct ProbeRequest<'a> {
    pub graph: &'a Value,
    pub input1: &'a Path,
    pub input2: &'a Path,
    pub output: &'a Path,
    pub params: &'a Map<String, Value>,
}

pub struct Prober {
    http: reqwest::Client,
    candidates: Vec<String>,
    wait: Duration,
    poll_interval: Duration,
}

impl Prober {
    pub fn new(candidates: Vec<String>, wait: Duration, poll_interval: Duration) -> Self {
        Prober { http: reqwest::Client::new(), candidates, wait, poll_interval }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.comfyui_urls.clone(), config.runner_wait, config.poll_interval)
    }

    /// Every base URL and prefix combination, in the order they are tried.
    pub fn endpoints(&self) -> Vec<String> {
        self.candidates
            .iter()
            .flat_map(|base| {
                let base = base.trim_end_matches('/');
                ROUTE_PREFIXES.iter().map(move |prefix| format!("{}{}", base, prefix))
            })
            .collect()
    }

    /// Endpoints answering `/system_stats`, with their reported stats.
    pub async fn reachable(&self) -> Vec<(String, Value)> {
        let mut found = Vec::new();
        for endpoint in self.endpoints() {
            let client = ComfyUIClient::with_client(self.http.clone(), endpoint.clone());
            if let Ok(stats) = client.system_stats().await {
                found.push((endpoint, stats));
            }
        }
        found
    }

    /// Run the graph on the first endpoint that accepts it and write the
    /// first produced image to `req.output`.
    ///
    /// A run that completes without an image output still returns `Ok`; the
    /// caller decides whether a missing output file is a failure.
    pub async fn execute(&self, req: &ProbeRequest<'_>) -> AppResult<String> {
        let client_id = Uuid::new_v4().to_string();
        let mut tried = Vec::new();

        for endpoint in self.endpoints() {
            let client = ComfyUIClient::with_client(self.http.clone(), endpoint.clone());
            if let Err(e) = client.system_stats().await {
                tracing::info!("ComfyUI not reachable at {}: {}", endpoint, e);
                tried.push(endpoint);
                continue;
            }
            tracing::info!("Found ComfyUI at {}", endpoint);

            for shape in CallShape::ALL {
                match self.submit(&client, shape, req, &client_id).await {
                    Ok(prompt_id) => {
                        tracing::info!("{} accepted the {} call as prompt {}", endpoint, shape, prompt_id);
                        return self.await_output(&client, &prompt_id, req.output).await;
                    }
                    Err(e) if e.is_shape_mismatch() => {
                        tracing::info!("{} rejected the {} call: {}", endpoint, shape, e);
                    }
                    Err(e) => {
                        tracing::warn!("{} call to {} failed: {}", shape, endpoint, e);
                        break;
                    }
                }
            }
            tried.push(endpoint);
        }

        Err(AppError::ProbeExhausted { tried })
    }

    async fn submit(
        &self,
        client: &ComfyUIClient,
        shape: CallShape,
        req: &ProbeRequest<'_>,
        client_id: &str,
    ) -> AppResult<String> {
        let names = match shape {
            CallShape::Uploaded => {
                let first = client
                    .upload_image(req.input1, &upload_name(client_id, req.input1))
                    .await?;
                let second = client
                    .upload_image(req.input2, &upload_name(client_id, req.input2))
                    .await?;
                [input_name(&first), input_name(&second)]
            }
            CallShape::LocalPath => [
                req.input1.display().to_string(),
                req.input2.display().to_string(),
            ],
        };

        let mut graph = req.graph.clone();
        wire_input_images(&mut graph, [names[0].as_str(), names[1].as_str()])?;
        apply_params(&mut graph, req.params)?;
        client.queue_prompt(&graph, client_id).await
    }

    async fn await_output(&self, client: &ComfyUIClient, prompt_id: &str, output: &Path) -> AppResult<String> {
        let deadline = Instant::now() + self.wait;
        loop {
            let history = client.get_history(prompt_id).await?;
            if let Some(entry) = history.get(prompt_id) {
                let status = entry.get("status");
                if status.and_then(|s| s.get("status_str")).and_then(Value::as_str) == Some("error") {
                    let messages = status
                        .and_then(|s| s.get("messages"))
                        .map(|m| m.to_string())
                        .unwrap_or_default();
                    return Err(AppError::ComfyUI(format!("prompt {} failed: {}", prompt_id, messages)));
                }
                // Older servers omit `status`; an entry only shows up once done.
                let completed = status
                    .and_then(|s| s.get("completed"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if completed {
                    return match collect_output_images(entry).first() {
                        Some(image) => {
                            let bytes = client.get_image(image).await?;
                            tokio::fs::write(output, &bytes).await?;
                            Ok(format!(
                                "prompt {} produced {} ({} bytes)",
                                prompt_id,
                                image.filename,
                                bytes.len()
                            ))
                        }
                        None => Ok(format!("prompt {} completed without image outputs", prompt_id)),
                    };
                }
            }
            if Instant::now() >= deadline {
                return Err(AppError::ComfyUI(format!(
                    "gave up waiting for prompt {} after {}s",
                    prompt_id,
                    self.wait.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Per-run upload name, so concurrent jobs never overwrite each other's
/// inputs in ComfyUI's shared input folder.
fn upload_name(client_id: &str, path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input.png".to_string());
    format!("{}-{}", client_id, base)
}

/// The value a LoadImage node expects for an uploaded file.
fn input_name(image: &ImageRef) -> String {
    if image.subfolder.is_empty() {
        image.filename.clone()
    } else {
        format!("{}/{}", image.subfolder, image.filename)
    }
}
