//! Thin HTTP client for the ComfyUI endpoints the runner needs.
//!
//! - `system_stats` answers whether a server is there at all.
//! - `upload_image` pushes an input through `/upload/image`.
//! - `queue_prompt` posts a graph to `/prompt`.
//! - `get_history` / `get_image` read the result back.
//!
//! `base_url` includes any route prefix (`/api` on newer frontends).
use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::workflow::ImageRef;

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client: Client::new(), base_url: base }
    }

    pub fn with_client(client: Client, base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client, base_url: base }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn system_stats(&self) -> AppResult<Value> {
        let url = format!("{}/system_stats", self.base_url);
        let response = self.client.get(&url).send().await.map_err(AppError::HttpClient)?;
        Self::ensure_success(response).await?.json().await.map_err(AppError::HttpClient)
    }

    /// Upload a local image into ComfyUI's input folder as `file_name`,
    /// returning the name it was stored under (ComfyUI may rename on
    /// collision). The input folder is shared by every job on the server, so
    /// callers pass a name unique to their run.
    pub async fn upload_image(&self, path: &Path, file_name: &str) -> AppResult<ImageRef> {
        let url = format!("{}/upload/image", self.base_url);
        let bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .map_err(AppError::HttpClient)?;
        let form = Form::new().part("image", part).text("overwrite", "true");

        tracing::debug!("Uploading {} to {}", path.display(), url);
        let response = self.client.post(&url).multipart(form).send().await.map_err(AppError::HttpClient)?;
        Self::ensure_success(response).await?.json().await.map_err(AppError::HttpClient)
    }

    /// Queue a graph for execution and return the server-assigned prompt id.
    pub async fn queue_prompt(&self, graph: &Value, client_id: &str) -> AppResult<String> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        let body = json!({"prompt": graph, "client_id": client_id});
        let response = self.client.post(&url).json(&body).send().await.map_err(AppError::HttpClient)?;
        let queued: QueueResponse = Self::ensure_success(response)
            .await?
            .json()
            .await
            .map_err(AppError::HttpClient)?;
        tracing::info!("Queued prompt {}", queued.prompt_id);
        Ok(queued.prompt_id)
    }

    /// History for one prompt. ComfyUI answers `{}` until the prompt finishes.
    pub async fn get_history(&self, prompt_id: &str) -> AppResult<Value> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let response = self.client.get(&url).send().await.map_err(AppError::HttpClient)?;
        Self::ensure_success(response).await?.json().await.map_err(AppError::HttpClient)
    }

    /// Fetch image bytes via `/view`.
    pub async fn get_image(&self, image: &ImageRef) -> AppResult<Vec<u8>> {
        let url = format!("{}/view", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await
            .map_err(AppError::HttpClient)?;
        let bytes = Self::ensure_success(response).await?.bytes().await.map_err(AppError::HttpClient)?;
        Ok(bytes.to_vec())
    }

    async fn ensure_success(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
        tracing::warn!("ComfyUI answered {}: {}", status, body);
        Err(AppError::ComfyUIStatus { status: status.as_u16(), body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slashes() {
        assert_eq!(ComfyUIClient::new("http://gpu:8188//".into()).base_url(), "http://gpu:8188");
        let shared = ComfyUIClient::with_client(Client::new(), "http://gpu:8188/api/".into());
        assert_eq!(shared.base_url(), "http://gpu:8188/api");
    }
}
