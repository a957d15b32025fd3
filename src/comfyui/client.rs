//! Thin HTTP client for a local ComfyUI server.
//!
//! - `queue_prompt` posts a workflow graph to `/prompt`.
//! - `get_history` fetches `/history/<prompt_id>` as JSON.
//! - `get_image` proxies `/view?filename=...` and returns raw bytes.
//! - `system_stats` reads `/system_stats` for the status page.
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::providers::http::{ensure_success, image_mime, read_json};

/// Where ComfyUI stored one output image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub filename: String,
    pub subfolder: String,
    pub kind: String,
}

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    client_id: String,
}

impl ComfyUIClient {
    pub fn with_client(client: Client, base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient { client, base_url: base, client_id: uuid::Uuid::new_v4().to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Queue a workflow graph and return the `prompt_id` ComfyUI assigned.
    pub async fn queue_prompt(&self, graph: Value) -> AppResult<String> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        tracing::debug!("Prompt payload: {:?}", graph);

        let body = json!({ "prompt": graph, "client_id": self.client_id });
        let response = self.client.post(&url).json(&body).send().await?;
        let response = ensure_success("comfyui", response).await?;
        let queued: Value = read_json("comfyui", response).await?;

        // Validation problems in the graph come back as 200 with `node_errors`.
        if let Some(errors) = queued.get("node_errors").filter(|v| v.as_object().is_some_and(|o| !o.is_empty())) {
            return Err(AppError::GenerationFailed(format!("ComfyUI rejected the workflow: {}", errors)));
        }
        queued
            .get("prompt_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::MalformedResponse(format!("ComfyUI queue response without prompt_id: {}", queued)))
    }

    /// Execution history for one prompt. Empty until the prompt has run.
    pub async fn get_history(&self, prompt_id: &str) -> AppResult<Value> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let response = self.client.get(&url).send().await?;
        let response = ensure_success("comfyui", response).await?;
        read_json("comfyui", response).await
    }

    /// Fetch image bytes and their mime type via ComfyUI's `/view` endpoint.
    pub async fn get_image(&self, image: &ImageRef) -> AppResult<(Vec<u8>, String)> {
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
            .await?;
        let response = ensure_success("comfyui", response).await?;
        let mime = image_mime(response.headers(), "image/png");
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), mime))
    }

    pub async fn system_stats(&self) -> AppResult<Value> {
        let url = format!("{}/system_stats", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = ensure_success("comfyui", response).await?;
        read_json("comfyui", response).await
    }
}
