//! Local diffusion model served by ComfyUI.
//!
//! The checkpoint stays loaded inside the ComfyUI process; the gateway renders
//! a workflow, queues it, polls the history endpoint and inlines the saved
//! image. No credential is involved.
use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::data_uri;
use super::polling::{poll_until, PollPolicy, PollState};
use super::{CredentialStatus, ImageProvider, ProbeReport};
use crate::comfyui::{ComfyUIClient, ImageRef, WorkflowTemplate};
use crate::error::{AppError, AppResult};
use crate::models::{GeneratedImage, GenerationParams};

pub struct LocalProvider {
    comfyui: ComfyUIClient,
    template: WorkflowTemplate,
    checkpoint: String,
    poll: PollPolicy,
}

impl LocalProvider {
    pub fn new(comfyui: ComfyUIClient, template: WorkflowTemplate, checkpoint: String, poll: PollPolicy) -> Self {
        LocalProvider { comfyui, template, checkpoint, poll }
    }

    async fn check(&self, prompt_id: &str) -> AppResult<PollState<ImageRef>> {
        let history = self.comfyui.get_history(prompt_id).await?;
        classify_history(&history, prompt_id)
    }
}

/// Inspect `/history/<id>`: absent entry means still queued or running.
pub fn classify_history(history: &Value, prompt_id: &str) -> AppResult<PollState<ImageRef>> {
    let Some(entry) = history.get(prompt_id) else {
        return Ok(PollState::Running);
    };
    let status = entry.get("status");
    if status.and_then(|s| s.get("status_str")).and_then(Value::as_str) == Some("error") {
        let messages = status.and_then(|s| s.get("messages")).cloned().unwrap_or(Value::Null);
        return Ok(PollState::Failed(format!("ComfyUI execution error: {}", messages)));
    }

    let mut images = Vec::new();
    if let Some(outputs) = entry.get("outputs") {
        collect_images(outputs, &mut images);
    }
    match images.into_iter().next() {
        Some(image) => Ok(PollState::Succeeded(image)),
        None if status.and_then(|s| s.get("completed")).and_then(Value::as_bool) == Some(true) => Err(
            AppError::MalformedResponse(format!("prompt {} completed without saving an image", prompt_id)),
        ),
        None => Ok(PollState::Running),
    }
}

fn collect_images(v: &Value, out: &mut Vec<ImageRef>) {
    match v {
        Value::Object(map) => {
            if let Some(filename) = map.get("filename").and_then(Value::as_str) {
                let field = |key: &str, default: &str| {
                    map.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
                };
                out.push(ImageRef {
                    filename: filename.to_string(),
                    subfolder: field("subfolder", ""),
                    kind: field("type", "output"),
                });
                return;
            }
            for (_k, vv) in map.iter() {
                collect_images(vv, out);
            }
        }
        Value::Array(arr) => {
            for vv in arr {
                collect_images(vv, out);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl ImageProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn credential_status(&self) -> CredentialStatus {
        CredentialStatus::not_required()
    }

    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage> {
        // KSampler has no "random" value, so pick one when the caller did not.
        let seed = params.seed.unwrap_or_else(|| uuid::Uuid::new_v4().as_u128() as u32);
        let graph = self.template.render(&json!({
            "positive": params.prompt,
            "negative": params.negative_prompt,
            "seed": seed,
            "steps": params.steps,
            "cfg": params.guidance_scale,
            "width": params.width,
            "height": params.height,
            "checkpoint": self.checkpoint,
        }))?;

        let prompt_id = self.comfyui.queue_prompt(graph).await?;
        tracing::info!(job = %prompt_id, "workflow queued on ComfyUI, polling history");
        let image = poll_until(self.poll, &prompt_id, |_| self.check(&prompt_id)).await?;
        let (bytes, mime) = self.comfyui.get_image(&image).await?;
        if bytes.is_empty() {
            return Err(AppError::MalformedResponse(format!("ComfyUI returned an empty file for {}", image.filename)));
        }
        Ok(GeneratedImage { image_url: data_uri(&mime, &bytes) })
    }

    async fn probe(&self) -> AppResult<ProbeReport> {
        let stats = self.comfyui.system_stats().await?;
        let device = stats
            .get("devices")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .and_then(|d| d.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(ProbeReport { device, account: Some(self.comfyui.base_url().to_string()), ..ProbeReport::ok() })
    }
}
