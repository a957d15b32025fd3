//! ModelsLab and its older "Stable Diffusion API" deployment.
//!
//! Both speak the same JSON dialect: the key travels in the body, the answer
//! carries a `status` of `success`, `processing` or `error`, and a queued job
//! is fetched later by id.
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use super::credential::CredentialRule;
use super::http::{ensure_success, join_url, read_json, resolve_output};
use super::polling::{poll_until, PollPolicy, PollState};
use super::{CredentialStatus, ImageProvider, ProviderSettings};
use crate::error::{truncate, AppError, AppResult, MAX_DETAIL_CHARS};
use crate::models::{GeneratedImage, GenerationParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    ModelsLab,
    StableDiffusionApi,
}

impl Flavor {
    fn default_base(&self) -> &'static str {
        match self {
            Flavor::ModelsLab => "https://modelslab.com/api/v6/images",
            Flavor::StableDiffusionApi => "https://stablediffusionapi.com/api/v3",
        }
    }

    fn rule(&self) -> CredentialRule {
        match self {
            Flavor::ModelsLab => CredentialRule { env_var: "MODELSLAB_API_KEY", prefix: None, min_len: 20 },
            Flavor::StableDiffusionApi => {
                CredentialRule { env_var: "STABLE_DIFFUSION_API_KEY", prefix: None, min_len: 20 }
            }
        }
    }
}

#[derive(Serialize)]
struct Text2ImgRequest<'a> {
    key: &'a str,
    prompt: &'a str,
    negative_prompt: &'a str,
    width: String,
    height: String,
    samples: &'static str,
    num_inference_steps: String,
    guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    safety_checker: &'static str,
    enhance_prompt: &'static str,
}

pub struct ModelsLabProvider {
    client: Client,
    flavor: Flavor,
    base_url: String,
    api_key: Option<String>,
    poll: PollPolicy,
    embed: bool,
}

impl ModelsLabProvider {
    pub fn new(client: Client, settings: ProviderSettings, flavor: Flavor) -> Self {
        ModelsLabProvider {
            client,
            flavor,
            base_url: settings.base_or(flavor.default_base()),
            api_key: settings.api_key,
            poll: settings.poll,
            embed: settings.embed_remote_images,
        }
    }

    fn key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::MissingCredential(format!("{} is not configured", self.flavor.rule().env_var)))
    }

    async fn post_json(&self, url: &str, body: &impl Serialize) -> AppResult<Value> {
        let response = self.client.post(url).json(body).send().await?;
        let response = ensure_success(self.name(), response).await?;
        read_json(self.name(), response).await
    }

    async fn fetch(&self, id: &str) -> AppResult<PollState<String>> {
        let url = join_url(&self.base_url, &format!("fetch/{}", id));
        let value = self.post_json(&url, &json!({ "key": self.key()? })).await?;
        classify(&value)
    }
}

/// Map one ModelsLab body to a poll state; `Succeeded` carries the image URL.
pub fn classify(value: &Value) -> AppResult<PollState<String>> {
    let status = value.get("status").and_then(Value::as_str).unwrap_or_default();
    match status {
        "success" => value
            .get("output")
            .and_then(Value::as_array)
            .and_then(|out| out.first())
            .and_then(Value::as_str)
            .map(|url| PollState::Succeeded(url.to_string()))
            .ok_or_else(|| malformed("success without an output URL", value)),
        "processing" | "queued" => Ok(PollState::Running),
        "error" | "failed" => {
            // The vendor spells this field both ways.
            let reason = ["message", "messege", "error"]
                .iter()
                .find_map(|field| value.get(*field))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| value.to_string());
            Ok(PollState::Failed(reason))
        }
        _ => Err(malformed("missing or unknown status", value)),
    }
}

fn job_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn malformed(what: &str, value: &Value) -> AppError {
    AppError::MalformedResponse(format!("{}: {}", what, truncate(&value.to_string(), MAX_DETAIL_CHARS)))
}

#[async_trait]
impl ImageProvider for ModelsLabProvider {
    fn name(&self) -> &'static str {
        match self.flavor {
            Flavor::ModelsLab => "modelslab",
            Flavor::StableDiffusionApi => "stablediffusionapi",
        }
    }

    fn credential_status(&self) -> CredentialStatus {
        self.flavor.rule().check(self.api_key.as_deref())
    }

    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage> {
        let url = join_url(&self.base_url, "text2img");
        let body = Text2ImgRequest {
            key: self.key()?,
            prompt: &params.prompt,
            negative_prompt: &params.negative_prompt,
            width: params.width.to_string(),
            height: params.height.to_string(),
            samples: "1",
            num_inference_steps: params.steps.to_string(),
            guidance_scale: params.guidance_scale,
            seed: params.seed,
            safety_checker: "no",
            enhance_prompt: "no",
        };

        tracing::info!(url = %url, vendor = self.name(), "sending prompt");
        let first = self.post_json(&url, &body).await?;
        let output = match classify(&first)? {
            PollState::Succeeded(url) => url,
            PollState::Failed(reason) => return Err(AppError::GenerationFailed(reason)),
            PollState::Running => {
                let id = job_id(&first).ok_or_else(|| malformed("queued job without an id", &first))?;
                tracing::info!(job = %id, "generation queued, polling");
                poll_until(self.poll, &id, |_| self.fetch(&id)).await?
            }
        };
        resolve_output(&self.client, &output, self.embed).await
    }
}
