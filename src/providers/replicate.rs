//! Replicate predictions. Creating a prediction returns a job handle that is
//! polled until it reaches a terminal status.
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::credential::CredentialRule;
use super::http::{ensure_success, join_url, read_json, resolve_output};
use super::polling::{poll_until, PollPolicy, PollState};
use super::{CredentialStatus, ImageProvider, ProbeReport, ProviderSettings};
use crate::error::{AppError, AppResult};
use crate::models::{GeneratedImage, GenerationParams};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const DEFAULT_MODEL: &str = "stability-ai/stable-diffusion-3.5-large";

const RULE: CredentialRule = CredentialRule { env_var: "REPLICATE_API_TOKEN", prefix: Some("r8_"), min_len: 20 };

#[derive(Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    output_format: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Deserialize)]
struct Account {
    username: String,
}

pub struct ReplicateProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    poll: PollPolicy,
    embed: bool,
}

impl ReplicateProvider {
    pub fn new(client: Client, settings: ProviderSettings) -> Self {
        ReplicateProvider {
            client,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            model: settings.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: settings.api_key,
            poll: settings.poll,
            embed: settings.embed_remote_images,
        }
    }

    fn bearer(&self) -> AppResult<String> {
        self.api_key
            .as_deref()
            .map(|key| format!("Bearer {}", key))
            .ok_or_else(|| AppError::MissingCredential("Replicate API token is not configured".to_string()))
    }

    async fn get_prediction(&self, id: &str) -> AppResult<PollState<String>> {
        let url = join_url(&self.base_url, &format!("v1/predictions/{}", id));
        let response = self.client.get(&url).header(AUTHORIZATION, self.bearer()?).send().await?;
        let response = ensure_success(self.name(), response).await?;
        let prediction: Prediction = read_json(self.name(), response).await?;
        classify(&prediction)
    }
}

impl Prediction {
    /// Output is either one URL or a list of them, depending on the model.
    fn first_output(&self) -> Option<&str> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.as_str()),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
    }
}

pub fn classify(prediction: &Prediction) -> AppResult<PollState<String>> {
    match prediction.status.as_str() {
        "succeeded" => prediction
            .first_output()
            .map(|url| PollState::Succeeded(url.to_string()))
            .ok_or_else(|| {
                AppError::MalformedResponse(format!(
                    "prediction {} succeeded without output: {:?}",
                    prediction.id, prediction.output
                ))
            }),
        "failed" | "canceled" => {
            let reason = match &prediction.error {
                Some(Value::String(msg)) => msg.clone(),
                Some(other) => other.to_string(),
                None => format!("prediction {}", prediction.status),
            };
            Ok(PollState::Failed(reason))
        }
        "starting" | "processing" => Ok(PollState::Running),
        other => Err(AppError::MalformedResponse(format!("unknown prediction status '{}'", other))),
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    fn name(&self) -> &'static str {
        "replicate"
    }

    fn credential_status(&self) -> CredentialStatus {
        RULE.check(self.api_key.as_deref())
    }

    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage> {
        let url = join_url(&self.base_url, &format!("v1/models/{}/predictions", self.model));
        let body = PredictionRequest {
            input: PredictionInput {
                prompt: &params.prompt,
                negative_prompt: &params.negative_prompt,
                width: params.width,
                height: params.height,
                num_inference_steps: params.steps,
                guidance_scale: params.guidance_scale,
                seed: params.seed,
                output_format: "jpg",
            },
        };

        tracing::info!(url = %url, model = %self.model, "creating Replicate prediction");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer()?)
            .header("Prefer", "wait=5")
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let prediction: Prediction = read_json(self.name(), response).await?;

        let output = match classify(&prediction)? {
            PollState::Succeeded(url) => url,
            PollState::Failed(reason) => return Err(AppError::GenerationFailed(reason)),
            PollState::Running => {
                if prediction.id.is_empty() {
                    return Err(AppError::MalformedResponse("prediction without an id".to_string()));
                }
                let id = prediction.id.as_str();
                tracing::info!(job = id, "prediction queued, polling");
                poll_until(self.poll, id, |_| self.get_prediction(id)).await?
            }
        };
        resolve_output(&self.client, &output, self.embed).await
    }

    async fn probe(&self) -> AppResult<ProbeReport> {
        let response = self
            .client
            .get(join_url(&self.base_url, "v1/account"))
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let account: Account = read_json(self.name(), response).await?;
        Ok(ProbeReport { account: Some(account.username), ..ProbeReport::ok() })
    }
}
