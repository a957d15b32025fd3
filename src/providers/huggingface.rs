//! Hugging Face Inference API. Text-to-image models answer a JSON request
//! with the raw image bytes.
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::credential::CredentialRule;
use super::http::{ensure_success, join_url, read_image, read_json};
use super::{CredentialStatus, ImageProvider, ProbeReport, ProviderSettings};
use crate::error::{AppError, AppResult};
use crate::models::{GeneratedImage, GenerationParams};

const INFERENCE_URL: &str = "https://api-inference.huggingface.co";
const HUB_URL: &str = "https://huggingface.co";
const DEFAULT_MODEL: &str = "runwayml/stable-diffusion-v1-5";

const RULE: CredentialRule = CredentialRule { env_var: "HUGGINGFACE_API_TOKEN", prefix: Some("hf_"), min_len: 10 };

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: Parameters<'a>,
}

#[derive(Serialize)]
struct Parameters<'a> {
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
}

#[derive(Deserialize)]
struct WhoAmI {
    name: String,
}

pub struct HuggingFaceProvider {
    client: Client,
    inference_url: String,
    hub_url: String,
    model: String,
    api_key: Option<String>,
}

impl HuggingFaceProvider {
    pub fn new(client: Client, settings: ProviderSettings) -> Self {
        // A base override points both the inference and hub calls at one host.
        let hub_url = settings.base_or(HUB_URL);
        HuggingFaceProvider {
            client,
            inference_url: settings.base_or(INFERENCE_URL),
            hub_url,
            model: settings.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: settings.api_key,
        }
    }

    fn bearer(&self) -> AppResult<String> {
        self.api_key
            .as_deref()
            .map(|key| format!("Bearer {}", key))
            .ok_or_else(|| AppError::MissingCredential("Hugging Face token is not configured".to_string()))
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    fn credential_status(&self) -> CredentialStatus {
        RULE.check(self.api_key.as_deref())
    }

    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage> {
        let url = join_url(&self.inference_url, &format!("models/{}", self.model));
        let body = InferenceRequest {
            inputs: &params.prompt,
            parameters: Parameters {
                negative_prompt: &params.negative_prompt,
                width: params.width,
                height: params.height,
                num_inference_steps: params.steps,
                guidance_scale: params.guidance_scale,
                seed: params.seed,
            },
        };

        tracing::info!(url = %url, model = %self.model, "sending prompt to Hugging Face");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer()?)
            .header(ACCEPT, "image/jpeg")
            .json(&body)
            .send()
            .await?;
        // A cold model answers 503 with an estimated load time; it surfaces
        // as-is rather than being retried here.
        let response = ensure_success(self.name(), response).await?;
        let image_url = read_image(response, "image/jpeg").await?;
        Ok(GeneratedImage { image_url })
    }

    async fn probe(&self) -> AppResult<ProbeReport> {
        let response = self
            .client
            .get(join_url(&self.hub_url, "api/whoami-v2"))
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let who: WhoAmI = read_json(self.name(), response).await?;
        Ok(ProbeReport { account: Some(who.name), ..ProbeReport::ok() })
    }
}
