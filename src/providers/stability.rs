//! Stability AI, Stable Diffusion 3 through the v2beta REST API.
//!
//! The generate endpoint only takes `multipart/form-data` and, with
//! `accept: image/*`, answers with the raw image bytes.
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;

use super::credential::CredentialRule;
use super::http::{ensure_success, join_url, read_image, read_json};
use super::{CredentialStatus, ImageProvider, ProbeReport, ProviderSettings};
use crate::error::{AppError, AppResult};
use crate::models::{GeneratedImage, GenerationParams};

const DEFAULT_BASE_URL: &str = "https://api.stability.ai";
const GENERATE_PATH: &str = "/v2beta/stable-image/generate/sd3";
const BALANCE_PATH: &str = "/v1/user/balance";

const RULE: CredentialRule = CredentialRule { env_var: "STABILITY_AI_API_KEY", prefix: Some("sk-"), min_len: 21 };

/// Ratios SD3 accepts in place of explicit dimensions.
const ASPECT_RATIOS: [(&str, f32); 9] = [
    ("21:9", 21.0 / 9.0),
    ("16:9", 16.0 / 9.0),
    ("3:2", 3.0 / 2.0),
    ("5:4", 5.0 / 4.0),
    ("1:1", 1.0),
    ("4:5", 4.0 / 5.0),
    ("2:3", 2.0 / 3.0),
    ("9:16", 9.0 / 16.0),
    ("9:21", 9.0 / 21.0),
];

#[derive(Deserialize)]
struct Balance {
    credits: f64,
}

pub struct StabilityProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl StabilityProvider {
    pub fn new(client: Client, settings: ProviderSettings) -> Self {
        StabilityProvider {
            client,
            base_url: settings.base_or(DEFAULT_BASE_URL),
            api_key: settings.api_key,
        }
    }

    fn bearer(&self) -> AppResult<String> {
        self.api_key
            .as_deref()
            .map(|key| format!("Bearer {}", key))
            .ok_or_else(|| AppError::MissingCredential("Stability AI API key is not configured".to_string()))
    }
}

/// Closest supported aspect ratio to `width:height`.
pub fn aspect_ratio(width: u32, height: u32) -> &'static str {
    let wanted = width as f32 / height.max(1) as f32;
    ASPECT_RATIOS
        .iter()
        .min_by(|a, b| (a.1 - wanted).abs().total_cmp(&(b.1 - wanted).abs()))
        .map(|(label, _)| *label)
        .unwrap_or("1:1")
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    fn name(&self) -> &'static str {
        "stability"
    }

    fn credential_status(&self) -> CredentialStatus {
        RULE.check(self.api_key.as_deref())
    }

    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage> {
        let url = join_url(&self.base_url, GENERATE_PATH);
        let mut form = Form::new()
            .text("prompt", params.prompt.clone())
            .text("negative_prompt", params.negative_prompt.clone())
            .text("output_format", "jpeg")
            .text("aspect_ratio", aspect_ratio(params.width, params.height));
        if let Some(seed) = params.seed {
            form = form.text("seed", seed.to_string());
        }

        tracing::info!(url = %url, "sending prompt to Stability AI");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer()?)
            .header(ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let image_url = read_image(response, "image/jpeg").await?;
        Ok(GeneratedImage { image_url })
    }

    async fn probe(&self) -> AppResult<ProbeReport> {
        let response = self
            .client
            .get(join_url(&self.base_url, BALANCE_PATH))
            .header(AUTHORIZATION, self.bearer()?)
            .send()
            .await?;
        let response = ensure_success(self.name(), response).await?;
        let balance: Balance = read_json(self.name(), response).await?;
        Ok(ProbeReport { credits: Some(balance.credits), ..ProbeReport::ok() })
    }
}
