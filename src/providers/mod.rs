//! Vendor adapters behind one capability.
//!
//! Every vendor implements [`ImageProvider`]. Exactly one is built at startup
//! from [`Config`]; request handlers only ever see `Arc<dyn ImageProvider>`.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::comfyui::client::ComfyUIClient;
use crate::comfyui::workflow::WorkflowTemplate;
use crate::config::{Config, ProviderKind};
use crate::error::AppResult;
use crate::models::{GeneratedImage, GenerationParams};

pub mod credential;
pub mod http;
pub mod huggingface;
pub mod local;
pub mod modelslab;
pub mod polling;
pub mod replicate;
pub mod stability;

pub use credential::{CredentialFormat, CredentialStatus};
pub use polling::PollPolicy;

/// Outcome of a cheap, non-billable vendor call used by `/api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeReport {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProbeReport {
    pub fn ok() -> Self {
        ProbeReport { status: "ok", ..Default::default() }
    }

    pub fn unsupported() -> Self {
        ProbeReport {
            status: "unknown",
            message: Some("vendor exposes no cheap account check".to_string()),
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        ProbeReport { status: "unknown", message: Some(reason.into()), ..Default::default() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProbeReport { status: "error", message: Some(message.into()), ..Default::default() }
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn credential_status(&self) -> CredentialStatus;

    /// One generation. Only called after `credential_status().require()`.
    async fn generate(&self, params: &GenerationParams) -> AppResult<GeneratedImage>;

    /// Confirm the credential is accepted without generating anything.
    async fn probe(&self) -> AppResult<ProbeReport> {
        Ok(ProbeReport::unsupported())
    }
}

/// Settings every vendor adapter is built from.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub poll: PollPolicy,
    pub embed_remote_images: bool,
}

impl ProviderSettings {
    pub fn from_config(config: &Config) -> Self {
        ProviderSettings {
            api_key: config.api_key.clone(),
            base_url: config.provider_base_url.clone(),
            model: config.provider_model.clone(),
            poll: config.poll,
            embed_remote_images: config.embed_remote_images,
        }
    }

    pub(crate) fn base_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// The only place that branches on vendor identity.
pub fn build_provider(config: &Config, client: reqwest::Client) -> AppResult<Arc<dyn ImageProvider>> {
    let settings = ProviderSettings::from_config(config);
    let provider: Arc<dyn ImageProvider> = match config.provider {
        ProviderKind::Stability => Arc::new(stability::StabilityProvider::new(client, settings)),
        ProviderKind::HuggingFace => Arc::new(huggingface::HuggingFaceProvider::new(client, settings)),
        ProviderKind::ModelsLab => {
            Arc::new(modelslab::ModelsLabProvider::new(client, settings, modelslab::Flavor::ModelsLab))
        }
        ProviderKind::StableDiffusionApi => Arc::new(modelslab::ModelsLabProvider::new(
            client,
            settings,
            modelslab::Flavor::StableDiffusionApi,
        )),
        ProviderKind::Replicate => Arc::new(replicate::ReplicateProvider::new(client, settings)),
        ProviderKind::Local => {
            let template = match config.comfyui_workflow.as_deref() {
                Some(path) => WorkflowTemplate::from_file(path)?,
                None => WorkflowTemplate::builtin(),
            };
            let base = config.provider_base_url.clone().unwrap_or_else(|| config.comfyui_url.clone());
            let comfyui = ComfyUIClient::with_client(client, base);
            Arc::new(local::LocalProvider::new(comfyui, template, config.comfyui_checkpoint.clone(), config.poll))
        }
    };
    tracing::info!(provider = provider.name(), "image provider ready");
    Ok(provider)
}
