//! Env-driven configuration for the gateway.
//!
//! Values are read once at startup; `dotenv` is loaded on demand by the
//! binaries. `Config::from_lookup` takes any key lookup so tests can build a
//! configuration without touching the process environment.
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::providers::polling::PollPolicy;

const DEFAULT_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://localhost:4173",
    "https://stackblitz.com",
    "https://museevirtuel.netlify.app",
];

/// Which vendor this deployment talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Stability,
    HuggingFace,
    ModelsLab,
    StableDiffusionApi,
    Replicate,
    Local,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Stability,
        ProviderKind::HuggingFace,
        ProviderKind::ModelsLab,
        ProviderKind::StableDiffusionApi,
        ProviderKind::Replicate,
        ProviderKind::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stability => "stability",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::ModelsLab => "modelslab",
            ProviderKind::StableDiffusionApi => "stablediffusionapi",
            ProviderKind::Replicate => "replicate",
            ProviderKind::Local => "local",
        }
    }

    /// Environment variable holding this vendor's credential, if it needs one.
    pub fn credential_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Stability => Some("STABILITY_AI_API_KEY"),
            ProviderKind::HuggingFace => Some("HUGGINGFACE_API_TOKEN"),
            ProviderKind::ModelsLab => Some("MODELSLAB_API_KEY"),
            ProviderKind::StableDiffusionApi => Some("STABLE_DIFFUSION_API_KEY"),
            ProviderKind::Replicate => Some("REPLICATE_API_TOKEN"),
            ProviderKind::Local => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        let kind = match wanted.as_str() {
            "stability" | "stabilityai" => ProviderKind::Stability,
            "huggingface" | "hf" => ProviderKind::HuggingFace,
            "modelslab" => ProviderKind::ModelsLab,
            "stablediffusionapi" | "sdapi" => ProviderKind::StableDiffusionApi,
            "replicate" => ProviderKind::Replicate,
            "local" | "comfyui" => ProviderKind::Local,
            _ => return Err(ConfigError::UnknownProvider(s.to_string())),
        };
        Ok(kind)
    }
}

// No `Debug`: the struct carries the credential.
#[derive(Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: String,
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub provider_base_url: Option<String>,
    pub provider_model: Option<String>,
    pub comfyui_url: String,
    pub comfyui_workflow: Option<String>,
    pub comfyui_checkpoint: String,
    pub cors_origins: Vec<String>,
    pub vendor_timeout: Duration,
    pub status_probe_timeout: Duration,
    pub poll: PollPolicy,
    pub embed_remote_images: bool,
    pub report_generation_time: bool,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("IMAGE_PROVIDER") {
            Some(name) => name.parse()?,
            None => ProviderKind::ALL
                .into_iter()
                .find(|kind| kind.credential_var().and_then(|var| get(var)).is_some())
                .unwrap_or(ProviderKind::Stability),
        };
        let api_key = provider.credential_var().and_then(|var| get(var));

        let cors_origins = match get("CORS_ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            interval: Duration::from_millis(parse_or(
                &get,
                "POLL_INTERVAL_MS",
                defaults.interval.as_millis() as u64,
            )?),
            max_attempts: parse_or(&get, "POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
        };
        // A zero interval would hammer the vendor's status endpoint.
        if poll.interval.is_zero() {
            return Err(ConfigError::InvalidValue { var: "POLL_INTERVAL_MS", value: "0".to_string() });
        }
        if poll.max_attempts == 0 {
            return Err(ConfigError::InvalidValue { var: "POLL_MAX_ATTEMPTS", value: "0".to_string() });
        }

        Ok(Config {
            api_host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: get("API_PORT").or_else(|| get("PORT")).unwrap_or_else(|| "3001".to_string()),
            provider,
            api_key,
            provider_base_url: get("PROVIDER_BASE_URL"),
            provider_model: get("PROVIDER_MODEL"),
            comfyui_url: get("COMFYUI_URL").unwrap_or_else(|| "http://localhost:8188".to_string()),
            comfyui_workflow: get("COMFYUI_WORKFLOW"),
            comfyui_checkpoint: get("COMFYUI_CHECKPOINT")
                .unwrap_or_else(|| "v1-5-pruned-emaonly.safetensors".to_string()),
            cors_origins,
            vendor_timeout: Duration::from_secs(parse_or(&get, "VENDOR_TIMEOUT_SECS", 30)?),
            status_probe_timeout: Duration::from_secs(parse_or(&get, "STATUS_PROBE_TIMEOUT_SECS", 5)?),
            poll,
            embed_remote_images: parse_bool(&get, "EMBED_REMOTE_IMAGES", false)?,
            report_generation_time: parse_bool(&get, "REPORT_GENERATION_TIME", false)?,
        })
    }

    /// Log the effective configuration. The credential is masked.
    pub fn log_summary(&self) {
        tracing::info!("API_HOST: {}", self.api_host);
        tracing::info!("API_PORT: {}", self.api_port);
        tracing::info!("IMAGE_PROVIDER: {}", self.provider);
        if let Some(var) = self.provider.credential_var() {
            let shown = self.api_key.as_deref().map(mask_secret).unwrap_or_else(|| "<unset>".to_string());
            tracing::info!("{}: {}", var, shown);
        }
        tracing::info!(
            "PROVIDER_BASE_URL: {}",
            self.provider_base_url.as_deref().unwrap_or("<vendor default>")
        );
        if self.provider == ProviderKind::Local {
            tracing::info!("COMFYUI_URL: {}", self.comfyui_url);
            tracing::info!("COMFYUI_WORKFLOW: {}", self.comfyui_workflow.as_deref().unwrap_or("<built-in>"));
        }
        tracing::info!("CORS_ALLOWED_ORIGINS: {}", self.cors_origins.join(", "));
        tracing::info!(
            "poll every {}ms, at most {} attempts",
            self.poll.interval.as_millis(),
            self.poll.max_attempts
        );
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
        Some(value) => Err(ConfigError::InvalidValue { var, value }),
    }
}

/// Keep a short prefix so operators can tell keys apart without leaking them.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}… ({} chars)", prefix, secret.chars().count())
}
