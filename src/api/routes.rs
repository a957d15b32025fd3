//! Shared application state and router assembly.
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::prompt::PromptConstructor;
use crate::providers::{build_provider, ImageProvider};

pub struct AppState {
    pub provider: Arc<dyn ImageProvider>,
    pub prompt_constructor: PromptConstructor,
    pub status_probe_timeout: Duration,
    pub report_generation_time: bool,
}

impl AppState {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        AppState {
            provider,
            prompt_constructor: PromptConstructor::new(),
            status_probe_timeout: Duration::from_secs(5),
            report_generation_time: false,
        }
    }

    /// Build the HTTP client and the configured provider.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.vendor_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;
        let provider = build_provider(config, client)?;
        Ok(AppState {
            provider,
            prompt_constructor: PromptConstructor::new(),
            status_probe_timeout: config.status_probe_timeout,
            report_generation_time: config.report_generation_time,
        })
    }
}

/// CORS limited to the configured frontends; never the permissive wildcard.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn router(state: Arc<AppState>, origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/status", get(handlers::status))
        .route("/api/generate", post(handlers::generate))
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
