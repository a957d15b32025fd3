//! Axum request handlers for the HTTP API.
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::api::routes::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{GenerateRequest, GenerateResponse};
use crate::providers::{CredentialFormat, ProbeReport};

fn key_status_label(format: CredentialFormat) -> &'static str {
    match format {
        CredentialFormat::Valid => "valid format",
        CredentialFormat::Invalid => "invalid format",
        CredentialFormat::Missing => "missing",
        CredentialFormat::NotRequired => "not required",
    }
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let credential = state.provider.credential_status();
    Json(json!({
        "status": "healthy",
        "message": "AI Art Generator API is running",
        "provider": state.provider.name(),
        "apiKeyStatus": key_status_label(credential.format),
    }))
}

/// Credential diagnostics plus a bounded, non-billable vendor probe.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let credential = state.provider.credential_status();

    let vendor = if !credential.is_usable() {
        ProbeReport::skipped("credential not usable, vendor not contacted")
    } else {
        match tokio::time::timeout(state.status_probe_timeout, state.provider.probe()).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                tracing::warn!(provider = state.provider.name(), "status probe failed: {}", err);
                ProbeReport::error(err.to_string())
            }
            Err(_) => {
                tracing::warn!(provider = state.provider.name(), "status probe timed out");
                ProbeReport::skipped(format!(
                    "vendor did not answer within {}s",
                    state.status_probe_timeout.as_secs_f32()
                ))
            }
        }
    };

    Json(json!({
        "status": "healthy",
        "provider": state.provider.name(),
        "api_key_configured": credential.is_configured(),
        "api_key_format": credential.format,
        "credential_issue": credential.issue,
        "vendor": vendor,
    }))
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<GenerateResponse>> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("generate", %request_id, provider = state.provider.name());
    run_generation(state, payload).instrument(span).await
}

async fn run_generation(
    state: Arc<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<GenerateResponse>> {
    // Configuration problems are reported before anything reaches the vendor.
    state.provider.credential_status().require()?;

    let Json(request) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    tracing::info!(
        style = ?request.style,
        seed = ?request.seed,
        timestamp = ?request.timestamp,
        random_factor = ?request.random_factor,
        "received generation request"
    );
    let params = request.into_params(&state.prompt_constructor)?;
    tracing::info!(prompt = %params.prompt, seed = ?params.seed, "generated prompt");

    let started = Instant::now();
    let image = state.provider.generate(&params).await?;
    let elapsed = started.elapsed();
    tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "image generated successfully");

    Ok(Json(GenerateResponse {
        image_url: image.image_url,
        prompt: params.prompt,
        generation_time: state
            .report_generation_time
            .then(|| format!("{:.1}s", elapsed.as_secs_f64())),
    }))
}
