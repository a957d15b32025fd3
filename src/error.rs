//! Common error types for the gateway.
//!
//! `AppError` is what handlers and providers return; it renders as the
//! uniform `{error, details}` JSON envelope. `ConfigError` is only produced
//! while reading the environment at startup.
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Maximum number of characters of a vendor body kept in logs and envelopes.
pub const MAX_DETAIL_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    MissingCredential(String),
    #[error("{0}")]
    InvalidCredential(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("vendor unreachable: {0}")]
    VendorUnavailable(String),
    #[error("vendor request timed out: {0}")]
    VendorTimeout(String),
    #[error("vendor returned HTTP {status}: {body}")]
    VendorRejected { status: u16, body: String },
    #[error("unexpected vendor response: {0}")]
    MalformedResponse(String),
    #[error("vendor reported failure: {0}")]
    GenerationFailed(String),
    #[error("generation still running after {attempts} polls ({}s)", .waited.as_secs())]
    GenerationTimeout { attempts: u32, waited: Duration },
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown IMAGE_PROVIDER '{0}'")]
    UnknownProvider(String),
    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("failed to read workflow template '{path}': {reason}")]
    Workflow { path: String, reason: String },
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    details: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::VendorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::VendorTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::VendorRejected { status, .. } => vendor_status(*status),
            AppError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::GenerationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable label placed in the `error` field of the envelope.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::MissingCredential(_) => "API Configuration Error",
            AppError::InvalidCredential(_) => "API Key Format Error",
            AppError::Configuration(_) => "Configuration Error",
            AppError::BadRequest(_) => "Invalid request",
            AppError::VendorUnavailable(_) => "Vendor unavailable",
            AppError::VendorTimeout(_) => "Vendor timeout",
            AppError::VendorRejected { .. } => "Vendor rejected request",
            AppError::MalformedResponse(_) => "Invalid vendor response",
            AppError::GenerationFailed(_) => "Generation failed",
            AppError::GenerationTimeout { .. } => "Generation timed out",
            AppError::Internal(_) => "Server error",
        }
    }
}

// 4xx and 503 pass through; any other vendor 5xx is our upstream failing.
fn vendor_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() => code,
        Ok(StatusCode::SERVICE_UNAVAILABLE) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Cut `text` to at most `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}… ({} bytes total)", &text[..idx], text.len()),
        None => text.to_string(),
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::VendorTimeout(err.to_string())
        } else if err.is_connect() {
            AppError::VendorUnavailable(format!("{} - check that the vendor is reachable", err))
        } else if err.is_decode() {
            AppError::MalformedResponse(err.to_string())
        } else {
            AppError::VendorUnavailable(err.to_string())
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = truncate(&self.to_string(), MAX_DETAIL_CHARS);
        tracing::error!(
            status = status.as_u16(),
            category = self.category(),
            details = %details,
            "request failed"
        );
        let body = ErrorBody { error: self.category(), details };
        (status, Json(body)).into_response()
    }
}
