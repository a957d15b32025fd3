//! Art generation gateway library
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router setup used by the binary.
//! - `providers`: The `ImageProvider` capability and one adapter per vendor.
//! - `comfyui`: Thin client and workflow templates for a local ComfyUI server.
//! - `prompt`: Prompt synthesis and seed normalization.
//! - `models`: Request/response records.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type, alias and JSON error envelope.
//!
//! Re-exports are provided for common types: `Config`, `AppState`,
//! `ImageProvider`, and `PromptConstructor`.
pub mod api;
pub mod comfyui;
pub mod config;
pub mod error;
pub mod models;
pub mod prompt;
pub mod providers;

pub use api::{router, AppState};
pub use config::{Config, ProviderKind};
pub use error::{AppError, AppResult};
pub use prompt::constructor::PromptConstructor;
pub use providers::ImageProvider;
