//! Workflow templates with simple `{{placeholder}}` substitution.
//!
//! A template is a ComfyUI API-format graph. Any string value of the form
//! `{{ key }}` is replaced by `inputs[key]`, so numeric inputs stay numeric.
use std::fs;

use serde_json::{json, Value};

use crate::error::{AppError, AppResult, ConfigError};

#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Value,
}

impl WorkflowTemplate {
    /// Plain SD 1.5 txt2img: checkpoint, two text encoders, KSampler, decode, save.
    pub fn builtin() -> Self {
        WorkflowTemplate {
            graph: json!({
                "3": {
                    "class_type": "KSampler",
                    "inputs": {
                        "seed": "{{seed}}",
                        "steps": "{{steps}}",
                        "cfg": "{{cfg}}",
                        "sampler_name": "euler",
                        "scheduler": "normal",
                        "denoise": 1,
                        "model": ["4", 0],
                        "positive": ["6", 0],
                        "negative": ["7", 0],
                        "latent_image": ["5", 0]
                    }
                },
                "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "{{checkpoint}}" } },
                "5": {
                    "class_type": "EmptyLatentImage",
                    "inputs": { "width": "{{width}}", "height": "{{height}}", "batch_size": 1 }
                },
                "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "{{positive}}", "clip": ["4", 1] } },
                "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "{{negative}}", "clip": ["4", 1] } },
                "8": { "class_type": "VAEDecode", "inputs": { "samples": ["3", 0], "vae": ["4", 2] } },
                "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "gateway", "images": ["8", 0] } }
            }),
        }
    }

    /// Load a template from disk. Files may hold the bare graph or one
    /// wrapped as `{"prompt": {...}}`.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let workflow_error = |reason: String| ConfigError::Workflow { path: path.to_string(), reason };
        let content = fs::read_to_string(path).map_err(|e| workflow_error(e.to_string()))?;
        let raw: Value = serde_json::from_str(&content).map_err(|e| workflow_error(e.to_string()))?;
        let graph = match raw.get("prompt") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => raw,
        };
        Self::from_graph(graph).map_err(|e| workflow_error(e.to_string()))
    }

    pub fn from_graph(graph: Value) -> AppResult<Self> {
        if !graph.is_object() {
            return Err(AppError::Configuration("workflow must be a JSON object of nodes".to_string()));
        }
        if !mentions_placeholder(&graph, "positive") {
            return Err(AppError::Configuration(
                "workflow never uses {{positive}}, the prompt would be ignored".to_string(),
            ));
        }
        Ok(WorkflowTemplate { graph })
    }

    /// Substitute every placeholder with the matching entry of `inputs`.
    pub fn render(&self, inputs: &Value) -> AppResult<Value> {
        let mut constructed = self.graph.clone();
        replace_placeholders(&mut constructed, inputs)?;
        Ok(constructed)
    }
}

fn placeholder_key(s: &str) -> Option<&str> {
    if s.starts_with("{{") && s.ends_with("}}") && s.len() >= 4 {
        Some(s.trim_start_matches("{{").trim_end_matches("}}").trim())
    } else {
        None
    }
}

fn mentions_placeholder(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| mentions_placeholder(v, key)),
        Value::Array(arr) => arr.iter().any(|v| mentions_placeholder(v, key)),
        Value::String(s) => placeholder_key(s) == Some(key),
        _ => false,
    }
}

/// Recursively replace `{{key}}` strings with `inputs[key]`.
fn replace_placeholders(value: &mut Value, inputs: &Value) -> AppResult<()> {
    match value {
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                replace_placeholders(v, inputs)?;
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                replace_placeholders(v, inputs)?;
            }
        }
        Value::String(s) => {
            if let Some(key) = placeholder_key(s) {
                match inputs.get(key) {
                    Some(replacement) => *value = replacement.clone(),
                    None => {
                        return Err(AppError::Configuration(format!(
                            "Missing input for workflow placeholder: {}",
                            key
                        )))
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}
