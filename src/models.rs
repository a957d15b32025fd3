//! Request-scoped records: the inbound job, the parameters handed to a
//! provider, and the outbound result.
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{AppError, AppResult};
use crate::prompt::{normalize_seed, PromptConstructor, NEGATIVE_PROMPT, VARIATION_COUNT};

pub const DEFAULT_SIZE: u32 = 512;
pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_GUIDANCE: f32 = 7.5;

const MIN_SIZE: u32 = 256;
const MAX_SIZE: u32 = 1024;
const MAX_STEPS: u32 = 50;

/// Body of `POST /api/generate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(alias = "prompt")]
    pub style: Option<String>,
    pub seed: Option<Value>,
    pub timestamp: Option<Number>,
    pub random_factor: Option<Number>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<String>,
}

/// Everything an adapter needs to issue one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<u32>,
}

impl GenerationParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        GenerationParams {
            prompt: prompt.into(),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE,
            seed: None,
        }
    }
}

/// What an adapter hands back: a hosted URL or a `data:` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub image_url: String,
}

impl GenerateRequest {
    /// Validate the job and turn it into provider parameters.
    pub fn into_params(self, constructor: &PromptConstructor) -> AppResult<GenerationParams> {
        let style = self
            .style
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("Style parameter is required".to_string()))?;

        let random_factor = self.random_factor.as_ref().map(factor_from_number).transpose()?;
        let seed_text = seed_to_text(self.seed.as_ref())?;

        let mut params = GenerationParams::new(constructor.construct_prompt(style, random_factor));
        params.seed = normalize_seed(seed_text.as_deref());
        if let Some(width) = self.width {
            params.width = check_dimension("width", width)?;
        }
        if let Some(height) = self.height {
            params.height = check_dimension("height", height)?;
        }
        if let Some(steps) = self.steps {
            if steps == 0 || steps > MAX_STEPS {
                return Err(AppError::BadRequest(format!(
                    "steps must be between 1 and {}, got {}",
                    MAX_STEPS, steps
                )));
            }
            params.steps = steps;
        }
        Ok(params)
    }
}

/// Only the factor modulo the variation count matters, so integers past
/// `i64` and large floats are reduced instead of rejected.
fn factor_from_number(n: &Number) -> AppResult<i64> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if let Some(u) = n.as_u64() {
        return Ok((u % VARIATION_COUNT as u64) as i64);
    }
    match n.as_f64() {
        Some(f) if f.is_finite() => Ok(f.floor().rem_euclid(VARIATION_COUNT as f64) as i64),
        _ => Err(AppError::BadRequest(format!("randomFactor out of range: {}", n))),
    }
}

fn seed_to_text(seed: Option<&Value>) -> AppResult<Option<String>> {
    match seed {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(AppError::BadRequest(format!(
            "seed must be a string or a number, got {}",
            other
        ))),
    }
}

fn check_dimension(name: &str, value: u32) -> AppResult<u32> {
    if !(MIN_SIZE..=MAX_SIZE).contains(&value) || value % 8 != 0 {
        return Err(AppError::BadRequest(format!(
            "{} must be a multiple of 8 between {} and {}, got {}",
            name, MIN_SIZE, MAX_SIZE, value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> GenerateRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn style_is_required() {
        let err = parse(json!({"seed": "x"})).into_params(&PromptConstructor::new()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let blank = parse(json!({"style": "  "})).into_params(&PromptConstructor::new());
        assert!(blank.is_err());
    }

    #[test]
    fn prompt_is_accepted_as_style_alias() {
        let params = parse(json!({"prompt": "baroque", "width": 512, "height": 768, "steps": 30}))
            .into_params(&PromptConstructor::new())
            .unwrap();
        assert!(params.prompt.contains("in the style of baroque"));
        assert_eq!((params.width, params.height, params.steps), (512, 768, 30));
    }

    #[test]
    fn numeric_seed_normalizes_like_its_text() {
        let constructor = PromptConstructor::new();
        let a = parse(json!({"style": "pop art", "seed": 1234})).into_params(&constructor).unwrap();
        let b = parse(json!({"style": "pop art", "seed": "1234"})).into_params(&constructor).unwrap();
        assert!(a.seed.is_some());
        assert_eq!(a.seed, b.seed);
        let none = parse(json!({"style": "pop art"})).into_params(&constructor).unwrap();
        assert_eq!(none.seed, None);
    }

    #[test]
    fn fractional_factor_is_floored() {
        let constructor = PromptConstructor::new();
        let a = parse(json!({"style": "fauvism", "randomFactor": 3.7})).into_params(&constructor).unwrap();
        let b = parse(json!({"style": "fauvism", "randomFactor": 3})).into_params(&constructor).unwrap();
        assert_eq!(a.prompt, b.prompt);
    }

    #[test]
    fn factors_beyond_i64_select_a_variation() {
        let constructor = PromptConstructor::new();
        let from_str = |body: &str| -> GenerateRequest { serde_json::from_str(body).unwrap() };
        let huge = from_str(r#"{"style":"cubism","randomFactor":9223372036854775808}"#)
            .into_params(&constructor)
            .unwrap();
        assert!(huge.prompt.contains("with subtle tones"));
        let float = from_str(r#"{"style":"cubism","randomFactor":1e20}"#).into_params(&constructor).unwrap();
        assert!(float.prompt.contains("with intricate details"));
    }

    #[test]
    fn rejects_out_of_range_dimensions() {
        let constructor = PromptConstructor::new();
        assert!(parse(json!({"style": "a", "width": 100})).into_params(&constructor).is_err());
        assert!(parse(json!({"style": "a", "height": 513})).into_params(&constructor).is_err());
        assert!(parse(json!({"style": "a", "steps": 0})).into_params(&constructor).is_err());
        assert!(parse(json!({"style": "a", "seed": [1]})).into_params(&constructor).is_err());
    }
}
