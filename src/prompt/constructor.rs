//! Prompt synthesis from a painting style.
//!
//! The output is a pure function of `(style, random_factor)`: the caller owns
//! all variation, nothing random is drawn here.

/// Number of prompt variations a random factor selects from.
pub const VARIATION_COUNT: usize = 6;

const VARIATIONS: [&str; VARIATION_COUNT] = [
    "with dramatic lighting",
    "with vibrant colors",
    "with subtle tones",
    "with bold composition",
    "with intricate details",
    "with atmospheric effects",
];

const SUFFIX: &str = "no frame, no border, no background, pure artwork";

/// Sent to every vendor that accepts a negative prompt.
pub const NEGATIVE_PROMPT: &str =
    "blurry, low quality, distorted, ugly, bad anatomy, frame, border, background, text, watermark";

#[derive(Debug, Default, Clone, Copy)]
pub struct PromptConstructor;

impl PromptConstructor {
    pub fn new() -> Self {
        PromptConstructor
    }

    /// Index into the variation list. Negative factors wrap around.
    pub fn variation_index(random_factor: i64) -> usize {
        random_factor.rem_euclid(VARIATION_COUNT as i64) as usize
    }

    pub fn variation(random_factor: i64) -> &'static str {
        VARIATIONS[Self::variation_index(random_factor)]
    }

    /// Build the prompt sent to the vendor. A missing factor selects the
    /// first variation.
    pub fn construct_prompt(&self, style: &str, random_factor: Option<i64>) -> String {
        let variation = Self::variation(random_factor.unwrap_or(0));
        format!(
            "A masterpiece painting in the style of {}, highly detailed, artistic, professional quality, {}, {}",
            style.trim(),
            variation,
            SUFFIX
        )
    }
}
