pub mod constructor;
pub mod seed;

pub use constructor::{PromptConstructor, NEGATIVE_PROMPT, VARIATION_COUNT};
pub use seed::normalize_seed;
