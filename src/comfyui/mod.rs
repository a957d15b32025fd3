pub mod client;
pub mod workflow;

pub use client::{ComfyUIClient, ImageRef};
pub use workflow::WorkflowTemplate;
