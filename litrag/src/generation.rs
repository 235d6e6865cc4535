//! Text-generation collaborator trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling options passed to a [`TextGenerator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff, if the backend supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Sequences at which generation stops.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    /// Options tuned for short query rewrites.
    fn default() -> Self {
        Self { max_tokens: 512, temperature: 0.3, top_p: Some(0.9), stop: Vec::new() }
    }
}

impl GenerationOptions {
    /// Options for producing a full grounded answer.
    pub fn answering() -> Self {
        Self { max_tokens: 2048, temperature: 0.3, top_p: None, stop: Vec::new() }
    }
}

/// A model that completes a text prompt.
///
/// The retriever only needs plain prompt-in, text-out completion. When no
/// generator is configured, every feature that depends on one falls back
/// to its degenerate mode.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A short name for logs and error messages.
    fn name(&self) -> &str;

    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}
