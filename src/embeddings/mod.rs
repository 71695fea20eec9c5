pub mod ollama;
pub mod openai;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must preserve element order in `embed_batch` and return
/// one vector per input, all of dimension `dimension()`. The same provider
/// configuration (model, version) must be used for indexing and querying.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn provider_name(&self) -> &str;
}

pub use ollama::OllamaEmbedding;
pub use openai::OpenAIEmbedding;

/// Character budget per input. Product documents are a few hundred
/// characters; the tail of an oversized one carries no ranking signal.
const MAX_INPUT_CHARS: usize = 8_000;

/// Input guard shared by the HTTP providers: empty strings embed as a
/// single space (the APIs reject empty input), oversized ones are cut at
/// the char budget.
fn clip_input(text: &str) -> &str {
    if text.is_empty() {
        return " ";
    }
    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

/// Builds the configured provider and probes it once so `dimension()` is
/// known before any index is created.
pub async fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingBackend::OpenAI => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| Error::Config("Missing OPENAI_API_KEY".to_string()))?;
            let mut openai =
                OpenAIEmbedding::new(api_key, Some(config.model.clone()), config.base_url.clone());
            openai.detect_dimension().await?;
            Ok(Arc::new(openai))
        }
        EmbeddingBackend::Ollama => {
            let mut ollama =
                OllamaEmbedding::new(config.base_url.clone(), Some(config.model.clone()));
            ollama.initialize().await?;
            Ok(Arc::new(ollama))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_empty_input_becomes_space() {
        assert_eq!(clip_input(""), " ");
    }

    #[test]
    fn test_clip_short_input_passes_through() {
        assert_eq!(clip_input("pricing tiers and cost structure"), "pricing tiers and cost structure");
    }

    #[test]
    fn test_clip_cuts_on_char_boundary() {
        let long = "é".repeat(MAX_INPUT_CHARS + 5);
        let clipped = clip_input(&long);
        assert_eq!(clipped.chars().count(), MAX_INPUT_CHARS);
    }
}
