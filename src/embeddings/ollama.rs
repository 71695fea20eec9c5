//! Ollama embedding provider, for fully local deployments

use super::{clip_input, EmbeddingProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbedPayload {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            model: model.unwrap_or_else(|| "nomic-embed-text".to_string()),
            dimension: 0,
        }
    }

    /// Probes the local server once to learn the model's output dimension.
    /// Must be called before the provider is handed to a retriever.
    pub async fn initialize(&mut self) -> Result<()> {
        let probe = self.request_embeddings(&["dimension probe"]).await?;
        self.dimension = probe.first().map(Vec::len).unwrap_or(0);
        if self.dimension == 0 {
            return Err(Error::Embedding(format!(
                "Model '{}' returned no embedding; is it pulled?",
                self.model
            )));
        }
        Ok(())
    }

    /// One `/api/embed` call. The endpoint accepts an array input and
    /// returns embeddings in the same order.
    async fn request_embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Embedding(format!("Ollama unreachable at {}: {e}", self.base_url))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama API error {status}: {detail}"
            )));
        }

        let payload: EmbedPayload = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Malformed Ollama response: {e}")))?;

        if payload.embeddings.len() != inputs.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                payload.embeddings.len()
            )));
        }

        Ok(payload.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request_embeddings(&[clip_input(text)]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<&str> = texts.iter().map(|t| clip_input(t)).collect();
        self.request_embeddings(&inputs).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }
}
