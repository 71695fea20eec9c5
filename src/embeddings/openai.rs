//! OpenAI embedding provider

use super::{clip_input, EmbeddingProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Inputs per API call; larger batches are split across requests.
const MAX_BATCH_SIZE: usize = 128;

pub struct OpenAIEmbedding {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingsPayload {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedding {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            dimension: 0,
        }
    }

    /// Probes the API once to learn the model's output dimension. Must be
    /// called before the provider is handed to a retriever.
    pub async fn detect_dimension(&mut self) -> Result<usize> {
        let probe = self.request_embeddings(&["dimension probe"]).await?;
        self.dimension = probe.first().map(Vec::len).unwrap_or(0);
        if self.dimension == 0 {
            return Err(Error::Embedding(format!(
                "Model '{}' returned no embedding",
                self.model
            )));
        }
        Ok(self.dimension)
    }

    /// One `/embeddings` call. Response rows carry an index; they are
    /// placed explicitly so the output order matches the input order even
    /// if the API reorders rows.
    async fn request_embeddings(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": inputs,
            "encoding_format": "float",
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Embedding(format!(
                    "OpenAI rejected the API credential ({status}): {detail}"
                )),
                StatusCode::TOO_MANY_REQUESTS => {
                    Error::Embedding(format!("OpenAI rate limit or quota hit: {detail}"))
                }
                _ => Error::Embedding(format!("OpenAI API error ({status}): {detail}")),
            });
        }

        let payload: EmbeddingsPayload = response.json().await?;

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; inputs.len()];
        for row in payload.data {
            match vectors.get_mut(row.index) {
                Some(slot) => *slot = Some(row.embedding),
                None => {
                    return Err(Error::Embedding(format!(
                        "Embedding index {} out of range for batch of {}",
                        row.index,
                        inputs.len()
                    )))
                }
            }
        }

        vectors
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::Embedding(format!("Missing embedding for input {i}")))
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request_embeddings(&[clip_input(text)]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            let inputs: Vec<&str> = chunk.iter().map(|t| clip_input(t)).collect();
            vectors.extend(self.request_embeddings(&inputs).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}
