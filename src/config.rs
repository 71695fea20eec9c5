use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Storage paths
    pub storage: StorageConfig,

    /// Retrieval and fusion configuration
    pub retrieval: RetrieverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAI,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub vectors_dir: PathBuf,
}

/// Fusion and candidate policy for the hybrid retriever.
///
/// Weights are auto-normalized at construction: if they do not sum to 1.0
/// both are divided by their sum. Both weights zero is a configuration
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    pub use_hybrid: bool,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    pub default_top_k: usize,
    pub candidate_multiplier: usize,
    pub candidate_cap: usize,
    pub keyword_normalization_divisor: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            use_hybrid: true,
            semantic_weight: 0.6,
            keyword_weight: 0.4,
            default_top_k: 5,
            candidate_multiplier: 2,
            candidate_cap: 20,
            keyword_normalization_divisor: 10.0,
        }
    }
}

impl RetrieverConfig {
    /// Checks every parameter and returns a copy with the weights
    /// normalized so they sum to 1.0.
    pub fn validated(mut self) -> Result<Self> {
        for (name, weight) in [
            ("semantic_weight", self.semantic_weight),
            ("keyword_weight", self.keyword_weight),
        ] {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(Error::Config(format!(
                    "{name} must be in [0, 1], got {weight}"
                )));
            }
        }

        let total = self.semantic_weight + self.keyword_weight;
        if total <= 0.0 {
            return Err(Error::Config(
                "semantic_weight and keyword_weight must not both be zero".to_string(),
            ));
        }
        self.semantic_weight /= total;
        self.keyword_weight /= total;

        if self.default_top_k == 0 {
            return Err(Error::Config("default_top_k must be positive".to_string()));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::Config(
                "candidate_multiplier must be at least 1".to_string(),
            ));
        }
        if self.candidate_cap == 0 {
            return Err(Error::Config("candidate_cap must be positive".to_string()));
        }
        if !self.keyword_normalization_divisor.is_finite()
            || self.keyword_normalization_divisor <= 0.0
        {
            return Err(Error::Config(format!(
                "keyword_normalization_divisor must be positive, got {}",
                self.keyword_normalization_divisor
            )));
        }

        Ok(self)
    }

    /// Number of dense candidates to fetch before fusion.
    pub fn candidate_k(&self, top_k: usize) -> usize {
        (top_k.saturating_mul(self.candidate_multiplier)).min(self.candidate_cap)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig {
                provider: EmbeddingBackend::OpenAI,
                api_key: None,
                model: "text-embedding-3-small".to_string(),
                base_url: None,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                vectors_dir: PathBuf::from("./data/vectors"),
            },
            retrieval: RetrieverConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = match provider.to_lowercase().as_str() {
                "ollama" => EmbeddingBackend::Ollama,
                _ => EmbeddingBackend::OpenAI,
            };
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config.embedding.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(base_url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = Some(base_url);
        }

        if let Ok(data_dir) = std::env::var("DATA_DIR") {
            let data_path = PathBuf::from(data_dir);
            config.storage.data_dir = data_path.clone();
            config.storage.vectors_dir = data_path.join("vectors");
        }

        if let Ok(use_hybrid) = std::env::var("USE_HYBRID") {
            config.retrieval.use_hybrid = !matches!(
                use_hybrid.to_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        if let Ok(weight) = std::env::var("SEMANTIC_WEIGHT") {
            config.retrieval.semantic_weight = weight
                .parse()
                .map_err(|_| Error::Config(format!("Invalid SEMANTIC_WEIGHT: {weight}")))?;
        }

        if let Ok(weight) = std::env::var("KEYWORD_WEIGHT") {
            config.retrieval.keyword_weight = weight
                .parse()
                .map_err(|_| Error::Config(format!("Invalid KEYWORD_WEIGHT: {weight}")))?;
        }

        if let Ok(top_k) = std::env::var("TOP_K_RETRIEVAL") {
            config.retrieval.default_top_k = top_k
                .parse()
                .map_err(|_| Error::Config(format!("Invalid TOP_K_RETRIEVAL: {top_k}")))?;
        }

        Ok(config)
    }
}
