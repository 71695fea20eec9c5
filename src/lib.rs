pub mod embeddings;
pub mod retriever;
pub mod search;
pub mod vectordb;

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RetrieverConfig};
pub use error::{Error, Result};
pub use retriever::HybridRetriever;
pub use types::*;
