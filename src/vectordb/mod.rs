//! Dense index module using USearch

pub mod usearch_db;

use crate::types::{Document, Metadata};
use crate::Result;
use async_trait::async_trait;

/// An `(id, vector, content, metadata)` tuple to be indexed.
#[derive(Debug, Clone)]
pub struct DenseRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

/// A nearest-neighbor match. Distance is cosine distance in [0, 2],
/// smaller is closer.
#[derive(Debug, Clone)]
pub struct DenseMatch {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Persistent store of document vectors answering cosine nearest-neighbor
/// queries. Results are ranked by ascending distance with a stable
/// tie-break.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Appends records. Duplicate ids, within the batch or against the
    /// index, are an error; a mid-batch backend failure rolls the batch
    /// back.
    async fn add(&mut self, records: Vec<DenseRecord>) -> Result<()>;

    /// Returns up to `n_results` matches for the query vector. An empty
    /// index yields an empty result.
    async fn query(&self, query_vector: &[f32], n_results: usize) -> Result<Vec<DenseMatch>>;

    /// Fetches stored documents by id. Unknown ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<Document>>;

    /// Exports the full corpus in insertion order.
    async fn all_documents(&self) -> Result<Vec<Document>>;

    /// Number of indexed items.
    async fn count(&self) -> Result<usize>;

    /// Persist to the backing store.
    async fn save(&self) -> Result<()>;

    /// Reload from the backing store, replacing in-memory state.
    async fn load(&mut self) -> Result<()>;
}

pub use usearch_db::UsearchIndex;
