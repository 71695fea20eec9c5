pub mod bm25;
pub mod hybrid;

pub use bm25::Bm25Okapi;
pub use hybrid::ScoreFusion;

use crate::types::Document;
use crate::Result;
use std::collections::HashMap;

/// BM25 scoring over the whole corpus.
///
/// The index is process-local and rebuilt from scratch whenever the corpus
/// changes: BM25 depends on global statistics (document lengths, average
/// length, inverse document frequency), so there is no incremental path.
pub trait SparseIndex: Send + Sync {
    /// Replaces the current index with one built from `documents`.
    fn build(&mut self, documents: &[Document]) -> Result<()>;

    /// Raw BM25 score for every indexed document. Documents with no
    /// query-token overlap score 0.0.
    fn score(&self, query: &str) -> Result<HashMap<String, f32>>;

    /// Number of indexed documents.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all indexed documents, in build order.
    fn ids(&self) -> Vec<String>;
}
