use serde::{Deserialize, Serialize};

/// Metadata attached to a document. Keys map to scalar JSON values only
/// (string, number, boolean); the core never mutates it and forwards it
/// verbatim on retrieval.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// An indexed unit: a short product document with a caller-supplied,
/// stable, collection-unique id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata,
        }
    }
}

/// Which search path produced a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hybrid,
    Semantic,
}

/// Per-document score breakdown. All values are in [0, 1]; `keyword` is
/// absent when the response was served dense-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSet {
    pub combined: f32,
    pub semantic: f32,
    pub keyword: Option<f32>,
}

/// A single ranked retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub scores: ScoreSet,
}

/// Full response for one query: the echoed query, the mode that actually
/// served it, and results ordered by decreasing combined score (ties broken
/// by ascending id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub search_mode: SearchMode,
    pub results: Vec<ScoredDocument>,
}

impl RetrievalResponse {
    pub fn empty(query: impl Into<String>, search_mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            search_mode,
            results: Vec::new(),
        }
    }
}

/// Indexing statistics returned by a successful batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSummary {
    pub indexed: usize,
    pub total: usize,
    pub elapsed_secs: f64,
}

/// Diagnostic breakdown of both unmerged ranked lists for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainReport {
    pub query: String,
    pub semantic_results: Vec<(String, f32)>,
    pub keyword_results: Vec<(String, f32)>,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
}
