//! Hybrid retriever: coordinates indexing, runs both searches, normalizes,
//! fuses, ranks.

use crate::config::{Config, RetrieverConfig};
use crate::embeddings::{provider_from_config, EmbeddingProvider};
use crate::search::hybrid::{keyword_score_from_raw, semantic_score_from_distance, FusedHit};
use crate::search::{Bm25Okapi, ScoreFusion, SparseIndex};
use crate::types::{
    Document, ExplainReport, IndexSummary, Metadata, RetrievalResponse, ScoreSet, ScoredDocument,
    SearchMode,
};
use crate::vectordb::{DenseIndex, DenseMatch, DenseRecord, UsearchIndex};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Orchestrates the dense index, the keyword index, and the embedding
/// provider behind one retrieval API.
///
/// The retriever is single-writer, multi-reader: `index_documents` takes
/// the write side of each index lock, queries take the read side, so no
/// reader ever observes a half-rebuilt keyword index. Configuration is
/// immutable after construction.
pub struct HybridRetriever {
    config: RetrieverConfig,
    embedding: Arc<dyn EmbeddingProvider>,
    dense: RwLock<Box<dyn DenseIndex>>,
    sparse: RwLock<Box<dyn SparseIndex>>,
    fusion: ScoreFusion,
    degraded: AtomicBool,
    degraded_warned: AtomicBool,
}

impl HybridRetriever {
    /// Validates the configuration (normalizing the fusion weights) and
    /// wires the three dependencies together.
    pub fn new(
        config: RetrieverConfig,
        embedding: Arc<dyn EmbeddingProvider>,
        dense: Box<dyn DenseIndex>,
        sparse: Box<dyn SparseIndex>,
    ) -> Result<Self> {
        let config = config.validated()?;
        let fusion = ScoreFusion::new(config.semantic_weight, config.keyword_weight);

        Ok(Self {
            config,
            embedding,
            dense: RwLock::new(dense),
            sparse: RwLock::new(sparse),
            fusion,
            degraded: AtomicBool::new(false),
            degraded_warned: AtomicBool::new(false),
        })
    }

    /// Builds a retriever for a named collection from ambient
    /// configuration: constructs and probes the configured embedding
    /// provider, then opens (or creates) the collection's dense index
    /// under the configured storage directory.
    pub async fn from_config(config: Config, collection: &str) -> Result<Self> {
        let embedding = provider_from_config(&config.embedding).await?;
        let dense = UsearchIndex::for_collection(
            collection,
            embedding.dimension(),
            &config.storage.vectors_dir,
        )?;

        Self::new(
            config.retrieval,
            embedding,
            Box::new(dense),
            Box::new(Bm25Okapi::new()),
        )
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// True while the keyword index is out of sync with the dense index;
    /// hybrid queries fall back to dense-only until a successful re-index.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub async fn count(&self) -> Result<usize> {
        self.dense.read().await.count().await
    }

    /// Indexes a batch of documents: validate, embed, add to the dense
    /// index, persist, then rebuild the keyword index over the full corpus.
    ///
    /// Validation or embedding failure leaves both indices untouched. A
    /// keyword rebuild failure after a successful dense add marks the
    /// collection degraded and surfaces the error; re-indexing recovers.
    pub async fn index_documents(&self, documents: &[Document]) -> Result<IndexSummary> {
        let started = Instant::now();

        self.validate_batch(documents).await?;

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedding.embed_batch(&contents).await?;
        if embeddings.len() != documents.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let records: Vec<DenseRecord> = documents
            .iter()
            .zip(embeddings)
            .map(|(doc, vector)| DenseRecord {
                id: doc.id.clone(),
                vector,
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();

        let (total, corpus) = {
            let mut dense = self.dense.write().await;
            dense.add(records).await?;
            if let Err(e) = dense.save().await {
                // The batch is live in memory but not on disk, and the
                // keyword index no longer covers the full corpus.
                self.degraded.store(true, Ordering::Relaxed);
                return Err(e);
            }
            (dense.count().await?, dense.all_documents().await?)
        };

        {
            let mut sparse = self.sparse.write().await;
            if let Err(e) = sparse.build(&corpus) {
                self.degraded.store(true, Ordering::Relaxed);
                warn!(
                    "[INDEX] Keyword index rebuild failed, collection degraded: {}",
                    e
                );
                return Err(Error::Sparse(format!("Keyword index rebuild failed: {e}")));
            }
        }

        self.degraded.store(false, Ordering::Relaxed);
        self.degraded_warned.store(false, Ordering::Relaxed);

        let summary = IndexSummary {
            indexed: documents.len(),
            total,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };

        info!(
            "[INDEX] Indexed {} documents ({} total) in {:.2}s",
            summary.indexed, summary.total, summary.elapsed_secs
        );

        Ok(summary)
    }

    /// Retrieves the `top_k` most relevant documents for a query.
    ///
    /// In hybrid mode both signals are fetched, normalized to [0, 1], and
    /// fused under the configured weights; if the keyword index fails for
    /// this query the call degrades to dense-only instead of failing, and
    /// the response is marked `search_mode = "semantic"`.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResponse> {
        if query.trim().is_empty() {
            return Err(Error::Validation("Query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Err(Error::Validation("top_k must be positive".to_string()));
        }

        let hybrid_enabled = self.config.use_hybrid && !self.is_degraded();
        if self.config.use_hybrid && self.is_degraded() {
            self.warn_degraded_once();
        }

        let dense = self.dense.read().await;

        if dense.count().await? == 0 {
            let mode = if hybrid_enabled {
                SearchMode::Hybrid
            } else {
                SearchMode::Semantic
            };
            return Ok(RetrievalResponse::empty(query, mode));
        }

        let query_vector = self
            .embedding
            .embed(query)
            .await
            .map_err(Error::into_retrieval)?;

        let candidate_k = self.config.candidate_k(top_k);
        let matches = dense
            .query(&query_vector, candidate_k)
            .await
            .map_err(Error::into_retrieval)?;

        if !hybrid_enabled {
            return Ok(self.semantic_response(query, matches, top_k));
        }

        let raw_keyword = {
            let sparse = self.sparse.read().await;
            sparse.score(query)
        };

        let raw_keyword = match raw_keyword {
            Ok(scores) => scores,
            Err(e) => {
                warn!(
                    "[SEARCH] Keyword scoring failed for query, falling back to dense-only: {}",
                    e
                );
                return Ok(self.semantic_response(query, matches, top_k));
            }
        };

        let semantic: Vec<(String, f32)> = matches
            .iter()
            .map(|m| (m.id.clone(), semantic_score_from_distance(m.distance)))
            .collect();

        let keyword: HashMap<String, f32> = raw_keyword
            .into_iter()
            .map(|(id, raw)| {
                (
                    id,
                    keyword_score_from_raw(raw, self.config.keyword_normalization_divisor),
                )
            })
            .collect();

        let mut fused = self.fusion.fuse(&semantic, &keyword);
        fused.truncate(top_k);

        let results = self
            .hydrate(&**dense, fused, &matches)
            .await
            .map_err(Error::into_retrieval)?;

        Ok(RetrievalResponse {
            query: query.to_string(),
            search_mode: SearchMode::Hybrid,
            results,
        })
    }

    /// `retrieve` with the configured default `top_k`.
    pub async fn retrieve_default(&self, query: &str) -> Result<RetrievalResponse> {
        self.retrieve(query, self.config.default_top_k).await
    }

    /// Diagnostic breakdown: both unmerged ranked lists plus the configured
    /// weights. Read-only; a keyword failure yields an empty keyword list
    /// instead of an error.
    pub async fn explain(&self, query: &str) -> Result<ExplainReport> {
        if query.trim().is_empty() {
            return Err(Error::Validation("Query must not be empty".to_string()));
        }

        let candidate_k = self.config.candidate_k(self.config.default_top_k);

        let semantic_results = {
            let dense = self.dense.read().await;
            if dense.count().await? == 0 {
                Vec::new()
            } else {
                let query_vector = self.embedding.embed(query).await?;
                dense
                    .query(&query_vector, candidate_k)
                    .await?
                    .into_iter()
                    .map(|m| (m.id, semantic_score_from_distance(m.distance)))
                    .collect()
            }
        };

        let keyword_results = {
            let sparse = self.sparse.read().await;
            match sparse.score(query) {
                Ok(raw) => {
                    let mut ranked: Vec<(String, f32)> = raw
                        .into_iter()
                        .map(|(id, s)| {
                            (
                                id,
                                keyword_score_from_raw(
                                    s,
                                    self.config.keyword_normalization_divisor,
                                ),
                            )
                        })
                        .collect();
                    ranked.sort_by(|a, b| {
                        b.1.partial_cmp(&a.1)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.0.cmp(&b.0))
                    });
                    ranked.truncate(candidate_k);
                    ranked
                }
                Err(e) => {
                    warn!("[EXPLAIN] Keyword scoring failed: {}", e);
                    Vec::new()
                }
            }
        };

        Ok(ExplainReport {
            query: query.to_string(),
            semantic_results,
            keyword_results,
            semantic_weight: self.config.semantic_weight,
            keyword_weight: self.config.keyword_weight,
        })
    }

    /// Rebuilds the keyword index from the documents persisted in the dense
    /// index's backing store. This is the recovery path after a process
    /// restart (and clears the degraded flag on success).
    pub async fn rebuild_from_store(&self) -> Result<usize> {
        let corpus = {
            let dense = self.dense.read().await;
            dense.all_documents().await?
        };

        {
            let mut sparse = self.sparse.write().await;
            if let Err(e) = sparse.build(&corpus) {
                self.degraded.store(true, Ordering::Relaxed);
                return Err(Error::Sparse(format!("Keyword index rebuild failed: {e}")));
            }
        }

        self.degraded.store(false, Ordering::Relaxed);
        self.degraded_warned.store(false, Ordering::Relaxed);

        info!(
            "[INDEX] Rebuilt keyword index from store ({} documents)",
            corpus.len()
        );

        Ok(corpus.len())
    }

    fn warn_degraded_once(&self) {
        if !self.degraded_warned.swap(true, Ordering::Relaxed) {
            warn!(
                "[SEARCH] Keyword index is degraded; serving dense-only results until re-index"
            );
        }
    }

    async fn validate_batch(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Err(Error::Validation(
                "Document batch must not be empty".to_string(),
            ));
        }

        let mut batch_ids: HashSet<&str> = HashSet::with_capacity(documents.len());
        for doc in documents {
            if doc.id.is_empty() {
                return Err(Error::Validation("Document id must not be empty".to_string()));
            }
            if doc.content.is_empty() {
                return Err(Error::Validation(format!(
                    "Document '{}' has empty content",
                    doc.id
                )));
            }
            if !batch_ids.insert(doc.id.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate id in batch: {}",
                    doc.id
                )));
            }
            validate_metadata(&doc.id, &doc.metadata)?;
        }

        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let existing = {
            let dense = self.dense.read().await;
            dense.get(&ids).await?
        };
        if let Some(doc) = existing.first() {
            return Err(Error::Validation(format!(
                "Id already indexed: {}",
                doc.id
            )));
        }

        Ok(())
    }

    fn semantic_response(
        &self,
        query: &str,
        matches: Vec<DenseMatch>,
        top_k: usize,
    ) -> RetrievalResponse {
        let mut results: Vec<ScoredDocument> = matches
            .into_iter()
            .map(|m| {
                let semantic = semantic_score_from_distance(m.distance);
                ScoredDocument {
                    id: m.id,
                    content: m.content,
                    metadata: m.metadata,
                    scores: ScoreSet {
                        combined: semantic,
                        semantic,
                        keyword: None,
                    },
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.scores
                .combined
                .partial_cmp(&a.scores.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(top_k);

        RetrievalResponse {
            query: query.to_string(),
            search_mode: SearchMode::Semantic,
            results,
        }
    }

    /// Attaches content and metadata to fused hits. Dense matches already
    /// carry both; keyword-only hits are fetched from the dense store,
    /// which holds every indexed document by the consistency invariant.
    async fn hydrate(
        &self,
        dense: &dyn DenseIndex,
        fused: Vec<FusedHit>,
        matches: &[DenseMatch],
    ) -> Result<Vec<ScoredDocument>> {
        let from_dense: HashMap<&str, &DenseMatch> =
            matches.iter().map(|m| (m.id.as_str(), m)).collect();

        let missing: Vec<String> = fused
            .iter()
            .filter(|hit| !from_dense.contains_key(hit.id.as_str()))
            .map(|hit| hit.id.clone())
            .collect();

        let mut fetched: HashMap<String, (String, Metadata)> = HashMap::new();
        if !missing.is_empty() {
            for doc in dense.get(&missing).await? {
                fetched.insert(doc.id, (doc.content, doc.metadata));
            }
        }

        let mut results = Vec::with_capacity(fused.len());
        for hit in fused {
            let (content, metadata) = if let Some(m) = from_dense.get(hit.id.as_str()) {
                (m.content.clone(), m.metadata.clone())
            } else if let Some((content, metadata)) = fetched.remove(&hit.id) {
                (content, metadata)
            } else {
                // Keyword index knows an id the dense store does not;
                // should be unreachable while the consistency invariant
                // holds.
                warn!("[SEARCH] Dropping result '{}' with no stored document", hit.id);
                continue;
            };

            results.push(ScoredDocument {
                id: hit.id,
                content,
                metadata,
                scores: ScoreSet {
                    combined: hit.combined,
                    semantic: hit.semantic,
                    keyword: Some(hit.keyword),
                },
            });
        }

        Ok(results)
    }
}

fn validate_metadata(id: &str, metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if value.is_object() || value.is_array() || value.is_null() {
            return Err(Error::Validation(format!(
                "Metadata key '{key}' on document '{id}' must be a scalar value"
            )));
        }
    }
    Ok(())
}
