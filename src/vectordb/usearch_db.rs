use super::{DenseIndex, DenseMatch, DenseRecord};
use crate::types::{Document, Metadata};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use usearch::Index;
use usearch::IndexOptions;
use usearch::MetricKind;
use usearch::ScalarKind;

/// Content and metadata stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    content: String,
    metadata: Metadata,
}

/// Everything except the vectors themselves, persisted next to the index
/// file so a restart recovers the full collection.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    id_map: HashMap<String, u64>,
    next_id: u64,
    order: Vec<String>,
    documents: HashMap<String, StoredDocument>,
}

pub struct UsearchIndex {
    index: Index,
    path: PathBuf,
    dimension: usize,
    id_map: HashMap<String, u64>,
    reverse_id_map: HashMap<u64, String>,
    documents: HashMap<String, StoredDocument>,
    order: Vec<String>,
    next_id: u64,
}

fn build_index(dimension: usize) -> Result<Index> {
    Index::new(&IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        connectivity: 16,
        expansion_add: 128,
        expansion_search: 64,
        multi: false,
    })
    .map_err(|e| Error::VectorDb(format!("Failed to create index: {e:?}")))
}

impl UsearchIndex {
    pub fn new(path: PathBuf, dimension: usize) -> Result<Self> {
        let index = build_index(dimension)?;

        Ok(Self {
            index,
            path,
            dimension,
            id_map: HashMap::new(),
            reverse_id_map: HashMap::new(),
            documents: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
        })
    }

    pub fn from_file(path: PathBuf, dimension: usize) -> Result<Self> {
        let index = build_index(dimension)?;

        if path.exists() {
            index
                .load(&path.to_string_lossy())
                .map_err(|e| Error::VectorDb(format!("Failed to load index: {e:?}")))?;
        }

        let dimension = index.dimensions();

        let mut db = Self {
            index,
            path,
            dimension,
            id_map: HashMap::new(),
            reverse_id_map: HashMap::new(),
            documents: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
        };

        db.load_sidecar()?;

        Ok(db)
    }

    /// Opens (or creates) the index for a named collection under
    /// `vectors_dir`. Collections get their own hashed subdirectory so
    /// callers can run one retriever per product.
    pub fn for_collection(collection: &str, dimension: usize, vectors_dir: &Path) -> Result<Self> {
        let index_path = Self::index_path_for_collection(collection, vectors_dir);

        if index_path.exists() {
            Self::from_file(index_path, dimension)
        } else {
            Self::new(index_path, dimension)
        }
    }

    fn index_path_for_collection(collection: &str, vectors_dir: &Path) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        vectors_dir.join(&hash[..16]).join("index.usearch")
    }

    fn sidecar_path(&self) -> PathBuf {
        self.path.with_extension("sidecar.json")
    }

    fn load_sidecar(&mut self) -> Result<()> {
        let sidecar_path = self.sidecar_path();
        if !sidecar_path.exists() {
            return Ok(());
        }

        let raw = std::fs::read_to_string(sidecar_path)?;
        let sidecar: Sidecar = serde_json::from_str(&raw)?;

        self.id_map = sidecar.id_map;
        self.reverse_id_map = self
            .id_map
            .iter()
            .map(|(string_id, &internal)| (internal, string_id.clone()))
            .collect();
        self.documents = sidecar.documents;
        self.order = sidecar.order;
        self.next_id = sidecar.next_id;

        Ok(())
    }

    /// Removes a half-inserted batch so a failed `add` leaves the index as
    /// it was before the call.
    fn rollback(&mut self, inserted: &[String]) {
        for id in inserted {
            if let Some(&internal_id) = self.id_map.get(id) {
                let _ = self.index.remove(internal_id);
                self.id_map.remove(id);
                self.reverse_id_map.remove(&internal_id);
            }
        }
    }
}

#[async_trait]
impl DenseIndex for UsearchIndex {
    async fn add(&mut self, records: Vec<DenseRecord>) -> Result<()> {
        let mut batch_ids = HashSet::new();
        for record in &records {
            if record.vector.len() != self.dimension {
                return Err(Error::VectorDb(format!(
                    "Vector dimension mismatch: expected {}, got {}",
                    self.dimension,
                    record.vector.len()
                )));
            }
            if !batch_ids.insert(record.id.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate id in batch: {}",
                    record.id
                )));
            }
            if self.id_map.contains_key(&record.id) {
                return Err(Error::Validation(format!(
                    "Id already indexed: {}",
                    record.id
                )));
            }
        }

        let needed_capacity = self.index.size() + records.len();
        self.index
            .reserve(needed_capacity)
            .map_err(|e| Error::VectorDb(format!("Failed to reserve capacity: {e:?}")))?;

        let mut inserted: Vec<String> = Vec::with_capacity(records.len());

        for record in &records {
            let internal_id = self.next_id;

            if let Err(e) = self.index.add(internal_id, &record.vector) {
                self.rollback(&inserted);
                return Err(Error::VectorDb(format!("Failed to add vector: {e:?}")));
            }

            self.id_map.insert(record.id.clone(), internal_id);
            self.reverse_id_map.insert(internal_id, record.id.clone());
            self.next_id += 1;
            inserted.push(record.id.clone());
        }

        for record in records {
            self.order.push(record.id.clone());
            self.documents.insert(
                record.id,
                StoredDocument {
                    content: record.content,
                    metadata: record.metadata,
                },
            );
        }

        Ok(())
    }

    async fn query(&self, query_vector: &[f32], n_results: usize) -> Result<Vec<DenseMatch>> {
        if self.index.size() == 0 || n_results == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimension {
            return Err(Error::VectorDb(format!(
                "Query vector dimension mismatch: expected {}, got {}",
                self.dimension,
                query_vector.len()
            )));
        }

        let results = self
            .index
            .search(query_vector, n_results.min(self.index.size()))
            .map_err(|e| Error::VectorDb(format!("Search failed: {e:?}")))?;

        let mut matches = Vec::new();

        for (internal_id, distance) in results.keys.iter().zip(results.distances.iter()) {
            let Some(string_id) = self.reverse_id_map.get(internal_id) else {
                continue;
            };
            let Some(stored) = self.documents.get(string_id) else {
                continue;
            };

            matches.push(DenseMatch {
                id: string_id.clone(),
                content: stored.content.clone(),
                metadata: stored.metadata.clone(),
                distance: *distance,
            });
        }

        Ok(matches)
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<Document>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.documents.get(id).map(|stored| Document {
                    id: id.clone(),
                    content: stored.content.clone(),
                    metadata: stored.metadata.clone(),
                })
            })
            .collect())
    }

    async fn all_documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| {
                self.documents.get(id).map(|stored| Document {
                    id: id.clone(),
                    content: stored.content.clone(),
                    metadata: stored.metadata.clone(),
                })
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.index.size())
    }

    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.index
            .save(&self.path.to_string_lossy())
            .map_err(|e| Error::VectorDb(format!("Failed to save index: {e:?}")))?;

        let sidecar = Sidecar {
            id_map: self.id_map.clone(),
            next_id: self.next_id,
            order: self.order.clone(),
            documents: self.documents.clone(),
        };

        std::fs::write(self.sidecar_path(), serde_json::to_string_pretty(&sidecar)?)?;

        Ok(())
    }

    async fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Err(Error::VectorDb("Index file does not exist".to_string()));
        }

        self.index
            .load(&self.path.to_string_lossy())
            .map_err(|e| Error::VectorDb(format!("Failed to load index: {e:?}")))?;

        self.dimension = self.index.dimensions();
        self.id_map.clear();
        self.reverse_id_map.clear();
        self.documents.clear();
        self.order.clear();
        self.next_id = 0;

        self.load_sidecar()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, vector: Vec<f32>, content: &str) -> DenseRecord {
        DenseRecord {
            id: id.to_string(),
            vector,
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.usearch");

        let mut db = UsearchIndex::new(path, 128).unwrap();

        let records = vec![
            record("doc1", vec![1.0; 128], "pricing tiers and cost structure"),
            record(
                "doc2",
                {
                    let mut v = vec![0.0; 128];
                    v[0] = 1.0;
                    v
                },
                "deployment on Linux",
            ),
        ];

        db.add(records).await.unwrap();

        let query = vec![1.0; 128];
        let matches = db.query(&query, 2).await.unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "doc1");
        assert_eq!(matches[0].content, "pricing tiers and cost structure");
        assert!(matches[0].distance < matches[1].distance);
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_matches() {
        let dir = tempdir().unwrap();
        let db = UsearchIndex::new(dir.path().join("empty.usearch"), 8).unwrap();

        let matches = db.query(&[1.0; 8], 5).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_in_batch_rejected() {
        let dir = tempdir().unwrap();
        let mut db = UsearchIndex::new(dir.path().join("dup.usearch"), 8).unwrap();

        let records = vec![
            record("a", vec![1.0; 8], "first"),
            record("a", vec![0.5; 8], "second"),
        ];

        let result = db.add(records).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_across_batches_rejected() {
        let dir = tempdir().unwrap();
        let mut db = UsearchIndex::new(dir.path().join("dup2.usearch"), 8).unwrap();

        db.add(vec![record("a", vec![1.0; 8], "first")])
            .await
            .unwrap();

        let result = db.add(vec![record("a", vec![0.5; 8], "again")]).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_insertion() {
        let dir = tempdir().unwrap();
        let mut db = UsearchIndex::new(dir.path().join("dim.usearch"), 8).unwrap();

        let records = vec![
            record("ok", vec![1.0; 8], "fits"),
            record("bad", vec![1.0; 4], "wrong dimension"),
        ];

        let result = db.add(records).await;
        assert!(matches!(result, Err(Error::VectorDb(_))));
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_and_load_recovers_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persistent.usearch");

        let mut metadata = Metadata::new();
        metadata.insert("category".to_string(), "pricing".into());

        {
            let mut db = UsearchIndex::new(path.clone(), 64).unwrap();
            db.add(vec![DenseRecord {
                id: "persistent_doc".to_string(),
                vector: vec![1.0; 64],
                content: "annual subscription pricing".to_string(),
                metadata: metadata.clone(),
            }])
            .await
            .unwrap();
            db.save().await.unwrap();
        }

        {
            let mut db = UsearchIndex::from_file(path, 64).unwrap();
            db.load().await.unwrap();

            assert_eq!(db.count().await.unwrap(), 1);

            let docs = db.all_documents().await.unwrap();
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].id, "persistent_doc");
            assert_eq!(docs[0].content, "annual subscription pricing");
            assert_eq!(docs[0].metadata, metadata);

            let matches = db.query(&vec![1.0; 64], 1).await.unwrap();
            assert_eq!(matches[0].id, "persistent_doc");
        }
    }

    #[tokio::test]
    async fn test_all_documents_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let mut db = UsearchIndex::new(dir.path().join("order.usearch"), 8).unwrap();

        db.add(vec![
            record("z", vec![1.0; 8], "last alphabetically"),
            record("a", vec![0.5; 8], "first alphabetically"),
        ])
        .await
        .unwrap();

        let docs = db.all_documents().await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[tokio::test]
    async fn test_get_skips_unknown_ids() {
        let dir = tempdir().unwrap();
        let mut db = UsearchIndex::new(dir.path().join("get.usearch"), 8).unwrap();

        db.add(vec![record("known", vec![1.0; 8], "present")])
            .await
            .unwrap();

        let docs = db
            .get(&["known".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "known");
    }
}
