use std::collections::HashMap;

/// Converts a cosine distance in [0, 2] to a semantic score in [0, 1].
/// The clamp defends against backends drifting slightly outside the range.
pub fn semantic_score_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Converts a raw BM25 score to a keyword score in [0, 1] by dividing by a
/// fixed divisor and saturating at 1.0. Stateless and monotone.
pub fn keyword_score_from_raw(raw: f32, divisor: f32) -> f32 {
    (raw / divisor).min(1.0)
}

/// A fused candidate before hydration with content and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: String,
    pub combined: f32,
    pub semantic: f32,
    pub keyword: f32,
}

/// Weighted-sum fusion of the two normalized score streams.
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    semantic_weight: f32,
    keyword_weight: f32,
}

impl ScoreFusion {
    /// Weights are expected to already be normalized to sum 1.0.
    pub fn new(semantic_weight: f32, keyword_weight: f32) -> Self {
        Self {
            semantic_weight,
            keyword_weight,
        }
    }

    /// Fuses over the union of both candidate sets. A document missing from
    /// one stream contributes zero for that component. Output is sorted by
    /// combined score descending, ties broken by ascending id, so rankings
    /// are deterministic.
    pub fn fuse(
        &self,
        semantic: &[(String, f32)],
        keyword: &HashMap<String, f32>,
    ) -> Vec<FusedHit> {
        let mut hits: HashMap<String, FusedHit> = HashMap::with_capacity(semantic.len());

        for (id, score) in semantic {
            hits.insert(
                id.clone(),
                FusedHit {
                    id: id.clone(),
                    combined: 0.0,
                    semantic: *score,
                    keyword: 0.0,
                },
            );
        }

        for (id, score) in keyword {
            hits.entry(id.clone())
                .and_modify(|hit| hit.keyword = *score)
                .or_insert_with(|| FusedHit {
                    id: id.clone(),
                    combined: 0.0,
                    semantic: 0.0,
                    keyword: *score,
                });
        }

        let mut fused: Vec<FusedHit> = hits
            .into_values()
            .map(|mut hit| {
                hit.combined =
                    self.semantic_weight * hit.semantic + self.keyword_weight * hit.keyword;
                hit
            })
            .collect();

        fused.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        fused
    }
}
