//! In-memory BM25 Okapi keyword index

use super::SparseIndex;
use crate::types::Document;
use crate::Result;
use std::collections::HashMap;

const DEFAULT_K1: f32 = 1.5;
const DEFAULT_B: f32 = 0.75;
const DEFAULT_EPSILON: f32 = 0.25;

/// Lowercases and splits on Unicode whitespace. No stemming, no stopword
/// removal, no punctuation stripping; queries and documents go through the
/// same rule.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Okapi BM25 over the full corpus.
///
/// Negative IDF values (terms present in more than half the corpus) are
/// floored at `epsilon` times the mean IDF, matching the reference Okapi
/// variant.
pub struct Bm25Okapi {
    ids: Vec<String>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<f32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
    k1: f32,
    b: f32,
    epsilon: f32,
}

impl Default for Bm25Okapi {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Okapi {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B, DEFAULT_EPSILON)
    }

    pub fn with_params(k1: f32, b: f32, epsilon: f32) -> Self {
        Self {
            ids: Vec::new(),
            term_freqs: Vec::new(),
            doc_lens: Vec::new(),
            avgdl: 0.0,
            idf: HashMap::new(),
            k1,
            b,
            epsilon,
        }
    }

    fn compute_idf(&mut self, doc_count: usize) {
        // Document frequency per term
        let mut df: HashMap<&str, usize> = HashMap::new();
        for freqs in &self.term_freqs {
            for term in freqs.keys() {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = doc_count as f32;
        let mut idf: HashMap<String, f32> = HashMap::with_capacity(df.len());
        let mut idf_sum = 0.0;
        let mut negative: Vec<String> = Vec::new();

        for (term, freq) in df {
            let value = ((n - freq as f32 + 0.5) / (freq as f32 + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.to_string());
            }
            idf.insert(term.to_string(), value);
        }

        if !idf.is_empty() {
            let floor = self.epsilon * (idf_sum / idf.len() as f32);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        self.idf = idf;
    }
}

impl SparseIndex for Bm25Okapi {
    fn build(&mut self, documents: &[Document]) -> Result<()> {
        self.ids = documents.iter().map(|d| d.id.clone()).collect();
        self.term_freqs = Vec::with_capacity(documents.len());
        self.doc_lens = Vec::with_capacity(documents.len());

        let mut total_len = 0usize;

        for doc in documents {
            let tokens = tokenize(&doc.content);
            total_len += tokens.len();
            self.doc_lens.push(tokens.len() as f32);

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            self.term_freqs.push(freqs);
        }

        self.avgdl = if documents.is_empty() {
            0.0
        } else {
            total_len as f32 / documents.len() as f32
        };

        self.compute_idf(documents.len());

        Ok(())
    }

    fn score(&self, query: &str) -> Result<HashMap<String, f32>> {
        let query_tokens = tokenize(query);
        let mut scores: HashMap<String, f32> = HashMap::with_capacity(self.ids.len());

        for (i, id) in self.ids.iter().enumerate() {
            let mut score = 0.0;

            if self.avgdl > 0.0 {
                let doc_len = self.doc_lens[i];
                let freqs = &self.term_freqs[i];

                for token in &query_tokens {
                    let Some(idf) = self.idf.get(token) else {
                        continue;
                    };
                    let tf = freqs.get(token).copied().unwrap_or(0) as f32;
                    if tf == 0.0 {
                        continue;
                    }

                    let numerator = tf * (self.k1 + 1.0);
                    let denominator =
                        tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avgdl);
                    score += idf * numerator / denominator;
                }
            }

            scores.insert(id.clone(), score);
        }

        Ok(scores)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn ids(&self) -> Vec<String> {
        self.ids.clone()
    }
}
