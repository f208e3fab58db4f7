//! Embedded BM25 keyword index, persisted alongside the dense store.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::RetrievalError;

const K1: f64 = 1.2;
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Bm25Index {
    /// token -> (doc id -> term frequency)
    postings: HashMap<String, HashMap<String, u32>>,
    doc_lengths: HashMap<String, u32>,
    total_doc_len: u64,
}

impl Bm25Index {
    pub fn load_or_default(path: &Path) -> Result<Self, RetrievalError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), RetrievalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    fn avg_doc_len(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_doc_len as f64 / self.doc_lengths.len() as f64
        }
    }

    pub fn upsert(&mut self, id: &str, text: &str) {
        self.remove(id);
        let tokens = tokenize(text);
        let len = tokens.len() as u32;
        self.doc_lengths.insert(id.to_string(), len);
        self.total_doc_len += len as u64;

        let mut freqs: HashMap<String, u32> = HashMap::new();
        for tok in tokens {
            *freqs.entry(tok).or_insert(0) += 1;
        }
        for (tok, freq) in freqs {
            self.postings
                .entry(tok)
                .or_default()
                .insert(id.to_string(), freq);
        }
    }

    pub fn remove(&mut self, id: &str) {
        if let Some(len) = self.doc_lengths.remove(id) {
            self.total_doc_len = self.total_doc_len.saturating_sub(len as u64);
        }
        for postings in self.postings.values_mut() {
            postings.remove(id);
        }
    }

    pub fn remove_all<'a>(&mut self, ids: impl Iterator<Item = &'a str>) {
        for id in ids {
            self.remove(id);
        }
    }

    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.doc_lengths
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Top-k ids by BM25 score against `query`, descending, ties broken
    /// by id ascending for determinism.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        let n = self.doc_lengths.len() as f64;
        if n == 0.0 {
            return Vec::new();
        }
        let avg_len = self.avg_doc_len();
        let query_tokens = tokenize(query);

        let mut scores: HashMap<String, f64> = HashMap::new();
        for tok in &query_tokens {
            let Some(postings) = self.postings.get(tok) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (id, &freq) in postings {
                let doc_len = *self.doc_lengths.get(id).unwrap_or(&0) as f64;
                let freq = freq as f64;
                let denom = freq + K1 * (1.0 - B + B * (doc_len / avg_len.max(1.0)));
                let score = idf * (freq * (K1 + 1.0)) / denom.max(f64::EPSILON);
                *scores.entry(id.clone()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_scores_above_no_match() {
        let mut idx = Bm25Index::default();
        idx.upsert("a", "revenue grew 18% in Q3");
        idx.upsert("b", "the weather was nice today");
        let hits = idx.search("revenue Q3", 5);
        assert_eq!(hits[0].0, "a");
    }

    #[test]
    fn remove_drops_doc_from_results() {
        let mut idx = Bm25Index::default();
        idx.upsert("a", "revenue grew in q3");
        idx.remove("a");
        assert!(idx.search("revenue", 5).is_empty());
    }
}
