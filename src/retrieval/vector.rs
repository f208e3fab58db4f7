//! Embedded dense-vector store.
//!
//! The original system delegates to Chroma; this core owns the
//! indexable projection itself (§1 non-goals: no long-term backup of
//! raw documents, but the vector store IS the projection), so the
//! dense side is a small persisted cosine-similarity scan rather than
//! a client for an external vector database.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorStore {
    dim: Option<usize>,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorStore {
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

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert/overwrite one id's vector. Rejects a dimension different
    /// from the one recorded on first write.
    pub fn upsert(&mut self, id: &str, vector: Vec<f32>) -> Result<(), RetrievalError> {
        match self.dim {
            None => self.dim = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(RetrievalError::DimMismatch {
                    expected: d,
                    got: vector.len(),
                });
            }
            _ => {}
        }
        self.vectors.insert(id.to_string(), vector);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    pub fn remove_all<'a>(&mut self, ids: impl Iterator<Item = &'a str>) {
        for id in ids {
            self.vectors.remove(id);
        }
    }

    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.vectors
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Top-k ids by cosine similarity to `query`, descending, ties broken
    /// by id ascending for determinism.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .vectors
            .iter()
            .map(|(id, vec)| (id.clone(), cosine_similarity(query, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}
