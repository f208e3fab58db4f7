//! Hybrid retrieval index: per-workspace dense-vector + BM25 keyword
//! store with atomic-from-reader-perspective replace-by-source and
//! Reciprocal Rank Fusion search.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::llm::Embedder;
use crate::model::{IndexStatus, RagIndexMetadata, ScoredRecord, SourceRecord, SourceType};
use crate::retrieval::bm25::Bm25Index;
use crate::retrieval::vector::VectorStore;

/// Which modality `search` should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Vector,
    Keyword,
    Hybrid,
}

/// Search parameters, clamped per spec.md §4.2 (`k ∈ [1,10]`,
/// `alpha ∈ (0,1]`).
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub k: usize,
    pub alpha: f64,
    pub rrf_k: u32,
    pub strategy: SearchStrategy,
}

impl SearchParams {
    pub fn clamped(k: usize, alpha: f64, rrf_k: u32, strategy: SearchStrategy) -> Self {
        Self {
            k: k.clamp(1, 10),
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            rrf_k,
            strategy,
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k: 5,
            alpha: 0.6,
            rrf_k: 60,
            strategy: SearchStrategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RecordStore {
    records: HashMap<String, SourceRecord>,
}

/// The per-workspace hybrid index. Owns the dense store, the keyword
/// store, and the scalar record projection, all colocated under the
/// workspace's `chroma/` directory on disk (the real Chroma keeps
/// documents+metadata alongside vectors the same way).
pub struct RetrievalIndex {
    storage_root: std::path::PathBuf,
    vectors: VectorStore,
    keyword: Bm25Index,
    records: RecordStore,
    pub metadata: RagIndexMetadata,
}

fn source_prefix(source_type: SourceType, source_id: &str) -> String {
    format!("{}:{}:", source_type, source_id)
}

fn source_type_prefix(source_type: SourceType) -> String {
    format!("{}:", source_type)
}

impl RetrievalIndex {
    fn vectors_path(root: &Path) -> std::path::PathBuf {
        root.join("chroma").join("vectors.json")
    }
    fn records_path(root: &Path) -> std::path::PathBuf {
        root.join("chroma").join("records.json")
    }
    fn bm25_path(root: &Path) -> std::path::PathBuf {
        root.join("bm25.index")
    }
    fn metadata_path(root: &Path) -> std::path::PathBuf {
        root.join("chroma").join("metadata.json")
    }

    /// Open (or initialize) the index for a workspace storage root.
    pub fn open(storage_root: impl Into<std::path::PathBuf>) -> Result<Self, RetrievalError> {
        let storage_root = storage_root.into();
        let vectors = VectorStore::load_or_default(&Self::vectors_path(&storage_root))?;
        let keyword = Bm25Index::load_or_default(&Self::bm25_path(&storage_root))?;
        let records = if Self::records_path(&storage_root).exists() {
            serde_json::from_slice(&std::fs::read(Self::records_path(&storage_root))?)?
        } else {
            RecordStore::default()
        };
        let metadata_path = Self::metadata_path(&storage_root);
        let metadata = if metadata_path.exists() {
            serde_json::from_slice(&std::fs::read(&metadata_path)?)?
        } else {
            RagIndexMetadata::new(storage_root.join("chroma"))
        };

        Ok(Self {
            storage_root,
            vectors,
            keyword,
            records,
            metadata,
        })
    }

    fn persist(&mut self) -> Result<(), RetrievalError> {
        self.vectors.save(&Self::vectors_path(&self.storage_root))?;
        self.keyword.save(&Self::bm25_path(&self.storage_root))?;
        if let Some(parent) = Self::records_path(&self.storage_root).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            Self::records_path(&self.storage_root),
            serde_json::to_vec_pretty(&self.records)?,
        )?;

        self.metadata.object_count = self.records.records.len();
        self.metadata.vector_count = self.vectors.len();
        self.metadata.dim = self.vectors.dim();
        self.metadata.status = IndexStatus::Ready;
        self.metadata.updated_at = Utc::now();
        std::fs::write(
            Self::metadata_path(&self.storage_root),
            serde_json::to_vec_pretty(&self.metadata)?,
        )?;
        Ok(())
    }

    /// Atomic-from-reader-perspective swap of all records for one source.
    ///
    /// Implemented as: upsert new ids, then delete pre-existing ids not
    /// in the new set — readers observe either the old full set or the
    /// new full set, never less than one complete set (§9 design note).
    pub async fn replace(
        &mut self,
        embedder: &dyn Embedder,
        source_type: SourceType,
        source_id: &str,
        new_records: Vec<SourceRecord>,
    ) -> Result<(), RetrievalError> {
        let prefix = source_prefix(source_type, source_id);
        let previous_ids: HashSet<String> = self
            .vectors
            .ids_with_prefix(&prefix)
            .into_iter()
            .chain(self.keyword.ids_with_prefix(&prefix))
            .collect();

        let texts: Vec<String> = new_records.iter().map(|r| r.text.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder
                .embed(&texts)
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?
        };

        let mut new_ids: HashSet<String> = HashSet::new();
        for (record, embedding) in new_records.iter().zip(embeddings) {
            let id = record.id();
            self.vectors.upsert(&id, embedding)?;
            self.keyword.upsert(&id, &record.text);
            self.records.records.insert(id.clone(), record.clone());
            new_ids.insert(id);
        }

        let stale: Vec<String> = previous_ids.difference(&new_ids).cloned().collect();
        for id in &stale {
            self.vectors.remove(id);
            self.keyword.remove(id);
            self.records.records.remove(id);
        }

        self.persist()?;
        Ok(())
    }

    pub fn delete_by_source(
        &mut self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<(), RetrievalError> {
        let prefix = source_prefix(source_type, source_id);
        let ids: Vec<String> = self.records.records.keys().filter(|id| id.starts_with(&prefix)).cloned().collect();
        self.vectors.remove_all(ids.iter().map(String::as_str));
        self.keyword.remove_all(ids.iter().map(String::as_str));
        for id in ids {
            self.records.records.remove(&id);
        }
        self.persist()
    }

    pub fn delete_by_source_type(&mut self, source_type: SourceType) -> Result<(), RetrievalError> {
        let prefix = source_type_prefix(source_type);
        let ids: Vec<String> = self.records.records.keys().filter(|id| id.starts_with(&prefix)).cloned().collect();
        self.vectors.remove_all(ids.iter().map(String::as_str));
        self.keyword.remove_all(ids.iter().map(String::as_str));
        for id in ids {
            self.records.records.remove(&id);
        }
        self.persist()
    }

    /// Mark the index `failed` after a sync run aborts (spec.md §7
    /// `INDEX_WRITE_FAILED`/`PROVIDER_UNAVAILABLE`), independent of
    /// `persist`'s unconditional `Ready` transition on success.
    pub fn mark_failed(&mut self) -> Result<(), RetrievalError> {
        self.metadata.status = IndexStatus::Failed;
        self.metadata.updated_at = Utc::now();
        if let Some(parent) = Self::metadata_path(&self.storage_root).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            Self::metadata_path(&self.storage_root),
            serde_json::to_vec_pretty(&self.metadata)?,
        )?;
        Ok(())
    }

    pub fn object_count(&self) -> usize {
        self.records.records.len()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    /// Hybrid (or single-modality) search, returning top-k
    /// `(record, fused_score)` pairs.
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        params: SearchParams,
    ) -> Result<Vec<ScoredRecord>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidParameter("query must not be empty".to_string()));
        }

        match params.strategy {
            SearchStrategy::Vector => {
                let query_vec = embedder
                    .embed(&[query.to_string()])
                    .await
                    .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?
                    .remove(0);
                let hits = self.vectors.search(&query_vec, params.k);
                Ok(self.to_scored(hits))
            }
            SearchStrategy::Keyword => {
                let hits = self.keyword.search(query, params.k);
                Ok(self.to_scored(hits))
            }
            SearchStrategy::Hybrid => self.search_hybrid(embedder, query, params).await,
        }
    }

    async fn search_hybrid(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        params: SearchParams,
    ) -> Result<Vec<ScoredRecord>, RetrievalError> {
        let oversample = (params.k as f64 / params.alpha).ceil() as usize;
        let k_over = params.k.max(oversample);

        let query_vec = embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?
            .remove(0);
        let vector_hits = self.vectors.search(&query_vec, k_over);
        let keyword_hits = self.keyword.search(query, k_over);

        let vec_rank: HashMap<&str, usize> = vector_hits
            .iter()
            .enumerate()
            .map(|(rank, (id, _))| (id.as_str(), rank + 1))
            .collect();
        let kw_rank: HashMap<&str, usize> = keyword_hits
            .iter()
            .enumerate()
            .map(|(rank, (id, _))| (id.as_str(), rank + 1))
            .collect();

        let all_ids: HashSet<&str> = vec_rank.keys().chain(kw_rank.keys()).copied().collect();

        let mut fused: Vec<(String, f64)> = all_ids
            .into_iter()
            .map(|id| {
                let vec_term = vec_rank
                    .get(id)
                    .map(|&r| params.alpha / (params.rrf_k as f64 + r as f64))
                    .unwrap_or(0.0);
                let kw_term = kw_rank
                    .get(id)
                    .map(|&r| (1.0 - params.alpha) / (params.rrf_k as f64 + r as f64))
                    .unwrap_or(0.0);
                (id.to_string(), vec_term + kw_term)
            })
            .collect();

        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        fused.truncate(params.k);

        Ok(self.to_scored(fused))
    }

    fn to_scored(&self, hits: Vec<(String, f64)>) -> Vec<ScoredRecord> {
        hits.into_iter()
            .filter_map(|(id, score)| {
                self.records.records.get(&id).map(|record| ScoredRecord {
                    record: record.clone(),
                    fused_score: score,
                })
            })
            .collect()
    }
}
