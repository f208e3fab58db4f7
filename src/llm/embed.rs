//! Embedding provider abstraction.
//!
//! Grounded on the teacher's `workspace::embeddings::EmbeddingProvider`
//! trait, referenced in `workspace/mod.rs` as `Arc<dyn
//! EmbeddingProvider>` and injected into the workspace at construction.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::error::RetrievalError;

/// Batch text-to-vector embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

/// Production embedder calling an HTTP embeddings endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<secrecy::SecretString>,
    model: String,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.map(secrecy::SecretString::from),
            model: model.into(),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(512).unwrap())),
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbedResponseItem {
    embedding: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseItem>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut out = vec![Vec::new(); texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap();
            for (i, text) in texts.iter().enumerate() {
                if let Some(v) = cache.get(text) {
                    out[i] = v.clone();
                } else {
                    misses.push(i);
                }
            }
        }

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let mut req = self.client.post(&self.endpoint).json(&EmbedRequest {
                model: &self.model,
                input: &miss_texts,
            });
            if let Some(ref key) = self.api_key {
                use secrecy::ExposeSecret;
                req = req.bearer_auth(key.expose_secret());
            }
            let resp = req
                .send()
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(RetrievalError::EmbeddingFailed(format!(
                    "embedding endpoint returned {}",
                    resp.status()
                )));
            }
            let parsed: EmbedResponse = resp
                .json()
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;
            if parsed.data.len() != miss_texts.len() {
                return Err(RetrievalError::EmbeddingFailed(
                    "embedding response length mismatch".to_string(),
                ));
            }

            let mut cache = self.cache.lock().unwrap();
            for (slot, item) in misses.into_iter().zip(parsed.data) {
                cache.put(texts[slot].clone(), item.embedding.clone());
                out[slot] = item.embedding;
            }
        }

        Ok(out)
    }
}

/// Deterministic embedder for tests: hashes each token into a fixed-size
/// vector so semantically similar strings land closer together without
/// a real model. Mirrors the teacher's pattern of an in-memory fake
/// standing in for its external `LlmProvider`/`EmbeddingProvider`.
pub struct MockEmbedder {
    pub dim: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dim: 32 }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
    }
}

fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0f32; dim];
    for word in text.split_whitespace().map(|w| w.to_lowercase()) {
        let mut hash: u64 = 1469598103934665603;
        for b in word.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        vec[(hash as usize) % dim] += 1.0;
    }
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
