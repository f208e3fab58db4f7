//! Crate-wide error taxonomy.
//!
//! Each subsystem owns a focused `thiserror` enum (matching the teacher's
//! per-module `WorkspaceError`/`LlmError`/`ToolError` convention); this
//! top-level enum wraps them for the facade API boundary described in
//! the orchestration spec.

use thiserror::Error;

/// Errors raised while chunking source pages into records.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("page '{source_id}' yielded no renderable blocks")]
    EmptyPage { source_id: String },

    #[error("unsupported mime type: {mime_type}")]
    UnsupportedMime { mime_type: String },

    #[error("failed to parse structured document '{source_id}': {reason}")]
    MalformedPayload { source_id: String, reason: String },
}

/// Errors raised by the hybrid retrieval index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding dimension mismatch: index uses {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),

    #[error("index write failed: {0}")]
    IndexWriteFailed(String),

    #[error("invalid search parameter: {0}")]
    InvalidParameter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by a sync worker (Notion or Drive).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("credential expired and could not be refreshed for data source '{data_source_id}'")]
    AuthExpired { data_source_id: String },

    #[error("provider rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider unavailable after {attempts} attempts: {reason}")]
    ProviderUnavailable { attempts: u32, reason: String },

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised inside the agent orchestration graph.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("decide node returned no decision")]
    NoDecision,

    #[error("decide node output failed schema validation: {0}")]
    ParsingFailed(String),

    #[error("generation exceeded the configured length budget")]
    LengthExceeded,

    #[error("llm call failed: {0}")]
    LlmFailed(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("request exceeded its time budget")]
    RequestTimeout,

    #[error("request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Top-level error surfaced across the facade API.
#[derive(Debug, Error)]
pub enum ArcanaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("configuration error: {0}")]
    Config(String),
}
