//! Core data model shared across ingestion, retrieval, sync, and the
//! agent graph. Grounded on the teacher's `workspace::document` types
//! (`MemoryDocument`/`MemoryChunk`) — same shape: plain structs,
//! `serde` derives, `chrono`/`uuid` for identity and time.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sanitizes a workspace slug into a filesystem-safe directory name.
fn sanitize_slug(slug: &str) -> String {
    slug.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A handle identifying the tenant-isolated filesystem directory for one
/// workspace. One workspace has exactly one default retrieval index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub workspace_id: String,
    pub workspace_slug: String,
    pub storage_root: PathBuf,
}

impl WorkspaceContext {
    /// Build a context from a root directory and a workspace slug.
    pub fn new(root: impl Into<PathBuf>, workspace_id: impl Into<String>, slug: &str) -> Self {
        let root = root.into();
        let storage_root = root.join(sanitize_slug(slug));
        Self {
            workspace_id: workspace_id.into(),
            workspace_slug: slug.to_string(),
            storage_root,
        }
    }

    pub fn chroma_dir(&self) -> PathBuf {
        self.storage_root.join("chroma")
    }

    pub fn bm25_path(&self) -> PathBuf {
        self.storage_root.join("bm25.index")
    }

    pub fn drive_pdf_dir(&self) -> PathBuf {
        self.storage_root.join("googledrive").join("pdf")
    }

    pub fn jsonl_dir(&self) -> PathBuf {
        self.storage_root.join("jsonl")
    }

    pub fn sync_state_dir(&self) -> PathBuf {
        self.storage_root.join("sync")
    }
}

/// Which upstream collaboration tool a source originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Notion,
    Gdrive,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Notion => "notion",
            SourceType::Gdrive => "gdrive",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a record's source preserves richer-than-plain-text structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredFormat {
    #[default]
    None,
    Openxml,
}

/// The unit committed to the retrieval index.
///
/// `chunk_ord` is contiguous from 0 within a source; the parallel
/// `block_*` arrays are serialized to JSON strings to satisfy the
/// index's scalar-metadata constraint (see `RetrievalIndex`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_type: SourceType,
    pub source_id: String,
    pub chunk_ord: u32,
    pub text: String,
    pub title: String,
    pub url: String,
    pub workspace_id: String,

    pub block_types: Vec<String>,
    pub block_markers: Vec<String>,
    pub block_depths: Vec<u8>,
    pub block_starts: Vec<usize>,

    #[serde(default)]
    pub structured_format: StructuredFormat,
    #[serde(default)]
    pub structured_text: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    pub ingested_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Deterministic index id, `"{source_type}:{source_id}:{chunk_ord}"`.
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.source_type, self.source_id, self.chunk_ord)
    }

    /// A record with whitespace-only text is dropped at build time.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Serialize the parallel block-marker arrays into the scalar-metadata
    /// strings the index persists alongside the record.
    pub fn block_metadata_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct BlockMeta<'a> {
            types: &'a [String],
            markers: &'a [String],
            depths: &'a [u8],
            starts: &'a [usize],
        }
        serde_json::to_string(&BlockMeta {
            types: &self.block_types,
            markers: &self.block_markers,
            depths: &self.block_depths,
            starts: &self.block_starts,
        })
    }
}

/// Status of a workspace's RAG index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Ready,
    Building,
    Failed,
}

/// Per-workspace metadata about the retrieval index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagIndexMetadata {
    pub index_name: String,
    pub engine: String,
    pub storage_uri: PathBuf,
    pub dim: Option<usize>,
    pub status: IndexStatus,
    pub object_count: usize,
    pub vector_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl RagIndexMetadata {
    pub fn new(storage_uri: PathBuf) -> Self {
        Self {
            index_name: "default".to_string(),
            engine: "chroma".to_string(),
            storage_uri,
            dim: None,
            status: IndexStatus::Building,
            object_count: 0,
            vector_count: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Sync state for the Notion worker, resumable across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotionSyncState {
    pub data_source_id: String,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub since: Option<DateTime<Utc>>,
    pub next_cursor: Option<String>,
    pub rate_limited_until: Option<DateTime<Utc>>,
}

/// Per-file snapshot used by the Drive worker to decide re-ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveFileSnapshot {
    pub file_id: String,
    pub name: String,
    pub mime_type: String,
    pub md5_checksum: Option<String>,
    pub version: Option<i64>,
    pub modified_time: DateTime<Utc>,
    pub web_view_link: String,
    pub last_synced: DateTime<Utc>,
}

/// Sync state for the Drive worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveSyncState {
    pub data_source_id: String,
    pub start_page_token: Option<String>,
    pub bootstrapped_at: Option<DateTime<Utc>>,
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snapshots: std::collections::HashMap<String, DriveFileSnapshot>,
}

/// A validated OAuth credential handed to the core by the (out-of-scope)
/// account-management layer. Held in memory only — never serialized,
/// since `secrecy::SecretString` deliberately does not implement
/// `Serialize` without an explicit per-type opt-in.
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub provider: SourceType,
    pub user_id: String,
    pub data_source_id: String,
    pub access_token: secrecy::SecretString,
    pub refresh_token: Option<secrecy::SecretString>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
    pub provider_payload: serde_json::Value,
}

impl OAuthCredential {
    /// The core proactively refreshes within this safety window of expiry.
    pub const REFRESH_SAFETY_WINDOW_SECS: i64 = 90;

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        (self.expires_at - now).num_seconds() <= Self::REFRESH_SAFETY_WINDOW_SECS
    }
}

/// The classified intent and parameters produced by the `decide` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub mode: AgentMode,
    #[serde(default)]
    pub use_rag: bool,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub final_message_instructions: Option<String>,
}

/// The three dispatch modes of the agent graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Search,
    Generate,
    Chat,
}

/// A single retrieved-and-fused search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: SourceRecord,
    pub fused_score: f64,
}

/// Result of a `search` node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultOutcome {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<String>,
    pub top_url: Option<String>,
}

/// A created Notion page reference, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionPageRef {
    pub id: String,
    pub url: String,
}

/// Final result returned to the REST adapter for one `query` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    pub mode: AgentMode,
    pub result: SearchResultOutcome,
    #[serde(default)]
    pub notion_page: Option<NotionPageRef>,
    pub decision: Decision,
    #[serde(default)]
    pub generated_document: Option<String>,
}

/// Aggregated outcome of one sync-worker run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub ingested_chunks: usize,
    pub skipped: Vec<String>,
    pub removed: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    pub source_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_context_sanitizes_slug() {
        let ctx = WorkspaceContext::new("/data/root", "w1", "My Team!!");
        assert_eq!(
            ctx.storage_root,
            PathBuf::from("/data/root/My_Team__")
        );
    }

    #[test]
    fn record_id_is_deterministic() {
        let record = sample_record();
        assert_eq!(record.id(), "notion:page-1:0");
    }

    #[test]
    fn blank_text_detected() {
        let mut record = sample_record();
        record.text = "   \n\t ".to_string();
        assert!(record.is_blank());
    }

    fn sample_record() -> SourceRecord {
        SourceRecord {
            source_type: SourceType::Notion,
            source_id: "page-1".to_string(),
            chunk_ord: 0,
            text: "hello".to_string(),
            title: "Title".to_string(),
            url: "https://notion.so/page-1".to_string(),
            workspace_id: "w1".to_string(),
            block_types: vec!["paragraph".to_string()],
            block_markers: vec!["[[P]]".to_string()],
            block_depths: vec![0],
            block_starts: vec![0],
            structured_format: StructuredFormat::None,
            structured_text: None,
            file_path: None,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn needs_refresh_within_safety_window() {
        let cred = OAuthCredential {
            provider: SourceType::Notion,
            user_id: "u1".to_string(),
            data_source_id: "ds1".to_string(),
            access_token: secrecy::SecretString::from("tok".to_string()),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(10),
            token_type: "bearer".to_string(),
            provider_payload: serde_json::Value::Null,
        };
        assert!(cred.needs_refresh(Utc::now()));
    }
}
