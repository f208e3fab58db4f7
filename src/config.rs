//! Runtime configuration, layered from environment variables (and an
//! optional `.env`/`.toml` file) the way the teacher loads its own
//! settings with `dotenvy` + the `config` crate.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

fn default_top_k() -> usize {
    5
}
fn default_alpha() -> f64 {
    0.6
}
fn default_rrf_k() -> u32 {
    60
}
fn default_overlap_ratio() -> f64 {
    0.10
}
fn default_doc_gen_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_provider_timeout_secs() -> u64 {
    60
}
fn default_embedding_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_context_char_budget() -> usize {
    12_000
}

/// Process-wide configuration for the Arcana core.
///
/// Mirrors the configuration table in the orchestration spec: retrieval
/// defaults, model deployment selection, and the filesystem root under
/// which every workspace is namespaced.
#[derive(Debug, Clone, Deserialize)]
pub struct ArcanaConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_alpha")]
    pub hybrid_alpha: f64,

    #[serde(default = "default_rrf_k")]
    pub hybrid_rrf_k: u32,

    #[serde(default = "default_overlap_ratio")]
    pub rag_chunk_overlap_ratio: f64,

    #[serde(default = "default_doc_gen_max_tokens")]
    pub doc_gen_max_tokens: u32,

    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,

    #[serde(default)]
    pub chat_deployment: Option<String>,
    #[serde(default)]
    pub embed_deployment: Option<String>,
    #[serde(default)]
    pub final_answer_deployment: Option<String>,

    #[serde(default)]
    pub notion_client_id: Option<String>,
    #[serde(default)]
    pub notion_client_secret: Option<String>,
    #[serde(default)]
    pub notion_redirect_uri: Option<String>,

    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default)]
    pub google_client_secret: Option<String>,
    #[serde(default)]
    pub google_redirect_uri: Option<String>,

    #[serde(default = "default_workspace_storage_root")]
    pub workspace_storage_root: PathBuf,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_workspace_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("arcana")
        .join("workspaces")
}

impl Default for ArcanaConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            hybrid_alpha: default_alpha(),
            hybrid_rrf_k: default_rrf_k(),
            rag_chunk_overlap_ratio: default_overlap_ratio(),
            doc_gen_max_tokens: default_doc_gen_max_tokens(),
            context_char_budget: default_context_char_budget(),
            chat_deployment: None,
            embed_deployment: None,
            final_answer_deployment: None,
            notion_client_id: None,
            notion_client_secret: None,
            notion_redirect_uri: None,
            google_client_id: None,
            google_client_secret: None,
            google_redirect_uri: None,
            workspace_storage_root: default_workspace_storage_root(),
            llm_timeout_secs: default_llm_timeout_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ArcanaConfig {
    /// Load configuration from the process environment (and `.env` if
    /// present), falling back to the documented defaults.
    pub fn from_env() -> Result<Self, crate::error::ArcanaError> {
        let _ = dotenvy::dotenv();

        let built = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| crate::error::ArcanaError::Config(e.to_string()))?;

        // `config::Environment` only yields keys that were actually set;
        // layer those over the struct-level defaults instead of requiring
        // every field to be present.
        let mut cfg = ArcanaConfig::default();
        if let Ok(partial) = built.try_deserialize::<PartialConfig>() {
            partial.apply(&mut cfg);
        }
        Ok(cfg)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// All-optional mirror of [`ArcanaConfig`] used to layer environment
/// overrides onto the struct defaults without clobbering unset fields.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    top_k: Option<usize>,
    hybrid_alpha: Option<f64>,
    hybrid_rrf_k: Option<u32>,
    rag_chunk_overlap_ratio: Option<f64>,
    doc_gen_max_tokens: Option<u32>,
    chat_deployment: Option<String>,
    embed_deployment: Option<String>,
    final_answer_deployment: Option<String>,
    notion_client_id: Option<String>,
    notion_client_secret: Option<String>,
    notion_redirect_uri: Option<String>,
    google_client_id: Option<String>,
    google_client_secret: Option<String>,
    google_redirect_uri: Option<String>,
    workspace_storage_root: Option<PathBuf>,
}

impl PartialConfig {
    fn apply(self, cfg: &mut ArcanaConfig) {
        if let Some(v) = self.top_k {
            cfg.top_k = v;
        }
        if let Some(v) = self.hybrid_alpha {
            cfg.hybrid_alpha = v;
        }
        if let Some(v) = self.hybrid_rrf_k {
            cfg.hybrid_rrf_k = v;
        }
        if let Some(v) = self.rag_chunk_overlap_ratio {
            cfg.rag_chunk_overlap_ratio = v;
        }
        if let Some(v) = self.doc_gen_max_tokens {
            cfg.doc_gen_max_tokens = v;
        }
        if self.chat_deployment.is_some() {
            cfg.chat_deployment = self.chat_deployment;
        }
        if self.embed_deployment.is_some() {
            cfg.embed_deployment = self.embed_deployment;
        }
        if self.final_answer_deployment.is_some() {
            cfg.final_answer_deployment = self.final_answer_deployment;
        }
        if self.notion_client_id.is_some() {
            cfg.notion_client_id = self.notion_client_id;
        }
        if self.notion_client_secret.is_some() {
            cfg.notion_client_secret = self.notion_client_secret;
        }
        if self.notion_redirect_uri.is_some() {
            cfg.notion_redirect_uri = self.notion_redirect_uri;
        }
        if self.google_client_id.is_some() {
            cfg.google_client_id = self.google_client_id;
        }
        if self.google_client_secret.is_some() {
            cfg.google_client_secret = self.google_client_secret;
        }
        if self.google_redirect_uri.is_some() {
            cfg.google_redirect_uri = self.google_redirect_uri;
        }
        if let Some(v) = self.workspace_storage_root {
            cfg.workspace_storage_root = v;
        }
    }
}
