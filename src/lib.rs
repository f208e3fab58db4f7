//! Arcana: a workspace knowledge-assistant core.
//!
//! Ingests Notion and Google Drive content into a per-workspace hybrid
//! retrieval index, keeps it in sync incrementally, and answers or
//! drafts documents through a small agent orchestration graph. Grounded
//! throughout on the teacher's module layout (per-subsystem error enums,
//! `tracing` logging, `config`+`dotenvy` layered settings) — see
//! `DESIGN.md` for the full grounding ledger.

pub mod agent;
pub mod chunk;
pub mod config;
pub mod error;
pub mod llm;
pub mod markdown;
pub mod model;
pub mod providers;
pub mod retrieval;
pub mod sync;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{AgentState, NodeContext};
use crate::chunk::ChunkConfig;
use crate::config::ArcanaConfig;
use crate::error::ArcanaError;
use crate::llm::{Embedder, LlmProvider};
use crate::model::{
    AgentExecutionResult, DriveSyncState, NotionSyncState, OAuthCredential, SyncRunSummary, WorkspaceContext,
};
use crate::providers::{DriveApi, NotionApi};
use crate::sync::{DriveSyncWorker, NotionSyncWorker, SyncMode, TokenProvider};

fn load_state<T: Default + serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, ArcanaError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path).map_err(|e| ArcanaError::Sync(e.into()))?;
    serde_json::from_slice(&bytes).map_err(|e| ArcanaError::Sync(e.into()))
}

fn save_state<T: serde::Serialize>(path: &std::path::Path, state: &T) -> Result<(), ArcanaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArcanaError::Sync(e.into()))?;
    }
    let bytes = serde_json::to_vec_pretty(state).map_err(|e| ArcanaError::Sync(e.into()))?;
    std::fs::write(path, bytes).map_err(|e| ArcanaError::Sync(e.into()))
}

/// A sync run aborted outright (rather than reporting a per-source
/// failure in its `SyncRunSummary`) — mark the index `failed` (spec.md
/// §7) before surfacing the original error.
fn mark_index_failed(ctx: &WorkspaceContext) {
    match crate::retrieval::RetrievalIndex::open(&ctx.storage_root) {
        Ok(mut index) => {
            if let Err(e) = index.mark_failed() {
                tracing::warn!(error = %e, "failed to persist failed index status");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to open index to mark failed status"),
    }
}

/// The external interface of the core: ingest a source, keep it synced,
/// disconnect it, or answer/generate against the resulting index
/// (spec.md §6).
pub struct ArcanaCore {
    pub config: ArcanaConfig,
    pub embedder: Arc<dyn Embedder>,
    pub planning_llm: Arc<dyn LlmProvider>,
    pub final_answer_llm: Arc<dyn LlmProvider>,
    pub notion_api: Arc<dyn NotionApi>,
    pub drive_api: Arc<dyn DriveApi>,
    pub token_provider: Arc<TokenProvider>,
}

impl ArcanaCore {
    pub fn workspace(&self, workspace_id: &str, slug: &str) -> WorkspaceContext {
        WorkspaceContext::new(&self.config.workspace_storage_root, workspace_id, slug)
    }

    fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: 2_000,
            overlap_ratio: self.config.rag_chunk_overlap_ratio,
        }
    }

    /// Pull Notion content into the workspace index, full or incremental.
    pub async fn ingest_notion(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        mode: SyncMode,
    ) -> Result<SyncRunSummary, ArcanaError> {
        let state_path = ctx.sync_state_dir().join("notion.json");
        let mut state: NotionSyncState = load_state(&state_path)?;
        let worker = NotionSyncWorker::new(self.notion_api.as_ref(), self.embedder.as_ref(), self.chunk_config());
        let summary = worker
            .pull(ctx, credential, &self.token_provider, mode, &mut state)
            .await
            .map_err(|e| {
                mark_index_failed(ctx);
                ArcanaError::from(e)
            })?;
        save_state(&state_path, &state)?;
        Ok(summary)
    }

    /// First-time enumeration of a Drive folder into the workspace index.
    pub async fn bootstrap_gdrive(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        root_folder_id: &str,
    ) -> Result<SyncRunSummary, ArcanaError> {
        let state_path = ctx.sync_state_dir().join("gdrive.json");
        let mut state: DriveSyncState = load_state(&state_path)?;
        let worker = DriveSyncWorker::new(self.drive_api.as_ref(), self.embedder.as_ref(), self.chunk_config());
        let summary = worker
            .bootstrap(ctx, credential, &self.token_provider, root_folder_id, &mut state)
            .await
            .map_err(|e| {
                mark_index_failed(ctx);
                ArcanaError::from(e)
            })?;
        save_state(&state_path, &state)?;
        Ok(summary)
    }

    /// Changes-API-driven incremental Drive sync, requires a prior bootstrap.
    pub async fn sync_gdrive(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        root_folder_id: &str,
    ) -> Result<SyncRunSummary, ArcanaError> {
        let state_path = ctx.sync_state_dir().join("gdrive.json");
        let mut state: DriveSyncState = load_state(&state_path)?;
        let worker = DriveSyncWorker::new(self.drive_api.as_ref(), self.embedder.as_ref(), self.chunk_config());
        let summary = worker
            .incremental(ctx, credential, &self.token_provider, root_folder_id, &mut state)
            .await
            .map_err(|e| {
                mark_index_failed(ctx);
                ArcanaError::from(e)
            })?;
        save_state(&state_path, &state)?;
        Ok(summary)
    }

    pub fn disconnect_notion(&self, ctx: &WorkspaceContext) -> Result<(), ArcanaError> {
        NotionSyncWorker::disconnect(ctx)?;
        let _ = std::fs::remove_file(ctx.sync_state_dir().join("notion.json"));
        Ok(())
    }

    pub fn disconnect_gdrive(&self, ctx: &WorkspaceContext) -> Result<(), ArcanaError> {
        DriveSyncWorker::disconnect(ctx)?;
        let _ = std::fs::remove_file(ctx.sync_state_dir().join("gdrive.json"));
        Ok(())
    }

    /// Run one query through the agent graph: classify intent, answer or
    /// draft, optionally publish to Notion.
    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &self,
        workspace: WorkspaceContext,
        query: impl Into<String>,
        user_id: impl Into<String>,
        final_message_instructions: Option<String>,
        notion_credential: Option<&OAuthCredential>,
        notion_parent_page_id: Option<&str>,
        cancellation: CancellationToken,
    ) -> Result<AgentExecutionResult, ArcanaError> {
        let mut state = AgentState::new(query, workspace, user_id);
        if let Some(instructions) = final_message_instructions {
            state = state.with_final_message_instructions(instructions);
        }

        let node_ctx = NodeContext {
            planning_llm: self.planning_llm.as_ref(),
            final_answer_llm: self.final_answer_llm.as_ref(),
            embedder: self.embedder.as_ref(),
            notion_api: self.notion_api.as_ref(),
            notion_credential,
            notion_parent_page_id,
            config: &self.config,
            cancellation,
        };

        agent::run(&node_ctx, state).await.map_err(ArcanaError::from)
    }
}
