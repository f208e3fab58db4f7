//! Notion sync worker: the ENUMERATE → FETCH_BLOCKS → BUILD → COMMIT →
//! ADVANCE state machine from spec.md §4.3, with BACKOFF on rate
//! limiting and per-page failure isolation.

use chrono::{DateTime, Duration, Utc};

use crate::chunk::{ChunkConfig, PageInput, build_records, render_notion_blocks};
use crate::error::{ChunkError, SyncError};
use crate::llm::Embedder;
use crate::model::{NotionSyncState, OAuthCredential, SourceType, StructuredFormat, SyncFailure, SyncRunSummary, WorkspaceContext};
use crate::providers::{NotionApi, NotionPageSummary};
use crate::retrieval::RetrievalIndex;
use crate::sync::credential::TokenProvider;
use crate::sync::lock::KeyedLockRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Incremental,
}

pub struct NotionSyncWorker<'a> {
    pub api: &'a dyn NotionApi,
    pub embedder: &'a dyn Embedder,
    pub chunk_config: ChunkConfig,
    replace_locks: KeyedLockRegistry,
}

impl<'a> NotionSyncWorker<'a> {
    pub fn new(api: &'a dyn NotionApi, embedder: &'a dyn Embedder, chunk_config: ChunkConfig) -> Self {
        Self {
            api,
            embedder,
            chunk_config,
            replace_locks: KeyedLockRegistry::new(),
        }
    }

    /// Run one full or incremental pull. Mutates `state` in place so the
    /// caller persists it under a per-data-source row lock.
    pub async fn pull(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        token_provider: &TokenProvider,
        mode: SyncMode,
        state: &mut NotionSyncState,
    ) -> Result<SyncRunSummary, SyncError> {
        let mut index = RetrievalIndex::open(&ctx.storage_root)?;
        let mut summary = SyncRunSummary::default();
        let since = if mode == SyncMode::Incremental { state.since } else { None };
        let mut cursor = if mode == SyncMode::Full { None } else { state.next_cursor.clone() };
        let mut max_last_edited: Option<DateTime<Utc>> = None;

        loop {
            let fresh = token_provider.fresh(credential).await?;
            let batch = match self.api.search_pages(&fresh.access_token, cursor.clone()).await {
                Ok(batch) => batch,
                Err(SyncError::RateLimited { retry_after_secs }) => {
                    state.rate_limited_until = Some(Utc::now() + Duration::seconds(retry_after_secs as i64));
                    state.next_cursor = cursor;
                    return Ok(summary);
                }
                Err(e) => return Err(e),
            };

            for page in &batch.pages {
                if let Some(since) = since {
                    if page.last_edited_time <= since {
                        continue;
                    }
                }

                let fresh = token_provider.fresh(credential).await?;
                match self.ingest_page(&fresh, page, ctx, &mut index).await {
                    Ok(n) => summary.ingested_chunks += n,
                    Err(SyncError::Chunk(ChunkError::EmptyPage { source_id })) => {
                        summary.skipped.push(source_id);
                    }
                    Err(e) => summary.failures.push(SyncFailure {
                        source_id: page.id.clone(),
                        reason: e.to_string(),
                    }),
                }

                max_last_edited = Some(match max_last_edited {
                    Some(m) => m.max(page.last_edited_time),
                    None => page.last_edited_time,
                });
            }

            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if mode == SyncMode::Full {
            state.last_full_sync = Some(Utc::now());
            state.next_cursor = None;
        }
        if let Some(max) = max_last_edited {
            state.since = Some(max);
        }
        state.rate_limited_until = None;
        Ok(summary)
    }

    async fn ingest_page(
        &self,
        credential: &OAuthCredential,
        page: &NotionPageSummary,
        ctx: &WorkspaceContext,
        index: &mut RetrievalIndex,
    ) -> Result<usize, SyncError> {
        let blocks = self
            .api
            .retrieve_block_children(&credential.access_token, &page.id)
            .await?;
        let rendered = render_notion_blocks(&blocks);

        let page_input = PageInput {
            source_type: SourceType::Notion,
            source_id: &page.id,
            title: &page.title,
            url: &page.url,
            workspace_id: &ctx.workspace_id,
            blocks: rendered,
            structured_format: StructuredFormat::None,
            structured_text: None,
            file_path: None,
        };
        let records = build_records(page_input, &self.chunk_config)?;
        let ingested = records.len();
        let _guard = self.replace_locks.acquire(&format!("notion:{}", page.id)).await;
        index.replace(self.embedder, SourceType::Notion, &page.id, records).await?;
        Ok(ingested)
    }

    /// `disconnect('notion')`: bulk removal for the disconnect flow.
    pub fn disconnect(ctx: &WorkspaceContext) -> Result<(), SyncError> {
        let mut index = RetrievalIndex::open(&ctx.storage_root)?;
        index.delete_by_source_type(SourceType::Notion)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockEmbedder;
    use crate::model::SourceType;
    use crate::providers::FakeNotionApi;
    use crate::sync::credential::TokenRefresher;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct NoopRefresher;
    #[async_trait]
    impl TokenRefresher for NoopRefresher {
        async fn refresh(&self, credential: &OAuthCredential) -> Result<OAuthCredential, SyncError> {
            let mut refreshed = credential.clone();
            refreshed.expires_at = Utc::now() + Duration::hours(1);
            Ok(refreshed)
        }
    }

    fn credential() -> OAuthCredential {
        OAuthCredential {
            provider: SourceType::Notion,
            user_id: "u1".to_string(),
            data_source_id: "ds-notion".to_string(),
            access_token: secrecy::SecretString::from("tok".to_string()),
            refresh_token: None,
            expires_at: Utc::now() + Duration::hours(1),
            token_type: "bearer".to_string(),
            provider_payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn full_pull_ingests_all_pages() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");

        let mut blocks = std::collections::HashMap::new();
        blocks.insert(
            "page-1".to_string(),
            vec![crate::chunk::NotionBlockNode {
                block_type: "paragraph".to_string(),
                text: "revenue grew 18% in Q3".to_string(),
                children: vec![],
            }],
        );
        let api = FakeNotionApi {
            pages: vec![NotionPageSummary {
                id: "page-1".to_string(),
                url: "https://notion.so/page-1".to_string(),
                title: "Q3 Review".to_string(),
                last_edited_time: Utc::now(),
            }],
            blocks,
            created_pages: Default::default(),
        };
        let embedder = MockEmbedder::default();
        let worker = NotionSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = NotionSyncState::default();

        let summary = worker
            .pull(&ctx, &credential(), &token_provider, SyncMode::Full, &mut state)
            .await
            .unwrap();

        assert_eq!(summary.ingested_chunks, 1);
        assert!(summary.failures.is_empty());
        assert!(state.last_full_sync.is_some());
        assert!(state.since.is_some());
    }

    #[tokio::test]
    async fn image_only_page_is_skipped_not_failed() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");

        let mut blocks = std::collections::HashMap::new();
        blocks.insert(
            "page-2".to_string(),
            vec![crate::chunk::NotionBlockNode {
                block_type: "image".to_string(),
                text: String::new(),
                children: vec![],
            }],
        );
        let api = FakeNotionApi {
            pages: vec![NotionPageSummary {
                id: "page-2".to_string(),
                url: "https://notion.so/page-2".to_string(),
                title: "Pics".to_string(),
                last_edited_time: Utc::now(),
            }],
            blocks,
            created_pages: Default::default(),
        };
        let embedder = MockEmbedder::default();
        let worker = NotionSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = NotionSyncState::default();

        let summary = worker
            .pull(&ctx, &credential(), &token_provider, SyncMode::Full, &mut state)
            .await
            .unwrap();

        assert_eq!(summary.ingested_chunks, 0);
        assert_eq!(summary.skipped, vec!["page-2".to_string()]);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn incremental_pull_filters_by_since() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let old_time = Utc::now() - Duration::days(2);

        let mut blocks = std::collections::HashMap::new();
        blocks.insert(
            "page-old".to_string(),
            vec![crate::chunk::NotionBlockNode {
                block_type: "paragraph".to_string(),
                text: "stale content".to_string(),
                children: vec![],
            }],
        );
        let api = FakeNotionApi {
            pages: vec![NotionPageSummary {
                id: "page-old".to_string(),
                url: "https://notion.so/page-old".to_string(),
                title: "Old".to_string(),
                last_edited_time: old_time,
            }],
            blocks,
            created_pages: Default::default(),
        };
        let embedder = MockEmbedder::default();
        let worker = NotionSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = NotionSyncState {
            since: Some(Utc::now() - Duration::hours(1)),
            ..Default::default()
        };

        let summary = worker
            .pull(&ctx, &credential(), &token_provider, SyncMode::Incremental, &mut state)
            .await
            .unwrap();

        assert_eq!(summary.ingested_chunks, 0);
    }
}
