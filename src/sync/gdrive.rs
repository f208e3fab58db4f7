//! Drive sync worker: bootstrap enumeration plus Changes-API-driven
//! incremental sync with snapshot-based re-index decisions (spec.md
//! §4.4).

use chrono::Utc;

use crate::chunk::{ChunkConfig, PageInput, build_records, render_plain_text};
use crate::error::{ChunkError, SyncError};
use crate::llm::Embedder;
use crate::model::{DriveFileSnapshot, DriveSyncState, OAuthCredential, SourceType, StructuredFormat, SyncFailure, SyncRunSummary, WorkspaceContext};
use crate::providers::{DriveApi, DriveChangeKind, DriveFileMeta, extract_docx};
use crate::retrieval::RetrievalIndex;
use crate::sync::credential::TokenProvider;
use crate::sync::lock::KeyedLockRegistry;

/// Bound on ancestor-chain walks so a malformed or cyclic parents graph
/// can't spin forever (spec.md §4.4 reachability check).
const MAX_ANCESTOR_DEPTH: usize = 32;

const SUPPORTED_BINARY_MIME: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

fn is_supported(mime_type: &str) -> bool {
    mime_type.starts_with("application/vnd.google-apps") || SUPPORTED_BINARY_MIME.contains(&mime_type)
}

fn is_office_docx(mime_type: &str) -> bool {
    mime_type == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
}

fn snapshot_of(file: &DriveFileMeta) -> DriveFileSnapshot {
    DriveFileSnapshot {
        file_id: file.id.clone(),
        name: file.name.clone(),
        mime_type: file.mime_type.clone(),
        md5_checksum: file.md5_checksum.clone(),
        version: file.version_number(),
        modified_time: file.modified_time,
        web_view_link: file.web_view_link.clone().unwrap_or_default(),
        last_synced: Utc::now(),
    }
}

/// True when `file`'s content should be re-ingested against the last
/// snapshot, per the binary/google-native/missing-snapshot rules.
fn needs_reindex(file: &DriveFileMeta, snapshot: Option<&DriveFileSnapshot>) -> bool {
    let Some(snapshot) = snapshot else {
        return true;
    };
    if file.is_google_native() {
        (file.version_number(), file.modified_time) != (snapshot.version, snapshot.modified_time)
    } else {
        file.md5_checksum != snapshot.md5_checksum
    }
}

pub struct DriveSyncWorker<'a> {
    pub api: &'a dyn DriveApi,
    pub embedder: &'a dyn Embedder,
    pub chunk_config: ChunkConfig,
    replace_locks: KeyedLockRegistry,
}

impl<'a> DriveSyncWorker<'a> {
    pub fn new(api: &'a dyn DriveApi, embedder: &'a dyn Embedder, chunk_config: ChunkConfig) -> Self {
        Self {
            api,
            embedder,
            chunk_config,
            replace_locks: KeyedLockRegistry::new(),
        }
    }

    /// Enumerate the full subtree under `root_folder_id`, one folder at a
    /// time, so a file nested several folders below the workspace root is
    /// still in-scope (spec.md §4.4: reachability is ancestor-chain, not
    /// direct-parent).
    pub async fn bootstrap(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        token_provider: &TokenProvider,
        root_folder_id: &str,
        state: &mut DriveSyncState,
    ) -> Result<SyncRunSummary, SyncError> {
        let mut index = RetrievalIndex::open(&ctx.storage_root)?;
        let mut summary = SyncRunSummary::default();
        let mut folder_queue: std::collections::VecDeque<String> = std::collections::VecDeque::new();
        let mut visited_folders = std::collections::HashSet::new();
        folder_queue.push_back(root_folder_id.to_string());

        while let Some(folder_id) = folder_queue.pop_front() {
            if !visited_folders.insert(folder_id.clone()) {
                continue;
            }
            let mut page_token: Option<String> = None;
            loop {
                let fresh = token_provider.fresh(credential).await?;
                let page = self.api.list_files(&fresh.access_token, &folder_id, page_token.clone()).await?;

                for file in &page.files {
                    if file.trashed {
                        continue;
                    }
                    if file.is_folder() {
                        folder_queue.push_back(file.id.clone());
                        continue;
                    }
                    self.ingest_one(&fresh, file, ctx, &mut index, state, &mut summary).await;
                }

                match page.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }
        }

        let fresh = token_provider.fresh(credential).await?;
        let start_token = self.api.get_start_page_token(&fresh.access_token).await?;
        state.start_page_token = Some(start_token);
        state.bootstrapped_at = Some(Utc::now());
        state.last_synced = Some(Utc::now());
        Ok(summary)
    }

    pub async fn incremental(
        &self,
        ctx: &WorkspaceContext,
        credential: &OAuthCredential,
        token_provider: &TokenProvider,
        root_folder_id: &str,
        state: &mut DriveSyncState,
    ) -> Result<SyncRunSummary, SyncError> {
        let mut index = RetrievalIndex::open(&ctx.storage_root)?;
        let mut summary = SyncRunSummary::default();
        // No network call was attempted here: the precondition fails locally,
        // so `attempts: 0` (unlike the hardcoded HTTP-failure `1`s below) is
        // the accurate count rather than a stand-in.
        let mut cursor = state.start_page_token.clone().ok_or_else(|| SyncError::ProviderUnavailable {
            attempts: 0,
            reason: "drive incremental sync requires a prior bootstrap".to_string(),
        })?;
        let mut new_start_token: Option<String> = None;

        loop {
            let fresh = token_provider.fresh(credential).await?;
            let changes = self.api.list_changes(&fresh.access_token, &cursor).await?;

            for change in &changes.changes {
                match change.kind {
                    DriveChangeKind::Removed | DriveChangeKind::Trashed => {
                        index.delete_by_source(SourceType::Gdrive, &change.file_id)?;
                        state.snapshots.remove(&change.file_id);
                        summary.removed.push(change.file_id.clone());
                    }
                    DriveChangeKind::Added | DriveChangeKind::Modified => {
                        let Some(file) = &change.file else { continue };
                        if !self.is_reachable(&fresh, file, root_folder_id).await? {
                            index.delete_by_source(SourceType::Gdrive, &file.id)?;
                            if state.snapshots.remove(&file.id).is_some() {
                                summary.removed.push(file.id.clone());
                            }
                            continue;
                        }
                        if !needs_reindex(file, state.snapshots.get(&file.id)) {
                            if let Some(snapshot) = state.snapshots.get_mut(&file.id) {
                                snapshot.name = file.name.clone();
                                snapshot.web_view_link = file.web_view_link.clone().unwrap_or_default();
                                snapshot.last_synced = Utc::now();
                            }
                            continue;
                        }
                        self.ingest_one(&fresh, file, ctx, &mut index, state, &mut summary).await;
                    }
                }
            }

            if let Some(ref t) = changes.new_start_page_token {
                new_start_token = Some(t.clone());
            }
            match changes.next_page_token {
                Some(next) => cursor = next,
                None => break,
            }
        }

        state.start_page_token = new_start_token.or(Some(cursor));
        state.last_synced = Some(Utc::now());
        Ok(summary)
    }

    /// Walk `file`'s ancestor chain (BFS over `parents`, following each
    /// folder's own parents in turn) to decide whether the workspace root
    /// is a transitive ancestor, not merely a direct parent (spec.md
    /// §4.4).
    async fn is_reachable(
        &self,
        credential: &OAuthCredential,
        file: &DriveFileMeta,
        root_folder_id: &str,
    ) -> Result<bool, SyncError> {
        let mut frontier = file.parents.clone();
        let mut visited = std::collections::HashSet::new();

        for _ in 0..MAX_ANCESTOR_DEPTH {
            if frontier.iter().any(|p| p == root_folder_id) {
                return Ok(true);
            }
            let mut next_frontier = Vec::new();
            for folder_id in frontier {
                if !visited.insert(folder_id.clone()) {
                    continue;
                }
                let parents = self.api.get_file_parents(&credential.access_token, &folder_id).await?;
                next_frontier.extend(parents);
            }
            if next_frontier.is_empty() {
                return Ok(false);
            }
            frontier = next_frontier;
        }
        Ok(false)
    }

    async fn ingest_one(
        &self,
        credential: &OAuthCredential,
        file: &DriveFileMeta,
        ctx: &WorkspaceContext,
        index: &mut RetrievalIndex,
        state: &mut DriveSyncState,
        summary: &mut SyncRunSummary,
    ) {
        match self.ingest_file(credential, file, ctx, index).await {
            Ok(n) => {
                summary.ingested_chunks += n;
                state.snapshots.insert(file.id.clone(), snapshot_of(file));
            }
            Err(SyncError::Chunk(ChunkError::EmptyPage { source_id })) => summary.skipped.push(source_id),
            Err(SyncError::Chunk(ChunkError::UnsupportedMime { .. })) => summary.skipped.push(file.id.clone()),
            Err(e) => summary.failures.push(SyncFailure {
                source_id: file.id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn ingest_file(
        &self,
        credential: &OAuthCredential,
        file: &DriveFileMeta,
        ctx: &WorkspaceContext,
        index: &mut RetrievalIndex,
    ) -> Result<usize, SyncError> {
        if !is_supported(&file.mime_type) {
            return Err(ChunkError::UnsupportedMime {
                mime_type: file.mime_type.clone(),
            }
            .into());
        }

        let pdf_bytes = self.api.export_pdf(&credential.access_token, file).await?;
        let text = pdf_extract::extract_text_from_mem(&pdf_bytes).map_err(|e| ChunkError::MalformedPayload {
            source_id: file.id.clone(),
            reason: e.to_string(),
        })?;
        let blocks = render_plain_text(&text);

        let (structured_format, structured_text) = if is_office_docx(&file.mime_type) {
            match self.api.download_raw(&credential.access_token, file).await {
                Ok(raw) => match extract_docx(&raw, &file.id) {
                    Ok(extracted) => (StructuredFormat::Openxml, Some(extracted.document_xml)),
                    Err(_) => (StructuredFormat::None, None),
                },
                Err(_) => (StructuredFormat::None, None),
            }
        } else {
            (StructuredFormat::None, None)
        };

        std::fs::create_dir_all(ctx.drive_pdf_dir())?;
        let pdf_path = ctx.drive_pdf_dir().join(format!("{}.pdf", file.id));
        std::fs::write(&pdf_path, &pdf_bytes)?;

        let page_input = PageInput {
            source_type: SourceType::Gdrive,
            source_id: &file.id,
            title: &file.name,
            url: file.web_view_link.as_deref().unwrap_or(""),
            workspace_id: &ctx.workspace_id,
            blocks,
            structured_format,
            structured_text,
            file_path: Some(pdf_path),
        };
        let records = build_records(page_input, &self.chunk_config)?;
        let ingested = records.len();
        let _guard = self.replace_locks.acquire(&format!("gdrive:{}", file.id)).await;
        index.replace(self.embedder, SourceType::Gdrive, &file.id, records).await?;
        Ok(ingested)
    }

    pub fn disconnect(ctx: &WorkspaceContext) -> Result<(), SyncError> {
        let mut index = RetrievalIndex::open(&ctx.storage_root)?;
        index.delete_by_source_type(SourceType::Gdrive)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockEmbedder;
    use crate::providers::{DriveChange, FakeDriveApi};
    use crate::sync::credential::TokenRefresher;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct NoopRefresher;
    #[async_trait]
    impl TokenRefresher for NoopRefresher {
        async fn refresh(&self, credential: &OAuthCredential) -> Result<OAuthCredential, SyncError> {
            let mut refreshed = credential.clone();
            refreshed.expires_at = Utc::now() + chrono::Duration::hours(1);
            Ok(refreshed)
        }
    }

    fn credential() -> OAuthCredential {
        OAuthCredential {
            provider: SourceType::Gdrive,
            user_id: "u1".to_string(),
            data_source_id: "ds-drive".to_string(),
            access_token: secrecy::SecretString::from("tok".to_string()),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            token_type: "bearer".to_string(),
            provider_payload: serde_json::Value::Null,
        }
    }

    fn file(id: &str, mime: &str, md5: &str, version: &str) -> DriveFileMeta {
        DriveFileMeta {
            id: id.to_string(),
            name: format!("{id}.ext"),
            mime_type: mime.to_string(),
            md5_checksum: Some(md5.to_string()),
            version: Some(version.to_string()),
            modified_time: Utc::now(),
            web_view_link: Some(format!("https://drive.google.com/{id}")),
            parents: vec!["root".to_string()],
            trashed: false,
        }
    }

    #[test]
    fn rename_only_does_not_require_reindex() {
        let f = file("A", "application/pdf", "X", "3");
        let snapshot = snapshot_of(&f);
        let mut renamed = f.clone();
        renamed.name = "A-renamed.pdf".to_string();
        assert!(!needs_reindex(&renamed, Some(&snapshot)));
    }

    #[test]
    fn changed_checksum_requires_reindex() {
        let f = file("A", "application/pdf", "X", "3");
        let snapshot = snapshot_of(&f);
        let mut changed = f.clone();
        changed.md5_checksum = Some("Y".to_string());
        assert!(needs_reindex(&changed, Some(&snapshot)));
    }

    #[test]
    fn missing_snapshot_requires_reindex() {
        let f = file("A", "application/pdf", "X", "3");
        assert!(needs_reindex(&f, None));
    }

    #[tokio::test]
    async fn incremental_delete_removes_snapshot_and_chunks() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let embedder = MockEmbedder::default();

        let mut pdf_bytes = std::collections::HashMap::new();
        pdf_bytes.insert("B".to_string(), Vec::new());
        let api = FakeDriveApi {
            files: vec![],
            pdf_bytes,
            changes: vec![DriveChange {
                file_id: "B".to_string(),
                kind: DriveChangeKind::Trashed,
                file: None,
            }],
            start_page_token: "tok-1".to_string(),
            folder_parents: Default::default(),
        };
        let worker = DriveSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = DriveSyncState {
            start_page_token: Some("tok-0".to_string()),
            ..Default::default()
        };
        state.snapshots.insert("B".to_string(), snapshot_of(&file("B", "application/pdf", "X", "1")));

        let summary = worker
            .incremental(&ctx, &credential(), &token_provider, "root", &mut state)
            .await
            .unwrap();

        assert_eq!(summary.removed, vec!["B".to_string()]);
        assert!(!state.snapshots.contains_key("B"));
    }

    #[tokio::test]
    async fn unsupported_mime_is_skipped_not_failed() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let embedder = MockEmbedder::default();
        let api = FakeDriveApi {
            files: vec![file("C", "application/x-unknown", "X", "1")],
            pdf_bytes: Default::default(),
            changes: vec![],
            start_page_token: "tok-1".to_string(),
            folder_parents: Default::default(),
        };
        let worker = DriveSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = DriveSyncState::default();

        let summary = worker
            .bootstrap(&ctx, &credential(), &token_provider, "root", &mut state)
            .await
            .unwrap();

        assert_eq!(summary.skipped, vec!["C".to_string()]);
        assert!(summary.failures.is_empty());
    }

    /// A folder-aware fake: `list_files` scopes its results to the
    /// requested parent, so bootstrap's BFS is exercised the same way a
    /// real nested Drive tree would drive it.
    struct NestedFoldersApi {
        by_parent: std::collections::HashMap<String, Vec<DriveFileMeta>>,
    }

    #[async_trait]
    impl DriveApi for NestedFoldersApi {
        async fn list_files(
            &self,
            _access_token: &secrecy::SecretString,
            root_folder_id: &str,
            _page_token: Option<String>,
        ) -> Result<crate::providers::DriveFileListPage, SyncError> {
            Ok(crate::providers::DriveFileListPage {
                files: self.by_parent.get(root_folder_id).cloned().unwrap_or_default(),
                next_page_token: None,
            })
        }

        async fn export_pdf(
            &self,
            _access_token: &secrecy::SecretString,
            _file: &DriveFileMeta,
        ) -> Result<Vec<u8>, SyncError> {
            Ok(Vec::new())
        }

        async fn download_raw(
            &self,
            _access_token: &secrecy::SecretString,
            _file: &DriveFileMeta,
        ) -> Result<Vec<u8>, SyncError> {
            Ok(Vec::new())
        }

        async fn get_start_page_token(&self, _access_token: &secrecy::SecretString) -> Result<String, SyncError> {
            Ok("start".to_string())
        }

        async fn list_changes(
            &self,
            _access_token: &secrecy::SecretString,
            _page_token: &str,
        ) -> Result<crate::providers::DriveChangesPage, SyncError> {
            Ok(crate::providers::DriveChangesPage {
                changes: vec![],
                new_start_page_token: None,
                next_page_token: None,
            })
        }

        async fn get_file_parents(
            &self,
            _access_token: &secrecy::SecretString,
            _file_id: &str,
        ) -> Result<Vec<String>, SyncError> {
            Ok(Vec::new())
        }
    }

    fn folder(id: &str) -> DriveFileMeta {
        DriveFileMeta {
            id: id.to_string(),
            name: id.to_string(),
            mime_type: "application/vnd.google-apps.folder".to_string(),
            md5_checksum: None,
            version: None,
            modified_time: Utc::now(),
            web_view_link: None,
            parents: vec![],
            trashed: false,
        }
    }

    #[tokio::test]
    async fn bootstrap_recurses_into_nested_folders() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let embedder = MockEmbedder::default();

        let mut by_parent = std::collections::HashMap::new();
        by_parent.insert("root".to_string(), vec![folder("sub")]);
        by_parent.insert(
            "sub".to_string(),
            vec![file("nested-doc", "application/pdf", "X", "1")],
        );
        let api = NestedFoldersApi { by_parent };
        let worker = DriveSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = DriveSyncState::default();

        let summary = worker
            .bootstrap(&ctx, &credential(), &token_provider, "root", &mut state)
            .await
            .unwrap();

        // The fixture's empty PDF bytes fail text extraction downstream,
        // so the file lands in `failures` rather than `ingested_chunks` —
        // what this proves is that bootstrap's folder BFS reached a file
        // one level below a subfolder of root, not just root's direct
        // children.
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].source_id, "nested-doc");
    }

    #[tokio::test]
    async fn incremental_reaches_file_two_folders_below_root() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let embedder = MockEmbedder::default();

        let mut nested = file("D", "application/pdf", "X", "1");
        nested.parents = vec!["sub2".to_string()];
        let mut folder_parents = std::collections::HashMap::new();
        folder_parents.insert("sub2".to_string(), vec!["sub1".to_string()]);
        folder_parents.insert("sub1".to_string(), vec!["root".to_string()]);

        let api = FakeDriveApi {
            files: vec![],
            pdf_bytes: std::collections::HashMap::from([("D".to_string(), Vec::new())]),
            changes: vec![DriveChange {
                file_id: "D".to_string(),
                kind: DriveChangeKind::Modified,
                file: Some(nested),
            }],
            start_page_token: "tok-0".to_string(),
            folder_parents,
        };
        let worker = DriveSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = DriveSyncState {
            start_page_token: Some("tok-0".to_string()),
            ..Default::default()
        };

        let summary = worker
            .incremental(&ctx, &credential(), &token_provider, "root", &mut state)
            .await
            .unwrap();

        // The fake's empty PDF bytes fail extraction downstream, so this
        // lands in `failures` rather than `ingested_chunks` — what matters
        // here is that the file reached the ingest attempt at all (an
        // out-of-scope file never does, see the test below), proving the
        // ancestor chain walk recognized "root" as a transitive parent.
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].source_id, "D");
    }

    #[tokio::test]
    async fn incremental_drops_file_outside_root_subtree() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(dir.path(), "w1", "team");
        let embedder = MockEmbedder::default();

        let mut elsewhere = file("E", "application/pdf", "X", "1");
        elsewhere.parents = vec!["other-folder".to_string()];

        let api = FakeDriveApi {
            files: vec![],
            pdf_bytes: Default::default(),
            changes: vec![DriveChange {
                file_id: "E".to_string(),
                kind: DriveChangeKind::Modified,
                file: Some(elsewhere),
            }],
            start_page_token: "tok-0".to_string(),
            folder_parents: Default::default(),
        };
        let worker = DriveSyncWorker::new(&api, &embedder, ChunkConfig::default());
        let token_provider = TokenProvider::new(Arc::new(NoopRefresher));
        let mut state = DriveSyncState {
            start_page_token: Some("tok-0".to_string()),
            ..Default::default()
        };

        let summary = worker
            .incremental(&ctx, &credential(), &token_provider, "root", &mut state)
            .await
            .unwrap();

        assert_eq!(summary.ingested_chunks, 0);
        assert!(summary.failures.is_empty());
        assert!(!state.snapshots.contains_key("E"));
    }
}
