//! Google Drive API client: enumeration, export-to-PDF (direct for
//! Google-native files, server-side copy-then-export for Office files),
//! and the incremental Changes API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::providers::retry::with_retry;

const GOOGLE_NATIVE_PREFIX: &str = "application/vnd.google-apps";
const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const EXPORT_PDF_MIME: &str = "application/pdf";

/// Metadata for one Drive file, enough to drive the re-index decision
/// in spec.md §4.4.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFileMeta {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "md5Checksum", default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    #[serde(rename = "webViewLink", default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFileMeta {
    pub fn is_google_native(&self) -> bool {
        self.mime_type.starts_with(GOOGLE_NATIVE_PREFIX)
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == GOOGLE_FOLDER_MIME
    }

    pub fn version_number(&self) -> Option<i64> {
        self.version.as_ref().and_then(|v| v.parse().ok())
    }
}

pub struct DriveFileListPage {
    pub files: Vec<DriveFileMeta>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DriveChangeKind {
    Added,
    Modified,
    Removed,
    Trashed,
}

#[derive(Debug, Clone)]
pub struct DriveChange {
    pub file_id: String,
    pub kind: DriveChangeKind,
    pub file: Option<DriveFileMeta>,
}

pub struct DriveChangesPage {
    pub changes: Vec<DriveChange>,
    pub new_start_page_token: Option<String>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn list_files(
        &self,
        access_token: &SecretString,
        root_folder_id: &str,
        page_token: Option<String>,
    ) -> Result<DriveFileListPage, SyncError>;

    async fn export_pdf(&self, access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError>;

    async fn download_raw(&self, access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError>;

    async fn get_start_page_token(&self, access_token: &SecretString) -> Result<String, SyncError>;

    async fn list_changes(
        &self,
        access_token: &SecretString,
        page_token: &str,
    ) -> Result<DriveChangesPage, SyncError>;

    /// Direct parent folder ids of `file_id`, used to walk an ancestor
    /// chain up from a file the Changes API reported (spec.md §4.4).
    async fn get_file_parents(&self, access_token: &SecretString, file_id: &str) -> Result<Vec<String>, SyncError>;
}

pub struct HttpDriveApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDriveApi {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build Drive http client"),
            base_url: "https://www.googleapis.com/drive/v3".to_string(),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder, token: &SecretString) -> reqwest::RequestBuilder {
        builder.bearer_auth(token.expose_secret())
    }

    async fn check_rate_limit(resp: &reqwest::Response) -> Option<SyncError> {
        if resp.status().as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30);
            return Some(SyncError::RateLimited { retry_after_secs });
        }
        None
    }

    async fn copy_to_google_native(
        &self,
        access_token: &SecretString,
        file: &DriveFileMeta,
        target_mime: &str,
    ) -> Result<String, SyncError> {
        with_retry(|| async {
            let body = serde_json::json!({ "name": format!("{}-export-copy", file.name), "mimeType": target_mime });
            let req = self.auth(
                self.client.post(format!("{}/files/{}/copy", self.base_url, file.id)),
                access_token,
            );
            let resp = req.json(&body).send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            if !resp.status().is_success() {
                return Err(SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: format!("drive copy returned {}", resp.status()),
                });
            }
            #[derive(Deserialize)]
            struct CopyResponse {
                id: String,
            }
            let parsed: CopyResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            Ok(parsed.id)
        })
        .await
    }

    async fn export_by_id(&self, access_token: &SecretString, file_id: &str) -> Result<Vec<u8>, SyncError> {
        with_retry(|| async {
            let req = self.auth(
                self.client
                    .get(format!("{}/files/{}/export", self.base_url, file_id))
                    .query(&[("mimeType", EXPORT_PDF_MIME)]),
                access_token,
            );
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            if !resp.status().is_success() {
                return Err(SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: format!("drive export returned {}", resp.status()),
                });
            }
            resp.bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn delete_file(&self, access_token: &SecretString, file_id: &str) {
        let _ = self
            .auth(self.client.delete(format!("{}/files/{}", self.base_url, file_id)), access_token)
            .send()
            .await;
    }
}

#[derive(Serialize)]
struct ListQuery<'a> {
    q: String,
    #[serde(rename = "pageToken", skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
    fields: &'static str,
    #[serde(rename = "pageSize")]
    page_size: u32,
}

#[derive(Deserialize)]
struct FileListResponse {
    files: Vec<DriveFileMeta>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn list_files(
        &self,
        access_token: &SecretString,
        root_folder_id: &str,
        page_token: Option<String>,
    ) -> Result<DriveFileListPage, SyncError> {
        with_retry(|| async {
            let query = ListQuery {
                q: format!("'{}' in parents and trashed = false", root_folder_id),
                page_token: page_token.as_deref(),
                fields: "nextPageToken, files(id, name, mimeType, md5Checksum, version, modifiedTime, webViewLink, parents, trashed)",
                page_size: 200,
            };
            let req = self.auth(self.client.get(format!("{}/files", self.base_url)).query(&query), access_token);
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            if !resp.status().is_success() {
                return Err(SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: format!("drive list returned {}", resp.status()),
                });
            }
            let parsed: FileListResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            Ok(DriveFileListPage {
                files: parsed.files,
                next_page_token: parsed.next_page_token,
            })
        })
        .await
    }

    async fn export_pdf(&self, access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError> {
        if file.is_google_native() {
            self.export_by_id(access_token, &file.id).await
        } else {
            let copy_id = self
                .copy_to_google_native(access_token, file, "application/vnd.google-apps.document")
                .await?;
            let bytes = self.export_by_id(access_token, &copy_id).await;
            self.delete_file(access_token, &copy_id).await;
            bytes
        }
    }

    async fn download_raw(&self, access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError> {
        with_retry(|| async {
            let req = self.auth(
                self.client
                    .get(format!("{}/files/{}", self.base_url, file.id))
                    .query(&[("alt", "media")]),
                access_token,
            );
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            resp.bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: e.to_string(),
                })
        })
        .await
    }

    async fn get_start_page_token(&self, access_token: &SecretString) -> Result<String, SyncError> {
        with_retry(|| async {
            let req = self.auth(
                self.client.get(format!("{}/changes/startPageToken", self.base_url)),
                access_token,
            );
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            #[derive(Deserialize)]
            struct TokenResponse {
                #[serde(rename = "startPageToken")]
                start_page_token: String,
            }
            let parsed: TokenResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            Ok(parsed.start_page_token)
        })
        .await
    }

    async fn list_changes(
        &self,
        access_token: &SecretString,
        page_token: &str,
    ) -> Result<DriveChangesPage, SyncError> {
        with_retry(|| async {
            let req = self.auth(
                self.client
                    .get(format!("{}/changes", self.base_url))
                    .query(&[("pageToken", page_token), ("includeRemoved", "true")])
                    .query(&[(
                        "fields",
                        "nextPageToken,newStartPageToken,changes(fileId,removed,file(id,name,mimeType,md5Checksum,version,modifiedTime,webViewLink,parents,trashed))",
                    )]),
                access_token,
            );
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            #[derive(Deserialize)]
            struct ChangeWire {
                #[serde(rename = "fileId")]
                file_id: String,
                #[serde(default)]
                removed: bool,
                file: Option<DriveFileMeta>,
            }
            #[derive(Deserialize)]
            struct ChangesResponse {
                changes: Vec<ChangeWire>,
                #[serde(rename = "nextPageToken")]
                next_page_token: Option<String>,
                #[serde(rename = "newStartPageToken")]
                new_start_page_token: Option<String>,
            }
            let parsed: ChangesResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;

            let changes = parsed
                .changes
                .into_iter()
                .map(|c| {
                    let kind = if c.removed {
                        DriveChangeKind::Removed
                    } else if c.file.as_ref().map(|f| f.trashed).unwrap_or(false) {
                        DriveChangeKind::Trashed
                    } else {
                        DriveChangeKind::Modified
                    };
                    DriveChange {
                        file_id: c.file_id,
                        kind,
                        file: c.file,
                    }
                })
                .collect();

            Ok(DriveChangesPage {
                changes,
                new_start_page_token: parsed.new_start_page_token,
                next_page_token: parsed.next_page_token,
            })
        })
        .await
    }

    async fn get_file_parents(&self, access_token: &SecretString, file_id: &str) -> Result<Vec<String>, SyncError> {
        with_retry(|| async {
            #[derive(Serialize)]
            struct ParentsQuery<'a> {
                fields: &'a str,
            }
            let req = self.auth(
                self.client.get(format!("{}/files/{}", self.base_url, file_id)).query(&ParentsQuery {
                    fields: "parents",
                }),
                access_token,
            );
            let resp = req.send().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            if let Some(err) = Self::check_rate_limit(&resp).await {
                return Err(err);
            }
            if resp.status().as_u16() == 404 {
                return Ok(Vec::new());
            }
            if !resp.status().is_success() {
                return Err(SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: format!("drive file parents lookup returned {}", resp.status()),
                });
            }
            #[derive(Deserialize)]
            struct ParentsResponse {
                #[serde(default)]
                parents: Vec<String>,
            }
            let parsed: ParentsResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            Ok(parsed.parents)
        })
        .await
    }
}

/// In-memory fake for sync-worker tests.
#[derive(Default)]
pub struct FakeDriveApi {
    pub files: Vec<DriveFileMeta>,
    pub pdf_bytes: std::collections::HashMap<String, Vec<u8>>,
    pub changes: Vec<DriveChange>,
    pub start_page_token: String,
    /// Ancestor-chain fixture: folder id -> its own parent ids, so tests
    /// can script nested folder trees for reachability checks.
    pub folder_parents: std::collections::HashMap<String, Vec<String>>,
}

#[async_trait]
impl DriveApi for FakeDriveApi {
    async fn list_files(
        &self,
        _access_token: &SecretString,
        _root_folder_id: &str,
        _page_token: Option<String>,
    ) -> Result<DriveFileListPage, SyncError> {
        Ok(DriveFileListPage {
            files: self.files.clone(),
            next_page_token: None,
        })
    }

    async fn export_pdf(&self, _access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError> {
        Ok(self.pdf_bytes.get(&file.id).cloned().unwrap_or_default())
    }

    async fn download_raw(&self, _access_token: &SecretString, file: &DriveFileMeta) -> Result<Vec<u8>, SyncError> {
        Ok(self.pdf_bytes.get(&file.id).cloned().unwrap_or_default())
    }

    async fn get_start_page_token(&self, _access_token: &SecretString) -> Result<String, SyncError> {
        Ok(self.start_page_token.clone())
    }

    async fn list_changes(
        &self,
        _access_token: &SecretString,
        _page_token: &str,
    ) -> Result<DriveChangesPage, SyncError> {
        Ok(DriveChangesPage {
            changes: self.changes.clone(),
            new_start_page_token: Some(format!("{}-next", self.start_page_token)),
            next_page_token: None,
        })
    }

    async fn get_file_parents(&self, _access_token: &SecretString, file_id: &str) -> Result<Vec<String>, SyncError> {
        Ok(self.folder_parents.get(file_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_native_detected_by_mime_prefix() {
        let file = DriveFileMeta {
            id: "f1".to_string(),
            name: "Doc".to_string(),
            mime_type: "application/vnd.google-apps.document".to_string(),
            md5_checksum: None,
            version: Some("3".to_string()),
            modified_time: Utc::now(),
            web_view_link: None,
            parents: vec![],
            trashed: false,
        };
        assert!(file.is_google_native());
        assert_eq!(file.version_number(), Some(3));
    }
}
