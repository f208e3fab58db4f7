//! Notion API client: search, recursive block-children retrieval, and
//! page creation. Grounded on the teacher's `McpClient` idiom — a
//! `reqwest::Client` built once with a timeout, JSON request/response
//! structs, and a thin error mapping — generalized from MCP's JSON-RPC
//! envelope to Notion's plain REST responses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::chunk::NotionBlockNode;
use crate::error::SyncError;
use crate::model::NotionPageRef;
use crate::providers::retry::with_retry;

const NOTION_VERSION: &str = "2022-06-28";

/// One page surfaced by `search_pages`, enough to drive enumeration and
/// the incremental `since` filter.
#[derive(Debug, Clone)]
pub struct NotionPageSummary {
    pub id: String,
    pub url: String,
    pub title: String,
    pub last_edited_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NotionSearchPage {
    pub pages: Vec<NotionPageSummary>,
    pub next_cursor: Option<String>,
}

/// A block to append when publishing a generated document, already
/// shaped as the Notion API's block JSON object.
pub type NotionBlockPayload = serde_json::Value;

/// The surface the sync worker and `create_page` node depend on.
#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn search_pages(
        &self,
        access_token: &SecretString,
        cursor: Option<String>,
    ) -> Result<NotionSearchPage, SyncError>;

    async fn retrieve_block_children(
        &self,
        access_token: &SecretString,
        block_id: &str,
    ) -> Result<Vec<NotionBlockNode>, SyncError>;

    async fn create_page(
        &self,
        access_token: &SecretString,
        parent_page_id: &str,
        title: &str,
        blocks: Vec<NotionBlockPayload>,
    ) -> Result<NotionPageRef, SyncError>;
}

pub struct HttpNotionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotionApi {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build Notion http client"),
            base_url: "https://api.notion.com/v1".to_string(),
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder, token: &SecretString) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(token.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
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
}

#[derive(Serialize)]
struct SearchBody {
    filter: SearchFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<String>,
    page_size: u32,
}

#[derive(Serialize)]
struct SearchFilter {
    value: &'static str,
    property: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<PageWire>,
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct PageWire {
    id: String,
    url: String,
    last_edited_time: DateTime<Utc>,
    #[serde(default)]
    properties: serde_json::Value,
}

fn extract_title(properties: &serde_json::Value) -> String {
    if let Some(obj) = properties.as_object() {
        for prop in obj.values() {
            if prop.get("type").and_then(|t| t.as_str()) == Some("title") {
                if let Some(rich_text) = prop.get("title").and_then(|t| t.as_array()) {
                    let joined: String = rich_text
                        .iter()
                        .filter_map(|rt| rt.get("plain_text").and_then(|p| p.as_str()))
                        .collect();
                    if !joined.is_empty() {
                        return joined;
                    }
                }
            }
        }
    }
    "Untitled".to_string()
}

#[derive(Deserialize)]
struct BlockChildrenResponse {
    results: Vec<BlockWire>,
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct BlockWire {
    id: String,
    #[serde(rename = "type")]
    block_type: String,
    has_children: bool,
    #[serde(flatten)]
    rest: std::collections::HashMap<String, serde_json::Value>,
}

fn block_plain_text(block_type: &str, rest: &std::collections::HashMap<String, serde_json::Value>) -> String {
    let payload = match rest.get(block_type) {
        Some(v) => v,
        None => return String::new(),
    };
    if block_type == "child_page" {
        return payload
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
    }
    payload
        .get("rich_text")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|rt| rt.get("plain_text").and_then(|p| p.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl NotionApi for HttpNotionApi {
    async fn search_pages(
        &self,
        access_token: &SecretString,
        cursor: Option<String>,
    ) -> Result<NotionSearchPage, SyncError> {
        with_retry(|| async {
            let body = SearchBody {
                filter: SearchFilter {
                    value: "page",
                    property: "object",
                },
                start_cursor: cursor.clone(),
                page_size: 100,
            };

            let req = self.auth(self.client.post(format!("{}/search", self.base_url)), access_token);
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
                    reason: format!("notion search returned {}", resp.status()),
                });
            }

            let parsed: SearchResponse = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;

            Ok(NotionSearchPage {
                pages: parsed
                    .results
                    .into_iter()
                    .map(|p| NotionPageSummary {
                        title: extract_title(&p.properties),
                        id: p.id,
                        url: p.url,
                        last_edited_time: p.last_edited_time,
                    })
                    .collect(),
                next_cursor: if parsed.has_more { parsed.next_cursor } else { None },
            })
        })
        .await
    }

    async fn retrieve_block_children(
        &self,
        access_token: &SecretString,
        block_id: &str,
    ) -> Result<Vec<NotionBlockNode>, SyncError> {
        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let parsed: BlockChildrenResponse = with_retry(|| async {
                let mut req = self
                    .client
                    .get(format!("{}/blocks/{}/children", self.base_url, block_id));
                if let Some(ref c) = cursor {
                    req = req.query(&[("start_cursor", c.as_str())]);
                }
                req = req.query(&[("page_size", "100")]);
                let resp = self.auth(req, access_token).send().await.map_err(|e| SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: e.to_string(),
                })?;

                if let Some(err) = Self::check_rate_limit(&resp).await {
                    return Err(err);
                }
                if !resp.status().is_success() {
                    return Err(SyncError::ProviderUnavailable {
                        attempts: 1,
                        reason: format!("notion block children returned {}", resp.status()),
                    });
                }

                resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                    attempts: 1,
                    reason: e.to_string(),
                })
            })
            .await?;

            for block in parsed.results {
                let text = block_plain_text(&block.block_type, &block.rest);
                let children = if block.has_children && block.block_type != "child_page" {
                    Box::pin(self.retrieve_block_children(access_token, &block.id)).await?
                } else {
                    Vec::new()
                };
                nodes.push(NotionBlockNode {
                    block_type: block.block_type,
                    text,
                    children,
                });
            }

            if !parsed.has_more {
                break;
            }
            cursor = parsed.next_cursor;
        }

        Ok(nodes)
    }

    async fn create_page(
        &self,
        access_token: &SecretString,
        parent_page_id: &str,
        title: &str,
        blocks: Vec<NotionBlockPayload>,
    ) -> Result<NotionPageRef, SyncError> {
        with_retry(|| async {
            let body = serde_json::json!({
                "parent": { "page_id": parent_page_id },
                "properties": {
                    "title": { "title": [{ "text": { "content": title } }] }
                },
                "children": blocks.clone(),
            });

            let req = self.auth(self.client.post(format!("{}/pages", self.base_url)), access_token);
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
                    reason: format!("notion create page returned {}", resp.status()),
                });
            }

            let parsed: PageWire = resp.json().await.map_err(|e| SyncError::ProviderUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
            Ok(NotionPageRef {
                id: parsed.id,
                url: parsed.url,
            })
        })
        .await
    }
}

/// In-memory fake for sync-worker tests: a caller-seeded page list plus
/// a flat block map, no HTTP involved.
#[derive(Default)]
pub struct FakeNotionApi {
    pub pages: Vec<NotionPageSummary>,
    pub blocks: std::collections::HashMap<String, Vec<NotionBlockNode>>,
    pub created_pages: std::sync::Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotionApi for FakeNotionApi {
    async fn search_pages(
        &self,
        _access_token: &SecretString,
        _cursor: Option<String>,
    ) -> Result<NotionSearchPage, SyncError> {
        Ok(NotionSearchPage {
            pages: self.pages.clone(),
            next_cursor: None,
        })
    }

    async fn retrieve_block_children(
        &self,
        _access_token: &SecretString,
        block_id: &str,
    ) -> Result<Vec<NotionBlockNode>, SyncError> {
        Ok(self.blocks.get(block_id).cloned().unwrap_or_default())
    }

    async fn create_page(
        &self,
        _access_token: &SecretString,
        parent_page_id: &str,
        title: &str,
        _blocks: Vec<NotionBlockPayload>,
    ) -> Result<NotionPageRef, SyncError> {
        self.created_pages
            .lock()
            .unwrap()
            .push((parent_page_id.to_string(), title.to_string()));
        Ok(NotionPageRef {
            id: format!("fake-page-{}", title),
            url: format!("https://notion.so/fake-page-{}", title),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_property() {
        let props = serde_json::json!({
            "Name": { "type": "title", "title": [{ "plain_text": "Q3 Review" }] }
        });
        assert_eq!(extract_title(&props), "Q3 Review");
    }

    #[test]
    fn falls_back_to_untitled() {
        let props = serde_json::json!({});
        assert_eq!(extract_title(&props), "Untitled");
    }
}
