//! Shared context injected into every node: the two independently
//! configured LLM deployments (planning/generation vs. `final_answer`),
//! the embedder, the Notion publishing surface, and per-request
//! cancellation (spec.md §4.5, §5).

use crate::config::ArcanaConfig;
use crate::llm::{Embedder, LlmProvider};
use crate::model::OAuthCredential;
use crate::providers::NotionApi;

pub struct NodeContext<'a> {
    pub planning_llm: &'a dyn LlmProvider,
    pub final_answer_llm: &'a dyn LlmProvider,
    pub embedder: &'a dyn Embedder,
    pub notion_api: &'a dyn NotionApi,
    pub notion_credential: Option<&'a OAuthCredential>,
    pub notion_parent_page_id: Option<&'a str>,
    pub config: &'a ArcanaConfig,
    pub cancellation: tokio_util::sync::CancellationToken,
}
