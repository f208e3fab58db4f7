//! The mutable record passed through the orchestration graph.
//!
//! Grounded on spec.md §3's Agent State; `db_handle` has no counterpart
//! in this filesystem-backed core (see DESIGN.md) and is dropped,
//! `storage_uri` is derived from `workspace` instead of duplicated.

use crate::model::{AgentMode, Decision, NotionPageRef, ScoredRecord, SearchResultOutcome, WorkspaceContext};

/// Created per request, mutated only by node execution, discarded on
/// completion. Never shared across requests.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query: String,
    pub workspace: WorkspaceContext,
    pub user_id: String,
    pub final_message_instructions: Option<String>,

    pub decision: Option<Decision>,
    pub retrieval: Option<Vec<ScoredRecord>>,
    pub result: Option<SearchResultOutcome>,
    pub generated_document: Option<String>,
    pub mode: Option<AgentMode>,
    pub notion_page: Option<NotionPageRef>,
}

impl AgentState {
    pub fn new(query: impl Into<String>, workspace: WorkspaceContext, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            workspace,
            user_id: user_id.into(),
            final_message_instructions: None,
            decision: None,
            retrieval: None,
            result: None,
            generated_document: None,
            mode: None,
            notion_page: None,
        }
    }

    pub fn with_final_message_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.final_message_instructions = Some(instructions.into());
        self
    }
}
