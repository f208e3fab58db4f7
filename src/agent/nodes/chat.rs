//! Short conversational reply with no retrieval involved (spec.md §4.5).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::model::SearchResultOutcome;

const SYSTEM_PROMPT: &str =
    "You are a concise workspace assistant. Reply briefly and conversationally; do not fabricate facts about the workspace's documents.";

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(state.query.clone()),
    ])
    .with_max_tokens(256)
    .with_temperature(0.7);

    let response = ctx.planning_llm.complete(request).await?;

    state.result = Some(SearchResultOutcome {
        answer: response.content,
        citations: Vec::new(),
        top_url: None,
    });
    Ok(())
}
