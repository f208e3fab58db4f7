//! Pure question-answering over the workspace's existing documents:
//! hybrid retrieval, context assembly, and a grounded LLM answer. No
//! page is created (spec.md §4.5).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::model::SearchResultOutcome;
use crate::retrieval::{RetrievalIndex, SearchParams, SearchStrategy, build_context};

const SYSTEM_PROMPT: &str = "Answer the user's question using ONLY the numbered context blocks below. \
Cite sources inline as [1], [2], etc. If the context does not contain the answer, say so plainly.";

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let index = RetrievalIndex::open(&state.workspace.storage_root)?;
    let params = SearchParams::clamped(
        ctx.config.top_k,
        ctx.config.hybrid_alpha,
        ctx.config.hybrid_rrf_k,
        SearchStrategy::Hybrid,
    );
    let hits = index.search(ctx.embedder, &state.query, params).await?;

    let top_url = hits.first().map(|h| h.record.url.clone());
    let citations: Vec<String> = hits.iter().map(|h| h.record.id()).collect();
    let context = build_context(&hits, ctx.config.context_char_budget);

    let request = CompletionRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{}\n\nQuestion: {}", context, state.query)),
    ])
    .with_max_tokens(1024)
    .with_temperature(0.2);

    let response = ctx.planning_llm.complete(request).await?;

    state.retrieval = Some(hits);
    state.result = Some(SearchResultOutcome {
        answer: response.content,
        citations,
        top_url,
    });
    Ok(())
}
