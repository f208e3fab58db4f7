//! Markdown document generation, optionally grounded in retrieved
//! context. Targets a 1,500-2,000 character document; on overflow the
//! request is retried once with a larger token budget and an added
//! "be more concise" instruction before falling back to whatever draft
//! was produced (spec.md §4.5, §7 `LENGTH_EXCEEDED`).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest};
use crate::retrieval::build_context;

const TARGET_MIN_CHARS: usize = 1_500;
const TARGET_MAX_CHARS: usize = 2_000;

fn system_prompt(use_rag: bool) -> String {
    let grounding = if use_rag {
        "Ground the document in the numbered context blocks provided; cite sources inline as [1], [2], etc."
    } else {
        "Write from general knowledge; no source context is provided."
    };
    format!(
        "You draft Markdown documents for a workspace knowledge assistant. {} \
Target a length between {} and {} characters.",
        grounding, TARGET_MIN_CHARS, TARGET_MAX_CHARS
    )
}

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let decision = state.decision.as_ref().ok_or(AgentError::NoDecision)?;
    let instructions = decision.instructions.clone().unwrap_or_else(|| state.query.clone());
    let use_rag = decision.use_rag;

    let context_block = if use_rag {
        state.retrieval.as_ref().map(|hits| build_context(hits, ctx.config.context_char_budget))
    } else {
        None
    };

    let user_turn = match &context_block {
        Some(context) => format!("Context:\n{}\n\nInstructions: {}", context, instructions),
        None => format!("Instructions: {}", instructions),
    };

    let request = CompletionRequest::new(vec![
        ChatMessage::system(system_prompt(use_rag)),
        ChatMessage::user(user_turn.clone()),
    ])
    .with_max_tokens(ctx.config.doc_gen_max_tokens)
    .with_temperature(0.4);

    let response = ctx.planning_llm.complete(request).await?;

    if !response.truncated {
        state.generated_document = Some(response.content);
        return Ok(());
    }

    tracing::warn!(user_id = %state.user_id, "generation exceeded token budget, retrying with a larger one");
    let retry_request = CompletionRequest::new(vec![
        ChatMessage::system(system_prompt(use_rag)),
        ChatMessage::user(format!(
            "{}\n\nThe previous attempt ran out of room; summarize more concisely and stay within the target length.",
            user_turn
        )),
    ])
    .with_max_tokens(ctx.config.doc_gen_max_tokens * 2)
    .with_temperature(0.4);

    let retry_response = ctx.planning_llm.complete(retry_request).await?;

    if retry_response.truncated {
        tracing::warn!(
            user_id = %state.user_id,
            "generation still exceeded the length budget after retry, keeping the partial draft"
        );
    }
    state.generated_document = Some(retry_response.content);
    Ok(())
}
