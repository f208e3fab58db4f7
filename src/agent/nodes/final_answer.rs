//! Final post-processing pass, run on a deployment independent of the
//! planning/generation one (spec.md §4.5, §6). Unconditionally enforces
//! tone on the draft from search/generate/chat, additionally folding in
//! any `final_message_instructions` the caller or the `decide` node
//! supplied — formatting, audience, length — without re-deriving content.

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest};

const SYSTEM_PROMPT: &str =
    "Lightly polish the draft reply below for tone and clarity. Preserve all facts, citations, and links exactly. \
Do not add new claims.";

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let Some(result) = state.result.as_mut() else {
        return Ok(());
    };

    let instructions = state
        .final_message_instructions
        .clone()
        .or_else(|| state.decision.as_ref().and_then(|d| d.final_message_instructions.clone()));

    let user_message = match &instructions {
        Some(instructions) => format!("Draft reply:\n{}\n\nInstructions: {}", result.answer, instructions),
        None => format!("Draft reply:\n{}", result.answer),
    };

    let request = CompletionRequest::new(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_message)])
        .with_max_tokens(1024)
        .with_temperature(0.3);

    let response = ctx.final_answer_llm.complete(request).await?;
    result.answer = response.content;
    Ok(())
}
