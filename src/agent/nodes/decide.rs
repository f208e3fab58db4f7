//! Intent classifier. An LLM call with a constrained JSON output
//! contract; on parse failure the router falls back to `chat` rather
//! than attempting free-form parsing (spec.md §4.5, §9).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest, extract_json};
use crate::model::{AgentMode, Decision};

const SYSTEM_PROMPT: &str = "You classify a user's request for a workspace knowledge assistant. \
Respond with ONLY a JSON object: \
{\"mode\": \"search\"|\"generate\"|\"chat\", \"use_rag\": bool, \"instructions\": string|null, \"final_message_instructions\": string|null}. \
Use \"search\" when the user asks a question answerable from existing workspace documents. \
Use \"generate\" when the user asks you to draft, write, or create a new document; set use_rag=true \
if it should be grounded in existing documents, false for a blank template. \
Use \"chat\" for greetings or anything else.";

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let request = CompletionRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(state.query.clone()),
    ])
    .with_max_tokens(256)
    .with_temperature(0.0)
    .with_json_schema(decision_schema());

    let response = ctx.planning_llm.complete(request).await?;

    state.decision = Some(parse_decision(&response.content));
    Ok(())
}

fn decision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "mode": { "enum": ["search", "generate", "chat"] },
            "use_rag": { "type": "boolean" },
            "instructions": { "type": ["string", "null"] },
            "final_message_instructions": { "type": ["string", "null"] },
        },
        "required": ["mode"],
    })
}

fn parse_decision(content: &str) -> Decision {
    extract_json(content)
        .and_then(|json| serde_json::from_str::<Decision>(json).ok())
        .unwrap_or(Decision {
            mode: AgentMode::Chat,
            use_rag: false,
            instructions: None,
            final_message_instructions: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_decision() {
        let decision = parse_decision(r#"{"mode": "search", "use_rag": true}"#);
        assert_eq!(decision.mode, AgentMode::Search);
    }

    #[test]
    fn falls_back_to_chat_on_malformed_output() {
        let decision = parse_decision("not json at all");
        assert_eq!(decision.mode, AgentMode::Chat);
    }

    #[test]
    fn falls_back_to_chat_on_unknown_mode() {
        let decision = parse_decision(r#"{"mode": "delete_everything"}"#);
        assert_eq!(decision.mode, AgentMode::Chat);
    }
}
