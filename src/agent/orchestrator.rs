//! Sequences the agent graph: `decide` routes to exactly one branch,
//! every branch converges on `final_answer`. No cycles and no dynamic
//! re-routing after `decide` runs, so a flat match over the decided
//! mode is as faithful to a "table of node functions" as a generic
//! graph runner would be, while reading far more directly (spec.md
//! §4.5, §9).

use crate::agent::node::NodeContext;
use crate::agent::nodes::{chat, create_page, decide, final_answer, generate, prepare_rag, search};
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::model::{AgentExecutionResult, AgentMode};

fn check_cancelled(ctx: &NodeContext<'_>) -> Result<(), AgentError> {
    if ctx.cancellation.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run one request through the graph, bounded by the configured
/// request timeout.
pub async fn run(ctx: &NodeContext<'_>, mut state: AgentState) -> Result<AgentExecutionResult, AgentError> {
    match tokio::time::timeout(ctx.config.request_timeout(), run_inner(ctx, &mut state)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::RequestTimeout),
    }
}

async fn run_inner(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<AgentExecutionResult, AgentError> {
    check_cancelled(ctx)?;
    decide::run(ctx, state).await?;
    let decision = state.decision.clone().ok_or(AgentError::NoDecision)?;
    state.mode = Some(decision.mode);

    match decision.mode {
        AgentMode::Search => {
            check_cancelled(ctx)?;
            search::run(ctx, state).await?;
        }
        AgentMode::Generate => {
            if decision.use_rag {
                check_cancelled(ctx)?;
                prepare_rag::run(ctx, state).await?;
            }
            check_cancelled(ctx)?;
            generate::run(ctx, state).await?;
            check_cancelled(ctx)?;
            create_page::run(ctx, state).await?;
        }
        AgentMode::Chat => {
            check_cancelled(ctx)?;
            chat::run(ctx, state).await?;
        }
    }

    check_cancelled(ctx)?;
    final_answer::run(ctx, state).await?;

    let result = state.result.clone().unwrap_or(crate::model::SearchResultOutcome {
        answer: String::new(),
        citations: Vec::new(),
        top_url: None,
    });

    Ok(AgentExecutionResult {
        mode: decision.mode,
        result,
        notion_page: state.notion_page.clone(),
        decision,
        generated_document: state.generated_document.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockEmbedder, ScriptedLlmProvider};
    use crate::model::WorkspaceContext;
    use crate::providers::FakeNotionApi;
    use tempfile::tempdir;

    fn context<'a>(
        planning: &'a ScriptedLlmProvider,
        final_answer: &'a ScriptedLlmProvider,
        embedder: &'a MockEmbedder,
        notion: &'a FakeNotionApi,
        config: &'a crate::config::ArcanaConfig,
    ) -> NodeContext<'a> {
        NodeContext {
            planning_llm: planning,
            final_answer_llm: final_answer,
            embedder,
            notion_api: notion,
            notion_credential: None,
            notion_parent_page_id: None,
            config,
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn chat_mode_skips_retrieval_and_page_creation() {
        let planning = ScriptedLlmProvider::new(vec![
            r#"{"mode": "chat"}"#.to_string(),
            "Hello there!".to_string(),
        ]);
        let final_llm = ScriptedLlmProvider::new(vec!["Hello there!".to_string()]);
        let embedder = MockEmbedder::default();
        let notion = FakeNotionApi::default();
        let config = crate::config::ArcanaConfig::default();
        let ctx = context(&planning, &final_llm, &embedder, &notion, &config);

        let dir = tempdir().unwrap();
        let workspace = WorkspaceContext::new(dir.path(), "w1", "team");
        let state = AgentState::new("hi", workspace, "u1");

        let result = run(&ctx, state).await.unwrap();
        assert_eq!(result.mode, AgentMode::Chat);
        assert_eq!(result.result.answer, "Hello there!");
        assert!(notion.created_pages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start_short_circuits() {
        let planning = ScriptedLlmProvider::new(vec![]);
        let final_llm = ScriptedLlmProvider::new(vec![]);
        let embedder = MockEmbedder::default();
        let notion = FakeNotionApi::default();
        let config = crate::config::ArcanaConfig::default();
        let ctx = context(&planning, &final_llm, &embedder, &notion, &config);
        ctx.cancellation.cancel();

        let dir = tempdir().unwrap();
        let workspace = WorkspaceContext::new(dir.path(), "w1", "team");
        let state = AgentState::new("hi", workspace, "u1");

        let err = run(&ctx, state).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn generate_without_rag_skips_retrieval() {
        let planning = ScriptedLlmProvider::new(vec![
            r#"{"mode": "generate", "use_rag": false, "instructions": "a short memo"}"#.to_string(),
            "# Memo\n\nBody text.".to_string(),
        ]);
        let final_llm = ScriptedLlmProvider::new(vec![]);
        let embedder = MockEmbedder::default();
        let notion = FakeNotionApi::default();
        let config = crate::config::ArcanaConfig::default();
        let ctx = context(&planning, &final_llm, &embedder, &notion, &config);

        let dir = tempdir().unwrap();
        let workspace = WorkspaceContext::new(dir.path(), "w1", "team");
        let state = AgentState::new("write a memo", workspace, "u1");

        let result = run(&ctx, state).await.unwrap();
        assert_eq!(result.mode, AgentMode::Generate);
        assert!(result.generated_document.unwrap().contains("Memo"));
        // No Notion credential configured, so publishing is skipped.
        assert!(result.notion_page.is_none());
    }
}
