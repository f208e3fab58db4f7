//! Publishes a generated document to Notion. Skipped (and logged) when
//! no Notion credential or parent page was supplied with the request —
//! generation without a publishing target is a valid outcome, not an
//! error (spec.md §4.5).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::markdown::markdown_to_notion_blocks;

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let (credential, parent_page_id) = match (ctx.notion_credential, ctx.notion_parent_page_id) {
        (Some(credential), Some(parent_page_id)) => (credential, parent_page_id),
        _ => {
            tracing::info!(user_id = %state.user_id, "no notion publishing target configured, skipping create_page");
            return Ok(());
        }
    };

    let document = match state.generated_document.as_ref() {
        Some(document) => document,
        None => return Ok(()),
    };

    let blocks = markdown_to_notion_blocks(document);
    let title = document
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .unwrap_or_else(|| state.query.clone());

    let page = ctx
        .notion_api
        .create_page(&credential.access_token, parent_page_id, &title, blocks)
        .await?;
    state.notion_page = Some(page);
    Ok(())
}
