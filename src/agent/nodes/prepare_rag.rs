//! Retrieval step for grounded generation: runs the same hybrid search
//! as `search`, but only stores the hits for `generate` to cite from —
//! it does not itself produce an answer (spec.md §4.5).

use crate::agent::node::NodeContext;
use crate::agent::state::AgentState;
use crate::error::AgentError;
use crate::retrieval::{RetrievalIndex, SearchParams, SearchStrategy};

pub async fn run(ctx: &NodeContext<'_>, state: &mut AgentState) -> Result<(), AgentError> {
    let index = RetrievalIndex::open(&state.workspace.storage_root)?;
    let params = SearchParams::clamped(
        ctx.config.top_k,
        ctx.config.hybrid_alpha,
        ctx.config.hybrid_rrf_k,
        SearchStrategy::Hybrid,
    );
    let hits = index.search(ctx.embedder, &state.query, params).await?;
    state.retrieval = Some(hits);
    Ok(())
}
