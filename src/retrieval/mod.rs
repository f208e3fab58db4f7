mod bm25;
mod context;
mod index;
mod vector;

pub use bm25::Bm25Index;
pub use context::build_context;
pub use index::{RetrievalIndex, SearchParams, SearchStrategy};
pub use vector::VectorStore;
