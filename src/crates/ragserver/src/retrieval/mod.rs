//! Hybrid Retrieval (spec.md §4.4): vector search seeded by keyword/chunk
//! entities, expanded two hops through the knowledge graph, fused into a
//! single ranked context assembled under a token budget.

pub mod retriever;
pub mod tokens;

pub use retriever::{HybridRetriever, RetrievalTuning, RetrievedContext, RetrievedSource};
pub use tokens::estimate_tokens;
