//! # storage - the three persistence stores behind the RAG platform
//!
//! Each store owns one of the three backends named in spec.md §3's
//! persistence bindings:
//!
//! - [`meta_store::MetaStore`] - relational (SQLite via `sqlx`): tenants,
//!   documents, build versions, sessions, messages, daily stats.
//! - [`vector_store::VectorStore`] - per-version Qdrant collections holding
//!   chunk embeddings.
//! - [`graph_store::GraphStore`] - relational persistence for graph nodes
//!   and edges, plus an in-memory `petgraph` view for hop expansion.
//!
//! `ragserver` depends on all three; neither store knows about the others,
//! so cross-store consistency (e.g. version activation vs. collection
//! creation) is orchestrated by the caller.

pub mod connection;
pub mod error;
pub mod graph_store;
pub mod meta_store;
pub mod models;
pub mod vector_store;

pub use connection::{DatabaseConnection, DatabasePool, PoolStatistics};
pub use graph_store::{normalize_name, EdgeType, ExpandedNode, GraphEdge, GraphNode, GraphStore, GraphTraversal, NodeType};
pub use meta_store::MetaStore;
pub use models::{
    BuildVersionRow, BuildVersionStatus, DailyStatsRow, DocumentRow, DocumentStatus, MessageRole,
    MessageRow, SessionRow, TenantRow, TenantStatus,
};
pub use vector_store::{ChunkPayload, VectorMatch, VectorStore, DEFAULT_SCORE_THRESHOLD};
