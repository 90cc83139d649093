//! # ragserver - ingestion, retrieval, and the tenant-facing HTTP API
//!
//! This crate hosts the three subsystems that make up the platform: the
//! document Ingestion Orchestrator, the Hybrid Retriever and Answer
//! Streamer, and the Version Manager that ties ingestion completion to
//! tenant-visible activation. `storage` supplies persistence; `llm-gateway`
//! supplies model access; this crate wires the two together behind an axum
//! HTTP API.

pub mod api;
pub mod bus;
pub mod config;
pub mod ingestion;
pub mod retrieval;
pub mod streaming;
pub mod version_manager;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
