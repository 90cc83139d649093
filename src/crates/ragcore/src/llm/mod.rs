//! Provider-agnostic LLM integration traits and types.
//!
//! This module defines the contract between the orchestration layer and the
//! `llm-gateway` crate: [`ChatModel`] for chat/streaming generation and
//! [`EmbeddingModel`] for vector embedding. Neither trait depends on a
//! concrete provider; `llm-gateway` supplies local (Ollama-style) and remote
//! (OpenAI-compatible) implementations.

pub mod config;
pub mod response;
pub mod traits;

pub use config::{ChatConfig, ChatRequest};
pub use response::{ChatResponse, ChatStreamResponse, MessageChunk, UsageMetadata};
pub use traits::{ChatModel, EmbeddingModel};
