//! # ragcore - shared domain types for the RAG platform
//!
//! `ragcore` is the foundation crate shared by `llm-gateway`, `storage`, and
//! `ragserver`. It carries no I/O of its own; it provides:
//!
//! - [`CoreError`] - the tagged error taxonomy every crate funnels through
//! - [`Message`] and friends - chat history types shared by ingestion's
//!   extraction prompts and retrieval's answer-streaming prompts
//! - [`llm`] - the [`llm::ChatModel`] / [`llm::EmbeddingModel`] traits that
//!   decouple orchestration from any one LLM provider
//!
//! Keeping these in one crate avoids a dependency cycle: both `llm-gateway`
//! (which implements the traits) and `ragserver` (which calls them) need the
//! same request/response types without depending on each other.

pub mod error;
pub mod llm;
pub mod messages;

pub use error::{CoreError, Result};
pub use llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, EmbeddingModel, MessageChunk, UsageMetadata};
pub use messages::{
    add_message_likes, add_messages, convert_to_messages, filter_by_role, get_last_message,
    get_messages_by_id, merge_consecutive_messages, truncate_messages, ContentPart, Message,
    MessageContent, MessageLike, MessageRole, RemoveMessage, TrimOptions, TrimStrategy,
    trim_messages,
};
