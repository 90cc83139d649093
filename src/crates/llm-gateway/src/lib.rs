//! Concrete LLM provider implementations and the rate-limited gateway.
//!
//! `ragcore` defines the provider-agnostic [`ChatModel`]/[`EmbeddingModel`]
//! traits; this crate supplies the two providers named in the platform's
//! LLM configuration (`LLM_PROVIDER=local|remote`) and wraps whichever one
//! is selected in [`Gateway`], which owns the shared concurrency semaphore.
//!
//! # Local provider (Ollama-compatible)
//!
//! ```rust,ignore
//! use llm_gateway::local::OllamaClient;
//! use llm_gateway::config::LocalLlmConfig;
//!
//! let client = OllamaClient::new(LocalLlmConfig::new("http://localhost:11434", "llama3"));
//! ```
//!
//! # Remote provider (OpenAI-compatible)
//!
//! ```rust,ignore
//! use llm_gateway::remote::OpenAiClient;
//! use llm_gateway::config::RemoteLlmConfig;
//!
//! let config = RemoteLlmConfig::from_env("LLM_API_KEY", "https://api.openai.com/v1", "gpt-4o-mini")?;
//! let client = OpenAiClient::new(config);
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod local;
pub mod remote;

pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use gateway::{Gateway, DEFAULT_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT};
pub use local::OllamaClient;
pub use remote::OpenAiClient;

pub use ragcore::llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, EmbeddingModel, MessageChunk, UsageMetadata};
pub use ragcore::Message;
