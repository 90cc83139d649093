//! Remote LLM provider implementation.
//!
//! Connects to any OpenAI-compatible chat completions and embeddings API.

pub mod openai;

pub use openai::OpenAiClient;
