//! Local LLM provider implementation.
//!
//! Connects to an Ollama-compatible server running on localhost or on the
//! local network. No API key required.

pub mod ollama;

pub use ollama::OllamaClient;
