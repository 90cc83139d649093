//! Core trait for chat-based language models.
//!
//! The orchestration layer is provider-agnostic: it depends only on
//! [`ChatModel`], and the `llm-gateway` crate supplies concrete
//! implementations (local Ollama-style server, remote OpenAI-compatible
//! endpoint) plus the rate limiting described in spec.md §4.6.

use crate::error::Result;
use crate::llm::config::ChatRequest;
use crate::llm::response::{ChatResponse, ChatStreamResponse};
use async_trait::async_trait;

/// Provider-agnostic interface for interacting with a chat LLM.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// behind an `Arc` across the worker pool and the request scheduler.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete chat response from messages.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stream a chat response token by token.
    async fn stream(&self, request: ChatRequest) -> Result<ChatStreamResponse>;

    /// Check if the model/provider is reachable. Used at boot (exit code 3,
    /// soft failure) and by health endpoints.
    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Provider-agnostic interface for text embedding.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a single piece of text, returning a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts in one request where the provider supports it.
    /// Default implementation embeds sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Dimension of vectors returned by this model (`EMBEDDING_DIM`).
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::response::{MessageChunk, UsageMetadata};
    use crate::{Message, MessageRole};
    use futures::stream;

    struct MockModel {
        reply: String,
    }

    #[async_trait]
    impl ChatModel for MockModel {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                message: Message::ai(self.reply.clone()),
                usage: Some(UsageMetadata {
                    input_tokens: 10,
                    output_tokens: 5,
                }),
            })
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChatStreamResponse> {
            let reply = self.reply.clone();
            let chunks = vec![Ok(MessageChunk {
                delta: reply,
                usage: None,
            })];
            Ok(ChatStreamResponse {
                stream: Box::pin(stream::iter(chunks)),
            })
        }
    }

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingModel for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; 4])
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn chat_model_trait_object() {
        let model: std::sync::Arc<dyn ChatModel> = std::sync::Arc::new(MockModel {
            reply: "hello".into(),
        });
        let response = model.chat(ChatRequest::new(vec![Message::human("hi")])).await.unwrap();
        assert_eq!(response.message.role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn embedding_batch_default_impl() {
        let embedder = MockEmbedder;
        let vectors = embedder
            .embed_batch(&["a".into(), "bb".into()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(embedder.dimension(), 4);
    }
}
