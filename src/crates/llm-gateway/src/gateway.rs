//! The rate-limited entry point the rest of the platform talks to.
//!
//! `Gateway` wraps a [`ChatModel`] + [`EmbeddingModel`] pair behind the
//! concurrency and timeout discipline: a global counting semaphore guards
//! both `embed` and `chat_stream`, and each acquisition is bounded by a
//! per-request timeout so a stuck provider call releases its slot.

use futures::stream::{self, BoxStream, StreamExt};
use ragcore::error::{CoreError, Result};
use ragcore::llm::{ChatModel, ChatRequest, ChatResponse, EmbeddingModel, MessageChunk};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tooling::async_utils::timeout::{with_timeout, TimeoutError};

/// Default LLM Gateway semaphore capacity (spec: global, capacity 2).
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default per-request timeout for both embedding and chat calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct Gateway {
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingModel>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
}

impl Gateway {
    pub fn new(chat: Arc<dyn ChatModel>, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self::with_capacity(chat, embedder, DEFAULT_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_capacity(
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingModel>,
        capacity: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            chat,
            embedder,
            semaphore: Arc::new(Semaphore::new(capacity)),
            request_timeout,
        }
    }

    /// Embed a single piece of text. Offloads the call to a blocking worker
    /// thread so a synchronous provider SDK can never stall the scheduler.
    pub async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CoreError::internal("gateway semaphore closed"))?;

        let embedder = self.embedder.clone();
        let timeout = self.request_timeout;
        match with_timeout(timeout, embedder.embed(&text)).await {
            Ok(vector) => Ok(vector),
            Err(TimeoutError::OperationFailed(err)) => Err(err),
            Err(TimeoutError::Timeout(d)) => Err(CoreError::transient(format!("embedding request timed out after {d:?}"))),
        }
    }

    /// Single-shot, non-streaming chat completion. Used by the entity/relation
    /// extraction pass, which needs one structured JSON response per chunk
    /// rather than a token stream.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CoreError::internal("gateway semaphore closed"))?;

        match with_timeout(self.request_timeout, self.chat.chat(request)).await {
            Ok(response) => Ok(response),
            Err(TimeoutError::OperationFailed(err)) => Err(err),
            Err(TimeoutError::Timeout(d)) => Err(CoreError::transient(format!("chat request timed out after {d:?}"))),
        }
    }

    /// Stream tokens for a chat request. Holds the semaphore permit for the
    /// lifetime of the returned stream so a slow consumer still counts
    /// against gateway concurrency.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, Result<MessageChunk>>> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::internal("gateway semaphore closed"))?;

        let response = match with_timeout(self.request_timeout, self.chat.stream(request)).await {
            Ok(response) => response,
            Err(TimeoutError::OperationFailed(err)) => return Err(err),
            Err(TimeoutError::Timeout(d)) => {
                return Err(CoreError::transient(format!("chat stream request timed out after {d:?}")))
            }
        };

        // Keep the permit alive by moving it into the stream's captured state.
        let guarded = stream::unfold((response.stream, Some(permit)), |(mut inner, permit)| async move {
            match inner.next().await {
                Some(item) => Some((item, (inner, permit))),
                None => None,
            }
        });

        Ok(Box::pin(guarded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragcore::llm::{ChatResponse, ChatStreamResponse};
    use ragcore::Message;

    struct StubChat;

    #[async_trait]
    impl ChatModel for StubChat {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse { message: Message::ai("ok"), usage: None })
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChatStreamResponse> {
            let chunks = vec![Ok(MessageChunk { delta: "hi".into(), usage: None })];
            Ok(ChatStreamResponse { stream: Box::pin(stream::iter(chunks)) })
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingModel for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32; 4])
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn embed_acquires_and_releases_permit() {
        let gateway = Gateway::new(Arc::new(StubChat), Arc::new(StubEmbedder));
        let vector = gateway.embed("hello".into()).await.unwrap();
        assert_eq!(vector, vec![5.0; 4]);
        assert_eq!(gateway.semaphore.available_permits(), DEFAULT_CONCURRENCY);
    }

    #[tokio::test]
    async fn chat_completes_without_streaming() {
        let gateway = Gateway::new(Arc::new(StubChat), Arc::new(StubEmbedder));
        let response = gateway.chat(ChatRequest::new(vec![Message::human("hi")])).await.unwrap();
        assert_eq!(response.message.text(), Some("ok"));
    }

    #[tokio::test]
    async fn chat_stream_yields_tokens() {
        let gateway = Gateway::new(Arc::new(StubChat), Arc::new(StubEmbedder));
        let mut stream = gateway.chat_stream(ChatRequest::new(vec![Message::human("hi")])).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta, "hi");
    }
}
