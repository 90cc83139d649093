//! The Answer Streamer (spec.md §4.5): looks up the session, retrieves
//! context, streams the model's answer token by token, and persists the
//! assistant turn regardless of how the stream ends.

use crate::bus::CancellationBus;
use crate::retrieval::{HybridRetriever, RetrievedSource};
use crate::streaming::events::{SourceDescriptor, StreamEvent};
use chrono::Utc;
use futures::StreamExt;
use llm_gateway::Gateway;
use ragcore::llm::{ChatRequest, UsageMetadata};
use ragcore::Message;
use std::collections::HashMap;
use std::sync::Arc;
use storage::{MetaStore, TenantRow};
use tokio::sync::mpsc;

pub const DEFAULT_HISTORY_TURNS: u32 = 10;
pub const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 3000;

pub struct AnswerStreamer {
    meta: MetaStore,
    retriever: HybridRetriever,
    gateway: Arc<Gateway>,
    cancellation: CancellationBus,
    history_turns: u32,
    context_token_budget: usize,
}

impl AnswerStreamer {
    pub fn new(meta: MetaStore, retriever: HybridRetriever, gateway: Arc<Gateway>, cancellation: CancellationBus) -> Self {
        Self::with_tuning(meta, retriever, gateway, cancellation, DEFAULT_HISTORY_TURNS, DEFAULT_CONTEXT_TOKEN_BUDGET)
    }

    /// `history_turns` and `context_token_budget` are read from
    /// [`crate::config::ServerConfig`] (spec.md §6: `HISTORY_TURNS`,
    /// `CONTEXT_TOKEN_BUDGET`) so operators can tune how much conversation
    /// history and retrieved context are replayed into each generation
    /// request.
    pub fn with_tuning(
        meta: MetaStore,
        retriever: HybridRetriever,
        gateway: Arc<Gateway>,
        cancellation: CancellationBus,
        history_turns: u32,
        context_token_budget: usize,
    ) -> Self {
        Self { meta, retriever, gateway, cancellation, history_turns, context_token_budget }
    }

    /// Streams an answer for `message` in `session_id`, sending typed events
    /// on `tx`. Always persists the assistant turn before returning, tagging
    /// it cancelled or failed as appropriate (spec.md §4.5 step 9).
    pub async fn stream(&self, tenant: &TenantRow, session_id: &str, message: &str, tx: mpsc::Sender<StreamEvent>) {
        let start = Utc::now();

        let session = match self.meta.get_session(session_id).await {
            Ok(Some(session)) if !MetaStore::session_is_expired(&session) => session,
            Ok(_) => {
                let _ = tx.send(StreamEvent::Error { kind: "not_found".into(), message: "session not found or expired".into() }).await;
                return;
            }
            Err(err) => {
                let _ = tx.send(StreamEvent::Error { kind: "internal".into(), message: err.to_string() }).await;
                return;
            }
        };

        if let Err(err) = self.meta.persist_user_message(&session, message).await {
            let _ = tx.send(StreamEvent::Error { kind: "internal".into(), message: err.to_string() }).await;
            return;
        }

        let _ = tx.send(StreamEvent::ThinkingStatus { stage: "retrieval", source_count: None }).await;

        let retrieval_started = Utc::now();
        let context = match self.retriever.retrieve(&tenant.id, tenant.active_version, message, Some(self.context_token_budget)).await {
            Ok(context) => context,
            Err(err) => {
                self.persist_failure(session_id, &tenant.id, start, 0).await;
                let _ = tx.send(StreamEvent::Error { kind: "retrieval".into(), message: err.to_string() }).await;
                return;
            }
        };
        let retrieval_time_ms = (Utc::now() - retrieval_started).num_milliseconds();
        let _ = tx.send(StreamEvent::ThinkingStatus { stage: "context_found", source_count: Some(context.sources.len()) }).await;

        let history = match self.meta.recent_turns(session_id, self.history_turns).await {
            Ok(history) => history,
            Err(err) => {
                self.persist_failure(session_id, &tenant.id, start, retrieval_time_ms).await;
                let _ = tx.send(StreamEvent::Error { kind: "internal".into(), message: err.to_string() }).await;
                return;
            }
        };

        let _ = tx.send(StreamEvent::ThinkingStatus { stage: "generating", source_count: None }).await;

        let request = self.compose_request(tenant, &context.context_text, &history, message);
        let mut stream = match self.gateway.chat_stream(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.persist_failure(session_id, &tenant.id, start, retrieval_time_ms).await;
                let _ = tx.send(StreamEvent::Error { kind: "upstream".into(), message: err.to_string() }).await;
                return;
            }
        };

        let mut answer = String::new();
        let mut usage: Option<UsageMetadata> = None;
        let mut cancelled = false;
        let mut failed = false;

        loop {
            if self.cancellation.poll(session_id).unwrap_or(false) {
                cancelled = true;
                break;
            }
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if !chunk.delta.is_empty() {
                        answer.push_str(&chunk.delta);
                        let _ = tx.send(StreamEvent::Content { delta: chunk.delta }).await;
                    }
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                }
                Some(Err(err)) => {
                    failed = true;
                    let _ = tx.send(StreamEvent::Error { kind: "upstream".into(), message: err.to_string() }).await;
                    break;
                }
                None => break,
            }
        }

        let response_time_ms = (Utc::now() - start).num_milliseconds();
        let input_tokens = usage.map(|u| u.input_tokens as i64).unwrap_or(0);
        let output_tokens = usage.map(|u| u.output_tokens as i64).unwrap_or(0);

        let message_row = self
            .meta
            .persist_assistant_message(
                session_id,
                &tenant.id,
                &answer,
                None,
                response_time_ms,
                input_tokens,
                output_tokens,
                context.sources.len() as i64,
                retrieval_time_ms,
                cancelled,
                failed,
            )
            .await;

        if !cancelled && !failed {
            let descriptors = self.describe_sources(&context.sources).await;
            let _ = tx.send(StreamEvent::Sources { sources: descriptors }).await;
            if let Ok(row) = message_row {
                let _ = tx.send(StreamEvent::Done { message_id: row.id }).await;
            }
        }
    }

    async fn persist_failure(&self, session_id: &str, tenant_id: &str, start: chrono::DateTime<Utc>, retrieval_time_ms: i64) {
        let response_time_ms = (Utc::now() - start).num_milliseconds();
        let _ = self
            .meta
            .persist_assistant_message(session_id, tenant_id, "", None, response_time_ms, 0, 0, 0, retrieval_time_ms, false, true)
            .await;
    }

    /// Looks up each chunk source's original filename for the client-facing
    /// descriptor, caching lookups since several chunks usually share a
    /// document; graph sources carry no document and skip the lookup.
    async fn describe_sources(&self, sources: &[RetrievedSource]) -> Vec<SourceDescriptor> {
        let mut filenames: HashMap<String, String> = HashMap::new();
        let mut descriptors = Vec::with_capacity(sources.len());
        for source in sources {
            match source {
                RetrievedSource::Chunk { document_id, .. } => {
                    let filename = match filenames.get(document_id) {
                        Some(name) => name.clone(),
                        None => {
                            let name = self.meta.get_document(document_id).await.ok().flatten().map(|d| d.original_filename).unwrap_or_default();
                            filenames.insert(document_id.clone(), name.clone());
                            name
                        }
                    };
                    descriptors.push(SourceDescriptor::from_chunk(source, filename));
                }
                RetrievedSource::GraphNode { .. } => {
                    descriptors.push(SourceDescriptor::from_graph_node(source));
                }
            }
        }
        descriptors
    }

    fn compose_request(&self, tenant: &TenantRow, context: &str, history: &[storage::MessageRow], message: &str) -> ChatRequest {
        let mut messages = Vec::new();

        let persona = tenant.persona_system_prompt.clone().unwrap_or_else(|| {
            format!(
                "You are the assistant for {}. Tone: {}. Respond in {}.",
                tenant.name,
                tenant.persona_tone.as_deref().unwrap_or("neutral"),
                tenant.persona_language.as_deref().unwrap_or("the user's language"),
            )
        });
        messages.push(Message::system(persona));
        messages.push(Message::system(format!("Context:\n{context}")));

        for turn in history {
            match turn.role.as_str() {
                "assistant" => messages.push(Message::ai(turn.content.clone())),
                _ => messages.push(Message::human(turn.content.clone())),
            }
        }
        messages.push(Message::human(message.to_string()));

        ChatRequest::new(messages)
    }
}
