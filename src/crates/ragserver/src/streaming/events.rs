//! Typed SSE events for the Answer Streamer (spec.md §4.5, §6): every event
//! is a `data: <json>\n\n` line whose JSON carries a `type` discriminator,
//! terminated by a literal `data: [DONE]\n\n` line — not axum's named
//! `event:` field, which the source client does not expect.

use crate::retrieval::RetrievedSource;
use axum::response::sse::Event;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub score: f64,
}

impl SourceDescriptor {
    /// Builds a `vector`-kind descriptor for a retrieved chunk, carrying its
    /// document location and the resolved filename for display.
    pub fn from_chunk(source: &RetrievedSource, filename: String) -> Self {
        let RetrievedSource::Chunk { chunk_id, document_id, page, section, fused_score, .. } = source else {
            panic!("from_chunk called with a non-chunk source");
        };
        Self {
            kind: "vector",
            chunk_id: Some(chunk_id.clone()),
            document_id: Some(document_id.clone()),
            filename: Some(filename),
            page: *page,
            section: section.clone(),
            node_name: None,
            score: *fused_score,
        }
    }

    /// Builds a `graph`-kind descriptor for a Definition/Concept/Process node
    /// surfaced by keyword or expansion seeding (spec.md §4.4 step 7).
    pub fn from_graph_node(source: &RetrievedSource) -> Self {
        let RetrievedSource::GraphNode { name, score, .. } = source else {
            panic!("from_graph_node called with a non-graph source");
        };
        Self {
            kind: "graph",
            chunk_id: None,
            document_id: None,
            filename: None,
            page: None,
            section: None,
            node_name: Some(name.clone()),
            score: *score,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Stage labels per spec.md §4.5: `history`, `retrieval`, `context_found`
    /// (carries `source_count`), `generating`.
    ThinkingStatus { stage: &'static str, source_count: Option<usize> },
    Content { delta: String },
    Sources { sources: Vec<SourceDescriptor> },
    Done { message_id: String },
    Error { kind: String, message: String },
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum WirePayload<'a> {
    #[serde(rename = "thinking_status")]
    ThinkingStatus {
        stage: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_count: Option<usize>,
    },
    #[serde(rename = "content")]
    Content { delta: &'a str },
    #[serde(rename = "sources")]
    Sources { sources: &'a [SourceDescriptor] },
    #[serde(rename = "done")]
    Done { message_id: &'a str },
    #[serde(rename = "error")]
    Error { kind: &'a str, message: &'a str },
}

impl StreamEvent {
    /// Builds the bare `data:` SSE event this event corresponds to.
    pub fn into_sse_event(self) -> Event {
        let payload = match &self {
            StreamEvent::ThinkingStatus { stage, source_count } => WirePayload::ThinkingStatus { stage, source_count: *source_count },
            StreamEvent::Content { delta } => WirePayload::Content { delta },
            StreamEvent::Sources { sources } => WirePayload::Sources { sources },
            StreamEvent::Done { message_id } => WirePayload::Done { message_id },
            StreamEvent::Error { kind, message } => WirePayload::Error { kind, message },
        };
        Event::default().json_data(payload).unwrap_or_default()
    }
}

/// The literal terminal line spec.md §6 mandates after the last event.
pub fn terminal_event() -> Event {
    Event::default().data("[DONE]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_descriptor_carries_chunk_location_and_filename() {
        let source = RetrievedSource::Chunk {
            chunk_id: "c1".into(),
            document_id: "d1".into(),
            chunk_index: 0,
            page: Some(3),
            section: Some("Intro".into()),
            text: "ignored".into(),
            fused_score: 0.5,
        };
        let descriptor = SourceDescriptor::from_chunk(&source, "handbook.pdf".into());
        assert_eq!(descriptor.chunk_id.as_deref(), Some("c1"));
        assert_eq!(descriptor.page, Some(3));
        assert_eq!(descriptor.filename.as_deref(), Some("handbook.pdf"));
        assert_eq!(descriptor.kind, "vector");
    }

    #[test]
    fn graph_source_descriptor_carries_node_name_and_kind() {
        let source = RetrievedSource::GraphNode {
            node_id: "n1".into(),
            name: "GraphRAG".into(),
            node_type: storage::NodeType::Definition,
            text: "a retrieval technique".into(),
            hop: 0,
            score: 0.9,
        };
        let descriptor = SourceDescriptor::from_graph_node(&source);
        assert_eq!(descriptor.kind, "graph");
        assert_eq!(descriptor.node_name.as_deref(), Some("GraphRAG"));
        assert!(descriptor.chunk_id.is_none());
    }
}
