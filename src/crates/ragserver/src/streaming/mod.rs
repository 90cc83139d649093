//! Server-push SSE streaming (spec.md §4.5, §4.8): typed events plus the
//! Answer Streamer that drives retrieval, generation, and cancellation.

pub mod answer_streamer;
pub mod events;

pub use answer_streamer::AnswerStreamer;
pub use events::{terminal_event, SourceDescriptor, StreamEvent};
