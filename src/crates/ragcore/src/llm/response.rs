//! Response and streaming types returned by a [`crate::llm::ChatModel`].

use crate::Message;
use futures::stream::BoxStream;

/// Token usage reported by the provider, used for Message.input/output token
/// counts and daily stats aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete, non-streamed chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<UsageMetadata>,
}

/// A single delta emitted while streaming.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    /// Non-empty token text fragment. Empty fragments are filtered by the
    /// gateway before reaching callers (spec: "forward each non-empty token").
    pub delta: String,
    /// Present on the final chunk only.
    pub usage: Option<UsageMetadata>,
}

/// A stream of chunks plus the request id used to correlate cancellation.
pub struct ChatStreamResponse {
    pub stream: BoxStream<'static, crate::error::Result<MessageChunk>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_default_is_zero() {
        let usage = UsageMetadata::default();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
    }
}
