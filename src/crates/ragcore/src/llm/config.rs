//! Request configuration types for chat and embedding calls.

use crate::Message;

/// A request to a chat model: messages plus generation parameters.
///
/// This is the primary input type for [`crate::llm::ChatModel::chat`] and
/// [`crate::llm::ChatModel::stream`].
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The conversation messages to send to the model, in order.
    pub messages: Vec<Message>,
    /// Generation parameters.
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.config.stop_sequences = sequences;
        self
    }

    /// Request a JSON-schema-constrained response (used by the entity/relation
    /// extraction pass's structured prompt).
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.config.json_schema = Some(schema);
        self
    }
}

/// Generation parameters. Not every provider honors every field.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    /// Sampling temperature (0.0-2.0, provider-dependent).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<usize>,
    /// Sequences that stop generation when encountered.
    pub stop_sequences: Vec<String>,
    /// When set, the provider is asked to constrain output to this JSON
    /// schema. Providers that cannot honor it should still attempt best-effort
    /// JSON output; schema validation happens on the caller's side.
    pub json_schema: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let request = ChatRequest::new(vec![Message::human("hi")])
            .with_temperature(0.2)
            .with_max_tokens(256);

        assert_eq!(request.config.temperature, Some(0.2));
        assert_eq!(request.config.max_tokens, Some(256));
    }

    #[test]
    fn default_config_has_no_schema() {
        assert!(ChatConfig::default().json_schema.is_none());
    }
}
