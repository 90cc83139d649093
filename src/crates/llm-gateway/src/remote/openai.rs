//! OpenAI-compatible remote provider implementation.
//!
//! Targets any API that speaks the OpenAI `/chat/completions` and
//! `/embeddings` wire format (OpenAI itself, and most self-hosted gateways
//! that emulate it).

use crate::config::RemoteLlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use futures::StreamExt;
use ragcore::error::Result as CoreResult;
use ragcore::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, EmbeddingModel, MessageChunk, UsageMetadata};
use ragcore::{Message, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    fn convert_message(&self, msg: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match &msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::Human => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::Tool => "tool".to_string(),
                MessageRole::Custom(role) => role.clone(),
            },
            content: msg.text().unwrap_or("").to_string(),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        match &self.config.organization {
            Some(org) => req.header("OpenAI-Organization", org),
            None => req,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> CoreResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let messages: Vec<OpenAiMessage> = request.messages.iter().map(|m| self.convert_message(m)).collect();

        let req_body = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.config.temperature,
            max_tokens: request.config.max_tokens,
            stop: (!request.config.stop_sequences.is_empty()).then(|| request.config.stop_sequences.clone()),
            stream: false,
            response_format: request.config.json_schema.as_ref().map(|schema| ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: schema.clone(),
            }),
        };

        let response = self
            .authorize(self.client.post(&url).json(&req_body))
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(text),
                429 => LlmError::RateLimitExceeded(text),
                _ => LlmError::ProviderError(format!("openai error {status}: {text}")),
            }
            .into());
        }

        let body: OpenAiChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = body.choices.into_iter().next().ok_or_else(|| LlmError::InvalidResponse("empty choices".into()))?;

        let usage = body.usage.map(|u| UsageMetadata {
            input_tokens: u.prompt_tokens as u32,
            output_tokens: u.completion_tokens as u32,
        });

        Ok(ChatResponse {
            message: Message::ai(choice.message.content),
            usage,
        })
    }

    async fn stream(&self, request: ChatRequest) -> CoreResult<ChatStreamResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let messages: Vec<OpenAiMessage> = request.messages.iter().map(|m| self.convert_message(m)).collect();

        let req_body = OpenAiChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.config.temperature,
            max_tokens: request.config.max_tokens,
            stop: (!request.config.stop_sequences.is_empty()).then(|| request.config.stop_sequences.clone()),
            stream: true,
            response_format: None,
        };

        let response = self
            .authorize(self.client.post(&url).json(&req_body))
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("openai error {status}: {text}")).into());
        }

        // Server-sent events: each line is `data: {json}` or `data: [DONE]`.
        let chunk_stream = response.bytes_stream().filter_map(|chunk| async move {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(LlmError::HttpError(e).into())),
            };
            for line in bytes.split(|b| *b == b'\n') {
                let line = String::from_utf8_lossy(line);
                let payload = match line.strip_prefix("data: ") {
                    Some(payload) => payload.trim(),
                    None => continue,
                };
                if payload.is_empty() || payload == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<OpenAiStreamChunk>(payload) {
                    Ok(parsed) => {
                        if let Some(choice) = parsed.choices.into_iter().next() {
                            if let Some(delta) = choice.delta.content {
                                if !delta.is_empty() {
                                    return Some(Ok(MessageChunk { delta, usage: None }));
                                }
                            }
                        }
                    }
                    Err(_) => continue,
                }
            }
            None
        });

        Ok(ChatStreamResponse { stream: Box::pin(chunk_stream) })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiClient {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let req_body = OpenAiEmbedRequest {
            model: self.config.model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .authorize(self.client.post(&url).json(&req_body))
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("openai embed error {status}: {text}")).into());
        }

        let body: OpenAiEmbedResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("empty embedding data".into()).into())
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_conversion_maps_roles() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4o-mini");
        let client = OpenAiClient::new(config);

        let msg = Message::human("hello");
        let converted = client.convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content, "hello");
    }
}
