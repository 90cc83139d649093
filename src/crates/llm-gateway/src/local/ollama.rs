//! Ollama client implementation.
//!
//! Talks to an Ollama-compatible `/api/chat` and `/api/embeddings` server.
//! This is the default local provider selected when `LLM_PROVIDER=local`.

use crate::config::LocalLlmConfig;
use crate::error::{LlmError, Result as LlmResult};
use async_trait::async_trait;
use futures::StreamExt;
use ragcore::error::Result as CoreResult;
use ragcore::llm::{ChatModel, ChatRequest, ChatResponse, ChatStreamResponse, EmbeddingModel, MessageChunk, UsageMetadata};
use ragcore::{Message, MessageRole};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone)]
pub struct OllamaClient {
    config: LocalLlmConfig,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: LocalLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    pub async fn check_health(&self) -> LlmResult<bool> {
        let url = format!("{}/api/tags", self.config.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn convert_message(&self, msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: match &msg.role {
                MessageRole::System => "system".to_string(),
                MessageRole::Human => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::Tool => "user".to_string(),
                MessageRole::Custom(role) => role.clone(),
            },
            content: msg.text().unwrap_or("").to_string(),
        }
    }

    fn build_options(&self, request: &ChatRequest) -> Option<HashMap<&'static str, serde_json::Value>> {
        let mut options = HashMap::new();
        if let Some(temp) = request.config.temperature {
            options.insert("temperature", serde_json::Value::from(temp));
        }
        if !options.is_empty() {
            Some(options)
        } else {
            None
        }
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> CoreResult<ChatResponse> {
        let url = format!("{}/api/chat", self.config.base_url);
        let messages: Vec<OllamaMessage> = request.messages.iter().map(|m| self.convert_message(m)).collect();
        let options = self.build_options(&request);

        let req_body = OllamaRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            options,
        };

        let response = self.client.post(&url).json(&req_body).send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("ollama error {status}: {text}")).into());
        }

        let body: OllamaResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let usage = if body.prompt_eval_count.is_some() || body.eval_count.is_some() {
            Some(UsageMetadata {
                input_tokens: body.prompt_eval_count.unwrap_or(0) as u32,
                output_tokens: body.eval_count.unwrap_or(0) as u32,
            })
        } else {
            None
        };

        Ok(ChatResponse {
            message: Message::ai(body.message.content),
            usage,
        })
    }

    async fn stream(&self, request: ChatRequest) -> CoreResult<ChatStreamResponse> {
        let url = format!("{}/api/chat", self.config.base_url);
        let messages: Vec<OllamaMessage> = request.messages.iter().map(|m| self.convert_message(m)).collect();
        let options = self.build_options(&request);

        let req_body = OllamaRequest {
            model: self.config.model.clone(),
            messages,
            stream: true,
            options,
        };

        let response = self.client.post(&url).json(&req_body).send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("ollama error {status}: {text}")).into());
        }

        let byte_stream = response.bytes_stream();
        let chunk_stream = byte_stream.filter_map(|chunk| async move {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return Some(Err(LlmError::HttpError(e).into())),
            };
            for line in bytes.split(|b| *b == b'\n') {
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice::<OllamaResponse>(line) {
                    Ok(parsed) if !parsed.message.content.is_empty() => {
                        let usage = if parsed.done {
                            Some(UsageMetadata {
                                input_tokens: parsed.prompt_eval_count.unwrap_or(0) as u32,
                                output_tokens: parsed.eval_count.unwrap_or(0) as u32,
                            })
                        } else {
                            None
                        };
                        return Some(Ok(MessageChunk { delta: parsed.message.content, usage }));
                    }
                    _ => continue,
                }
            }
            None
        });

        Ok(ChatStreamResponse { stream: Box::pin(chunk_stream) })
    }

    async fn is_available(&self) -> CoreResult<bool> {
        Ok(self.check_health().await.unwrap_or(false))
    }
}

#[async_trait]
impl EmbeddingModel for OllamaClient {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let req_body = OllamaEmbedRequest {
            model: self.config.model.clone(),
            prompt: text.to_string(),
        };

        let response = self.client.post(&url).json(&req_body).send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderError(format!("ollama embed error {status}: {text}")).into());
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<&'static str, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_conversion_maps_roles() {
        let config = LocalLlmConfig::new("http://localhost:11434", "llama3");
        let client = OllamaClient::new(config);

        let msg = Message::human("hello");
        let converted = client.convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content, "hello");
    }

    #[test]
    fn dimension_reflects_config() {
        let config = LocalLlmConfig::new("http://localhost:11434", "nomic-embed-text").with_embedding_dim(768);
        let client = OllamaClient::new(config);
        assert_eq!(client.dimension(), 768);
    }
}
