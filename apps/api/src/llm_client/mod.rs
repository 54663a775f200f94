/// LLM Client: the single point of entry for all chat-completion calls in MagicBox.
///
/// ARCHITECTURAL RULE: No other module may call the Llama API directly.
/// Extraction, refinement and schema generation all go through `ChatModel`.
///
/// Model: Llama-4-Maverick, fixed in `MODEL`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod parse;
pub mod prompts;

use prompts::JSON_MODE_SUFFIX;

/// The model used for all LLM calls in MagicBox.
pub const MODEL: &str = "Llama-4-Maverick-17B-128E-Instruct-FP8";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

// ────────────────────────────────────────────────────────────────────────────
// Request model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message content: either plain text or a mixed text + image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying the prompt text followed by an image reference (data URI or URL).
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// All text carried by this message, image parts skipped.
    #[cfg(test)]
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Appends `suffix` to the first text segment of this message.
    fn append_text(&mut self, suffix: &str) {
        match &mut self.content {
            MessageContent::Text(text) => text.push_str(suffix),
            MessageContent::Parts(parts) => {
                if let Some(ContentPart::Text { text }) = parts
                    .iter_mut()
                    .find(|p| matches!(p, ContentPart::Text { .. }))
                {
                    text.push_str(suffix);
                }
            }
        }
    }
}

/// Strict structured-output request, forwarded as `response_format: json_schema`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: Value,
}

/// One chat-completion call. Options mirror what the hosted API accepts.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub json_schema: Option<JsonSchemaFormat>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            json_mode: false,
            json_schema: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_json_schema(mut self, schema: JsonSchemaFormat) -> Self {
        self.json_schema = Some(schema);
        self
    }

    /// Messages as they go over the wire. Without a strict schema, JSON mode is
    /// enforced by prompting: the first system message gets a JSON-only suffix.
    fn wire_messages(&self) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        if self.json_mode && self.json_schema.is_none() {
            if let Some(first) = messages.first_mut().filter(|m| m.role == Role::System) {
                first.append_text(JSON_MODE_SUFFIX);
            }
        }
        messages
    }
}

/// The seam every LLM consumer depends on. `LlmClient` is the production backend;
/// tests drive extraction and refinement with scripted implementations.
///
/// Carried in `AppState` as `Arc<dyn ChatModel>`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends the request and returns the raw text of the model's reply.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Llama API wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LlamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: &'a JsonSchemaFormat,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub completion_message: Option<CompletionMessage>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Value,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Metric {
    pub metric: String,
    pub value: f64,
}

impl LlmResponse {
    /// Flattens the completion content into text. The API may return a bare string,
    /// a `{type, text}` object, or an array of parts.
    pub fn text(&self) -> Option<String> {
        let content = &self.completion_message.as_ref()?.content;
        let text = flatten_content(content)?;
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|m| m.metric == name)
            .map(|m| m.value)
    }
}

fn flatten_content(content: &Value) -> Option<String> {
    match content {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => Some(content.to_string()),
        },
        Value::Array(parts) => Some(
            parts
                .iter()
                .map(|part| match part {
                    Value::String(s) => s.clone(),
                    Value::Object(map) => match map.get("text") {
                        Some(Value::String(s)) => s.clone(),
                        _ => part.to_string(),
                    },
                    other => other.to_string(),
                })
                .collect(),
        ),
        other => Some(other.to_string()),
    }
}

/// Pulls a human-readable message out of an API error body, whatever its shape.
fn api_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    ["detail", "message", "title"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .or_else(|| value.pointer("/error/message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The production LLM client. Wraps the Llama chat-completions API with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// `timeout` bounds every outbound call.
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Makes a raw call to the chat-completions endpoint, returning the full response.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = LlamaRequest {
            model: MODEL,
            messages: request.wire_messages(),
            max_completion_tokens: request.max_tokens.unwrap_or(MAX_TOKENS),
            temperature: request.temperature,
            response_format: request.json_schema.as_ref().map(|schema| ResponseFormat {
                format_type: "json_schema",
                json_schema: schema,
            }),
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error_message(&body),
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: stop_reason={:?}, prompt_tokens={:?}, completion_tokens={:?}",
                llm_response
                    .completion_message
                    .as_ref()
                    .and_then(|m| m.stop_reason.as_deref()),
                llm_response.metric("num_prompt_tokens"),
                llm_response.metric("num_completion_tokens")
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let response = self.call(&request).await?;
        response.text().ok_or(LlmError::EmptyContent)
    }
}
