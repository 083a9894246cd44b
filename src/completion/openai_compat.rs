//! OpenAI-compatible completion client
//!
//! Works with any API that implements the OpenAI chat completions format
//! (OpenAI, Groq, vLLM, LM Studio, LocalAI, ...).
//!
//! # Configuration
//!
//! ```toml
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! temperature = 0.7
//! max_tokens = 2048
//! ```

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{stream as futures_stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationMessage;

use super::{CompletionClient, CompletionError, DeltaStream};

/// Wire-format chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(msg: &ConversationMessage) -> Self {
        Self::new(msg.role.as_str(), &msg.content)
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// One `data:` payload of a streamed completion
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint
pub struct OpenAICompatClient {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatClient {
    pub fn new(config: OpenAICompatConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAICompatConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request<'a>(
        &'a self,
        history: &[ConversationMessage],
        new_turn: &str,
        system_prompt: &str,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages: build_messages(system_prompt, history, new_turn),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }

    async fn send(
        &self,
        credential: &str,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<reqwest::Response, CompletionError> {
        tracing::debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), "Completion request failed: {}", detail);
            return Err(CompletionError::RequestFailed {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatClient {
    async fn complete(
        &self,
        credential: &str,
        history: &[ConversationMessage],
        new_turn: &str,
        system_prompt: &str,
    ) -> Result<String, CompletionError> {
        let request = self.request(history, new_turn, system_prompt, false);
        let response = self.send(credential, &request).await?;
        let body = response.text().await?;
        parse_completion(&body)
    }

    async fn complete_stream(
        &self,
        credential: &str,
        history: &[ConversationMessage],
        new_turn: &str,
        system_prompt: &str,
    ) -> Result<DeltaStream, CompletionError> {
        let request = self.request(history, new_turn, system_prompt, true);
        let response = self.send(credential, &request).await?;
        // A closing blank line flushes a final event the server left unterminated
        let mut events = Box::pin(
            response
                .bytes_stream()
                .chain(futures_stream::iter([Ok("\n\n".into())]))
                .eventsource(),
        );

        let deltas = stream! {
            while let Some(event) = events.next().await {
                let data = match event {
                    Ok(event) => event.data,
                    Err(EventStreamError::Transport(e)) => {
                        yield Err(CompletionError::Transport(e));
                        return;
                    }
                    Err(e) => {
                        yield Err(CompletionError::MalformedResponse(format!("invalid event stream: {}", e)));
                        return;
                    }
                };

                let data = data.trim();
                if data == STREAM_DONE {
                    return;
                }
                match parse_chunk(data) {
                    Ok(Some(text)) => {
                        yield Ok(text);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(deltas))
    }
}

/// System prompt first, then history in order, new user turn last.
fn build_messages(
    system_prompt: &str,
    history: &[ConversationMessage],
    new_turn: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new("system", system_prompt));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::new("user", new_turn));
    messages
}

fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let completion: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("failed to parse response: {}", e)))?;

    if let Some(usage) = &completion.usage {
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Completion usage"
        );
    }

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".to_string()))?;

    if let Some(reason) = &choice.finish_reason {
        tracing::debug!(finish_reason = %reason, "Completion finished");
    }

    choice.message.content.ok_or_else(|| {
        CompletionError::MalformedResponse("first choice has no text content".to_string())
    })
}

const STREAM_DONE: &str = "[DONE]";

/// Text delta carried by one streamed event, if any.
fn parse_chunk(data: &str) -> Result<Option<String>, CompletionError> {
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| CompletionError::MalformedResponse(format!("failed to parse stream chunk: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}
