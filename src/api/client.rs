//! HTTP client for OpenAI-compatible chat-completion endpoints.
//!
//! The agent loop only depends on the [`LlmClient`] trait, so tests swap in
//! fake clients and the HTTP plumbing stays here.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::api::{ApiResponse, ChatMessage, ToolCallPayload, ToolDefinition};
use crate::core::config::data::Provider;
use crate::utils::url::construct_api_url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API request failed with status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to decode API response: {0}")]
    Decode(String),
}

/// One item of a streamed response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    End,
}

/// Narrow contract the agent loop consumes. `stream_request` yields a finite,
/// non-restartable sequence of text chunks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ApiResponse, ApiError>;

    async fn stream_request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ApiError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize)]
struct ChatResponseChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Deserialize)]
struct ChatStreamResponse {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
}

pub struct HttpClient {
    client: reqwest::Client,
    provider: Provider,
}

impl HttpClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    fn build_request(&self, body: &ChatRequest<'_>) -> reqwest::RequestBuilder {
        let url = construct_api_url(&self.provider.base_url, "chat/completions");
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json");

        // Anthropic-mode providers authenticate with x-api-key; everything
        // else gets OpenAI-style bearer auth.
        if self.provider.is_anthropic_mode() {
            request = request
                .header("x-api-key", &self.provider.api_key)
                .header("anthropic-version", "2023-06-01");
        } else {
            request = request.header("Authorization", format!("Bearer {}", self.provider.api_key));
        }

        request.json(body)
    }

    fn chat_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolDefinition],
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.provider.model,
            messages,
            stream,
            tools: (!tools.is_empty()).then_some(tools),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for HttpClient {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ApiResponse, ApiError> {
        let body = self.chat_request(messages, tools, false);
        let response = self.build_request(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Api { status, body });
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(ApiError::Decode("response contained no choices".to_string()));
        };

        Ok(ApiResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }

    async fn stream_request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ApiError> {
        let body = self.chat_request(messages, tools, true);
        let response = self.build_request(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Api { status, body });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut line_buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(StreamEvent::Error(err.to_string()));
                        break;
                    }
                };
                line_buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = line_buffer.find('\n') {
                    let line = line_buffer[..newline].trim().to_string();
                    line_buffer.drain(..=newline);
                    if process_sse_line(&line, &tx) {
                        let _ = tx.send(StreamEvent::End);
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::End);
        });

        Ok(rx)
    }
}

/// Handles one SSE line; returns true when the stream is finished.
fn process_sse_line(line: &str, tx: &mpsc::UnboundedSender<StreamEvent>) -> bool {
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return false;
    };

    if payload == "[DONE]" {
        return true;
    }

    match serde_json::from_str::<ChatStreamResponse>(payload) {
        Ok(response) => {
            if let Some(choice) = response.choices.first() {
                if let Some(content) = &choice.delta.content {
                    let _ = tx.send(StreamEvent::Chunk(content.clone()));
                }
            }
            false
        }
        Err(_) => {
            if payload.trim().is_empty() {
                return false;
            }
            let _ = tx.send(StreamEvent::Error(format!("API error: {payload}")));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_chunks(lines: &[&str]) -> Vec<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for line in lines {
            if process_sse_line(line, &tx) {
                break;
            }
        }
        drop(tx);

        let mut chunks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StreamEvent::Chunk(text) = event {
                chunks.push(text);
            }
        }
        chunks
    }

    #[test]
    fn stream_lines_yield_delta_content() {
        let chunks = collect_chunks(&[
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let chunks = collect_chunks(&["event: ping", ": keepalive", "data: [DONE]"]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn done_marker_ends_the_stream() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(process_sse_line("data: [DONE]", &tx));
        assert!(!process_sse_line(
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            &tx
        ));
    }
}
