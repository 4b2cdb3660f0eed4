//! SSE transport: JSON-RPC posted to a remote MCP server over HTTP, with
//! responses arriving either as plain JSON or as a server-sent event stream.

use async_trait::async_trait;
use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use tracing::debug;

use crate::core::config::data::ServerConfig;
use crate::mcp::transport::McpTransport;
use crate::mcp::McpError;

const JSON_CONTENT_TYPE: &str = "application/json";
const JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const SESSION_ID_HEADER: &str = "mcp-session-id";

pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    server_name: String,
    session_id: Option<String>,
    negotiated_protocol_version: Option<String>,
    next_request_id: i64,
}

impl SseTransport {
    /// Builds a transport for `config.command` interpreted as a URL. No I/O
    /// happens until the initialize request is sent.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.command.clone(),
            server_name: config.name.clone(),
            session_id: None,
            negotiated_protocol_version: None,
            next_request_id: 0,
        }
    }

    async fn post_message(&mut self, message: &ClientMessage) -> Result<reqwest::Response, McpError> {
        let payload =
            serde_json::to_string(message).map_err(|err| McpError::Protocol(err.to_string()))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Accept", JSON_AND_SSE_ACCEPT)
            .body(payload);

        if let Some(version) = &self.negotiated_protocol_version {
            request = request.header(PROTOCOL_VERSION_HEADER, version);
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_ID_HEADER, session_id);
        }

        let response = request
            .send()
            .await
            .map_err(|err| McpError::Protocol(err.to_string()))?;

        // Servers assign a session on initialize; replay it on every
        // subsequent request.
        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }

        if !response.status().is_success() {
            return Err(McpError::Protocol(format!(
                "MCP server returned HTTP {}",
                response.status()
            )));
        }

        Ok(response)
    }

    fn record_negotiated_version(&mut self, message: &ServerMessage) {
        if let ServerMessage::Response(response) = message {
            let version = serde_json::to_value(&response.result)
                .ok()
                .and_then(|value| {
                    value
                        .get("protocolVersion")
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                });
            if let Some(version) = version {
                debug!(server = %self.server_name, protocol_version = %version, "Negotiated MCP protocol version");
                self.negotiated_protocol_version = Some(version);
            }
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(
        &mut self,
        request: RequestFromClient,
    ) -> Result<ServerMessage, McpError> {
        let request_id = RequestId::Integer(self.next_request_id);
        self.next_request_id += 1;

        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id),
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;

        let response = self.post_message(&message).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let message = if is_event_stream(&content_type) {
            next_sse_server_message(response).await?
        } else {
            let body = response
                .text()
                .await
                .map_err(|err| McpError::Protocol(err.to_string()))?;
            serde_json::from_str::<ServerMessage>(&body)
                .map_err(|err| McpError::Protocol(err.to_string()))?
        };

        self.record_negotiated_version(&message);
        Ok(message)
    }

    async fn send_notification(
        &mut self,
        notification: NotificationFromClient,
    ) -> Result<(), McpError> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;
        self.post_message(&message).await?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        // Stateless over HTTP: dropping the session id is all teardown needs.
        self.session_id = None;
    }
}

fn is_event_stream(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    media_type.eq_ignore_ascii_case("text/event-stream")
}

/// Reads the event stream until the first response or error message,
/// buffering partial lines across chunk boundaries.
async fn next_sse_server_message(response: reqwest::Response) -> Result<ServerMessage, McpError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| McpError::Protocol(err.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = buffer.find('\n') {
            let line = buffer[..newline].trim().to_string();
            buffer.drain(..=newline);
            if let Some(message) = decode_sse_line(&line)? {
                return Ok(message);
            }
        }
    }

    // Stream ended; the last line may lack a trailing newline.
    if let Some(message) = decode_sse_line(buffer.trim())? {
        return Ok(message);
    }
    Err(McpError::Protocol("Empty event-stream response.".to_string()))
}

/// Decodes one SSE line, keeping only response and error messages. Event
/// names, comments, and server-initiated traffic yield `None`.
fn decode_sse_line(line: &str) -> Result<Option<ServerMessage>, McpError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }

    let message = serde_json::from_str::<ServerMessage>(payload)
        .map_err(|err| McpError::Protocol(err.to_string()))?;
    if matches!(
        message,
        ServerMessage::Response(_) | ServerMessage::Error(_)
    ) {
        Ok(Some(message))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_decode_to_server_messages() {
        let decoded =
            decode_sse_line(r#"data: {"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(decoded, Some(ServerMessage::Response(_))));

        let decoded =
            decode_sse_line(r#"data: {"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nope"}}"#)
                .unwrap();
        assert!(matches!(decoded, Some(ServerMessage::Error(_))));
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert!(decode_sse_line("event: message").unwrap().is_none());
        assert!(decode_sse_line(": keepalive").unwrap().is_none());
        assert!(decode_sse_line("data:").unwrap().is_none());
    }

    #[test]
    fn malformed_data_payload_is_a_protocol_error() {
        assert!(decode_sse_line("data: not json").is_err());
    }

    #[test]
    fn event_stream_content_type_matches_with_parameters() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("text/event-stream; charset=utf-8"));
        assert!(is_event_stream("TEXT/EVENT-STREAM"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream(""));
    }
}
