//! Shared MCP transport abstractions.
//!
//! Implementations normalize protocol differences between locally spawned
//! stdio servers and remote SSE servers so the session layer can drive both
//! through one contract.

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{NotificationFromClient, RequestFromClient, ServerMessage};
use rust_mcp_schema::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult, RpcError,
    LATEST_PROTOCOL_VERSION,
};

use crate::core::config::data::ServerConfig;
use crate::mcp::McpError;

pub mod sse;
pub mod stdio;

/// Supported transport backends.
///
/// - [`TransportKind::Stdio`] for locally spawned subprocesses.
/// - [`TransportKind::Sse`] for remote servers over HTTP server-sent events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Sse,
}

impl TransportKind {
    pub fn from_config(config: &ServerConfig) -> Result<Self, McpError> {
        match config.transport.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            other => Err(McpError::UnknownTransport(other.to_string())),
        }
    }
}

/// Transport contract required by session initialize and operation flows.
#[async_trait]
pub trait McpTransport: Send {
    async fn send_request(&mut self, request: RequestFromClient)
        -> Result<ServerMessage, McpError>;

    async fn send_notification(
        &mut self,
        notification: NotificationFromClient,
    ) -> Result<(), McpError>;

    /// Releases the underlying process or stream. Must be safe to call more
    /// than once and on transports that never fully connected.
    async fn shutdown(&mut self);
}

/// Initialize parameters identifying this client to a server.
pub fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "attache".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Attache MCP Client".to_string()),
            description: None,
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    }
}

pub(crate) fn parse_initialize_result(
    message: ServerMessage,
) -> Result<InitializeResult, McpError> {
    let result: InitializeResult = parse_response(message)?;
    if result.protocol_version.trim().is_empty() {
        return Err(McpError::Protocol(
            "Unexpected initialize response.".to_string(),
        ));
    }
    Ok(result)
}

pub(crate) fn parse_response<T: serde::de::DeserializeOwned>(
    message: ServerMessage,
) -> Result<T, McpError> {
    match message {
        ServerMessage::Response(response) => {
            let value = serde_json::to_value(&response.result)
                .map_err(|err| McpError::Protocol(err.to_string()))?;
            serde_json::from_value::<T>(value).map_err(|err| McpError::Protocol(err.to_string()))
        }
        ServerMessage::Error(error) => Err(McpError::Protocol(format_rpc_error(&error.error))),
        other => Err(McpError::Protocol(format!(
            "Unexpected server message: {:?}",
            message_kind(&other)
        ))),
    }
}

pub(crate) fn format_rpc_error(error: &RpcError) -> String {
    format!("Server error {}: {}", error.code, error.message)
}

fn message_kind(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Request(_) => "request",
        ServerMessage::Notification(_) => "notification",
        ServerMessage::Response(_) => "response",
        ServerMessage::Error(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(transport: &str) -> ServerConfig {
        ServerConfig {
            name: "alpha".to_string(),
            command: "server".to_string(),
            args: Vec::new(),
            env: None,
            transport: transport.to_string(),
        }
    }

    #[test]
    fn transport_kind_parses_known_values() {
        assert_eq!(
            TransportKind::from_config(&config("stdio")).unwrap(),
            TransportKind::Stdio
        );
        assert_eq!(
            TransportKind::from_config(&config("SSE")).unwrap(),
            TransportKind::Sse
        );
    }

    #[test]
    fn unknown_transport_is_a_configuration_error() {
        let err = TransportKind::from_config(&config("websocket")).unwrap_err();
        assert!(matches!(err, McpError::UnknownTransport(_)));
        assert!(err.to_string().contains("Unknown transport"));
    }

    #[test]
    fn parse_initialize_rejects_blank_protocol_version() {
        let message = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "capabilities": {},
                "protocolVersion": " ",
                "serverInfo": {"name": "x", "version": "1.0.0"}
            }
        }))
        .expect("message should parse");

        assert!(parse_initialize_result(message).is_err());
    }

    #[test]
    fn rpc_errors_surface_code_and_message() {
        let message: ServerMessage = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .expect("message should parse");

        let err = parse_response::<InitializeResult>(message).unwrap_err();
        assert!(err.to_string().contains("-32601"));
    }
}
