//! One live, initialized connection to an MCP server.

use rust_mcp_schema::schema_utils::{NotificationFromClient, RequestFromClient};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, InitializeRequestParams, InitializeResult,
    ListToolsResult,
};
use serde_json::{Map, Value};

use crate::mcp::transport::{parse_initialize_result, parse_response, McpTransport};
use crate::mcp::McpError;

/// A session owns its transport exclusively; the manager releases both
/// through [`McpSession::shutdown`].
pub struct McpSession {
    transport: Box<dyn McpTransport>,
    server_details: InitializeResult,
}

impl McpSession {
    /// Performs the protocol handshake. The session is live only after the
    /// server has answered `initialize` and the `initialized` notification
    /// has been sent.
    pub async fn initialize(
        mut transport: Box<dyn McpTransport>,
        params: InitializeRequestParams,
    ) -> Result<Self, McpError> {
        let response = transport
            .send_request(RequestFromClient::InitializeRequest(params))
            .await?;
        let server_details = parse_initialize_result(response)?;
        transport
            .send_notification(NotificationFromClient::InitializedNotification(None))
            .await?;
        Ok(Self {
            transport,
            server_details,
        })
    }

    pub fn server_details(&self) -> &InitializeResult {
        &self.server_details
    }

    pub async fn list_tools(&mut self) -> Result<ListToolsResult, McpError> {
        let response = self
            .transport
            .send_request(RequestFromClient::ListToolsRequest(None))
            .await?;
        parse_response(response)
    }

    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let mut params = CallToolRequestParams::new(name);
        if let Some(arguments) = arguments {
            params = params.with_arguments(arguments);
        }
        let response = self
            .transport
            .send_request(RequestFromClient::CallToolRequest(params))
            .await?;
        parse_response(response)
    }

    pub async fn shutdown(&mut self) {
        self.transport.shutdown().await;
    }
}
