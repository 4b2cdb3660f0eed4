//! Model Context Protocol integration: transports, sessions, and the
//! session manager that aggregates and routes tool calls.

pub mod manager;
pub mod session;
pub mod transport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    /// Configuration named a transport this build does not speak. Fatal to
    /// that single connect attempt only.
    #[error("Unknown transport: {0}")]
    UnknownTransport(String),
    #[error("Failed to connect to MCP server {server}: {reason}")]
    Connect { server: String, reason: String },
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("Tool {0} not found on any connected MCP server")]
    ToolNotFound(String),
    #[error("Tool {tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },
}
