//! Stdio transport: a locally spawned MCP server speaking line-delimited
//! JSON-RPC over its stdin/stdout.

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::core::config::data::ServerConfig;
use crate::mcp::transport::McpTransport;
use crate::mcp::McpError;

const REQUEST_TIMEOUT_SECONDS: u64 = 30;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ServerMessage>>>>;

pub struct StdioTransport {
    child: Option<Child>,
    stdin: ChildStdin,
    pending: PendingMap,
    next_request_id: i64,
    server_name: String,
}

impl StdioTransport {
    /// Spawns the configured server process and wires its pipes.
    ///
    /// The child inherits the parent environment; `config.env` entries are
    /// merged on top as overrides.
    pub fn spawn(config: &ServerConfig) -> Result<Self, McpError> {
        let connect_err = |reason: String| McpError::Connect {
            server: config.name.clone(),
            reason,
        };

        debug!(command = %config.command, args = ?config.args, "Starting MCP stdio server");
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        if let Some(env) = &config.env {
            cmd.envs(env);
        }

        let mut child = cmd.spawn().map_err(|err| connect_err(err.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| connect_err("Unable to retrieve stdin.".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| connect_err("Unable to retrieve stdout.".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| connect_err("Unable to retrieve stderr.".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        Self::spawn_stdout_reader(pending.clone(), stdout, config.name.clone());
        Self::spawn_stderr_drain(stderr);

        Ok(Self {
            child: Some(child),
            stdin,
            pending,
            next_request_id: 0,
            server_name: config.name.clone(),
        })
    }

    fn spawn_stdout_reader(
        pending: PendingMap,
        stdout: tokio::process::ChildStdout,
        server_name: String,
    ) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let message = match serde_json::from_str::<ServerMessage>(&line) {
                    Ok(message) => message,
                    Err(_) => continue,
                };
                match message {
                    ServerMessage::Response(_) | ServerMessage::Error(_) => {
                        let id = match &message {
                            ServerMessage::Response(response) => Some(response.id.clone()),
                            ServerMessage::Error(error) => error.id.clone(),
                            _ => None,
                        };
                        if let Some(id) = id {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(message);
                            }
                        }
                    }
                    ServerMessage::Request(_) | ServerMessage::Notification(_) => {
                        // Server-initiated traffic is out of scope; drop it.
                        debug!(server = %server_name, "Ignoring server-initiated MCP message");
                    }
                }
            }
            // Stream closed: fail anything still waiting.
            pending.lock().await.clear();
        });
    }

    fn spawn_stderr_drain(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(_)) = reader.next_line().await {}
        });
    }

    async fn write_line(&mut self, payload: &str) -> Result<(), McpError> {
        let io_err =
            |err: std::io::Error| McpError::Protocol(format!("stdio write failed: {err}"));
        self.stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(io_err)?;
        self.stdin.write_all(b"\n").await.map_err(io_err)?;
        self.stdin.flush().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(
        &mut self,
        request: RequestFromClient,
    ) -> Result<ServerMessage, McpError> {
        let request_id = RequestId::Integer(self.next_request_id);
        self.next_request_id += 1;

        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(request_id.clone()),
        )
        .map_err(|err| McpError::Protocol(err.to_string()))?;
        let payload =
            serde_json::to_string(&message).map_err(|err| McpError::Protocol(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        debug!(server = %self.server_name, request_id = ?request_id, "Sending MCP stdio request");
        self.write_line(&payload).await?;

        let timeout = tokio::time::Duration::from_secs(REQUEST_TIMEOUT_SECONDS);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(McpError::Protocol(
                "MCP stdio response channel closed.".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(McpError::Protocol("MCP stdio request timed out.".to_string()))
            }
        }
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
        let payload =
            serde_json::to_string(&message).map_err(|err| McpError::Protocol(err.to_string()))?;
        self.write_line(&payload).await
    }

    async fn shutdown(&mut self) {
        self.pending.lock().await.clear();
        if let Some(mut child) = self.child.take() {
            debug!(server = %self.server_name, "Stopping MCP stdio server");
            let _ = child.start_kill();
        }
    }
}
