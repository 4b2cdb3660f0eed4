//! The session manager: connects to configured MCP servers, aggregates their
//! tool schemas, and routes tool calls to the owning session.

use rust_mcp_schema::CallToolResult;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ToolDefinition;
use crate::core::config::data::{Config, ServerConfig};
use crate::mcp::session::McpSession;
use crate::mcp::transport::sse::SseTransport;
use crate::mcp::transport::stdio::StdioTransport;
use crate::mcp::transport::{client_details, McpTransport, TransportKind};
use crate::mcp::McpError;

/// A flattened tool schema plus the name of the session advertising it. The
/// back-reference is informational, never an ownership edge.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub server: String,
}

/// Owns every live session. Sessions are stored in connect order, which
/// doubles as the router's iteration order and (reversed) the teardown order.
#[derive(Default)]
pub struct McpManager {
    sessions: Vec<(String, McpSession)>,
}

impl McpManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.sessions.iter().any(|(n, _)| n == name)
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.sessions.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Connects one server. Idempotent: a second connect for an
    /// already-connected name is a no-op.
    pub async fn connect_server(&mut self, config: &ServerConfig) -> Result<(), McpError> {
        if self.is_connected(&config.name) {
            return Ok(());
        }

        let transport: Box<dyn McpTransport> = match TransportKind::from_config(config)? {
            TransportKind::Stdio => Box::new(StdioTransport::spawn(config)?),
            TransportKind::Sse => Box::new(SseTransport::new(config)),
        };

        self.connect_with_transport(&config.name, transport).await
    }

    /// Handshakes over an already-built transport and registers the session.
    /// Split out so tests can drive the manager with fake transports.
    pub async fn connect_with_transport(
        &mut self,
        name: &str,
        transport: Box<dyn McpTransport>,
    ) -> Result<(), McpError> {
        let session = McpSession::initialize(transport, client_details())
            .await
            .map_err(|err| McpError::Connect {
                server: name.to_string(),
                reason: err.to_string(),
            })?;
        debug!(server = %name, "MCP session established");
        self.sessions.push((name.to_string(), session));
        Ok(())
    }

    /// Connects every configured server. One server failing to connect never
    /// aborts the rest.
    pub async fn connect_all(&mut self, config: &Config) {
        for name in config.list_mcp_servers() {
            let Some(server) = config.get_mcp_server(name) else {
                continue;
            };
            if let Err(err) = self.connect_server(server).await {
                warn!(server = %name, error = %err, "Failed to connect to MCP server");
            }
        }
    }

    /// Flattens every live session's tools into LLM-ready descriptors.
    ///
    /// Rebuilt on demand, never cached. A session whose listing call fails is
    /// logged and skipped so one dead server cannot blank out all tools.
    pub async fn get_all_tools(&mut self) -> Vec<ToolDescriptor> {
        let mut all_tools: Vec<ToolDescriptor> = Vec::new();

        for (name, session) in &mut self.sessions {
            let result = match session.list_tools().await {
                Ok(result) => result,
                Err(err) => {
                    warn!(server = %name, error = %err, "Error listing tools");
                    continue;
                }
            };

            for tool in result.tools {
                if let Some(existing) = all_tools
                    .iter()
                    .find(|d| d.definition.function.name == tool.name)
                {
                    // First advertiser in connect order wins; see DESIGN.md.
                    debug!(
                        tool = %tool.name,
                        winner = %existing.server,
                        shadowed = %name,
                        "Duplicate tool name across MCP servers"
                    );
                    continue;
                }

                let parameters = serde_json::to_value(&tool.input_schema)
                    .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
                all_tools.push(ToolDescriptor {
                    definition: ToolDefinition::function(
                        tool.name.clone(),
                        tool.description.clone(),
                        parameters,
                    ),
                    server: name.clone(),
                });
            }
        }

        all_tools
    }

    /// Routes a tool call to the first session advertising `name` in connect
    /// order. Tool lists are re-queried at execution time so restarts and
    /// dynamic tool sets resolve against live state.
    pub async fn execute_tool(
        &mut self,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<CallToolResult, McpError> {
        let arguments = arguments.as_object().cloned();

        for (name, session) in &mut self.sessions {
            let advertises = match session.list_tools().await {
                Ok(result) => result.tools.iter().any(|tool| tool.name == tool_name),
                Err(_) => continue,
            };
            if !advertises {
                continue;
            }

            debug!(server = %name, tool = %tool_name, "Routing tool call");
            return session
                .call_tool(tool_name, arguments)
                .await
                .map_err(|err| McpError::ToolFailed {
                    tool: tool_name.to_string(),
                    reason: err.to_string(),
                });
        }

        Err(McpError::ToolNotFound(tool_name.to_string()))
    }

    /// Releases every session in reverse acquisition order, then clears the
    /// map. Safe to call repeatedly and with sessions that never fully
    /// connected.
    pub async fn close(&mut self) {
        while let Some((name, mut session)) = self.sessions.pop() {
            debug!(server = %name, "Closing MCP session");
            session.shutdown().await;
        }
    }
}

/// Extracts the human-readable text of a tool result, falling back to the
/// raw JSON when the result carries no text blocks.
pub fn tool_result_text(result: &CallToolResult) -> String {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);
    let texts: Vec<&str> = value
        .get("content")
        .and_then(|content| content.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(|text| text.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        value.to_string()
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::McpTransport;
    use async_trait::async_trait;
    use rust_mcp_schema::schema_utils::{
        NotificationFromClient, RequestFromClient, ServerMessage,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted transport: answers initialize normally, then serves canned
    /// tool lists and call results.
    struct FakeTransport {
        tools: Vec<(&'static str, &'static str)>,
        call_result: Value,
        fail_list: bool,
        shutdowns: Arc<AtomicUsize>,
        requests_seen: usize,
    }

    impl FakeTransport {
        fn with_tools(tools: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                tools,
                call_result: json!({"content": [{"type": "text", "text": "ok"}]}),
                fail_list: false,
                shutdowns: Arc::new(AtomicUsize::new(0)),
                requests_seen: 0,
            }
        }

        fn response(&self, result: Value) -> ServerMessage {
            serde_json::from_value(json!({
                "jsonrpc": "2.0",
                "id": self.requests_seen as i64,
                "result": result
            }))
            .expect("fake response should parse")
        }

        fn tools_json(&self) -> Value {
            let tools: Vec<Value> = self
                .tools
                .iter()
                .map(|(name, description)| {
                    json!({
                        "name": name,
                        "description": description,
                        "inputSchema": {"type": "object"}
                    })
                })
                .collect();
            json!({"tools": tools})
        }
    }

    #[async_trait]
    impl McpTransport for FakeTransport {
        async fn send_request(
            &mut self,
            request: RequestFromClient,
        ) -> Result<ServerMessage, McpError> {
            self.requests_seen += 1;
            match request {
                RequestFromClient::InitializeRequest(_) => Ok(self.response(json!({
                    "capabilities": {"tools": {}},
                    "protocolVersion": "2025-11-25",
                    "serverInfo": {"name": "fake", "version": "0.0.1"}
                }))),
                RequestFromClient::ListToolsRequest(_) => {
                    if self.fail_list {
                        return Err(McpError::Protocol("listing unavailable".to_string()));
                    }
                    let tools = self.tools_json();
                    Ok(self.response(tools))
                }
                RequestFromClient::CallToolRequest(_) => {
                    let result = self.call_result.clone();
                    Ok(self.response(result))
                }
                _ => Err(McpError::Protocol("unexpected request".to_string())),
            }
        }

        async fn send_notification(
            &mut self,
            _notification: NotificationFromClient,
        ) -> Result<(), McpError> {
            Ok(())
        }

        async fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Transport that records its label into a shared log on shutdown.
    struct OrderedTransport {
        label: &'static str,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl McpTransport for OrderedTransport {
        async fn send_request(
            &mut self,
            request: RequestFromClient,
        ) -> Result<ServerMessage, McpError> {
            match request {
                RequestFromClient::InitializeRequest(_) => Ok(serde_json::from_value(json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "result": {
                        "capabilities": {},
                        "protocolVersion": "2025-11-25",
                        "serverInfo": {"name": self.label, "version": "0.0.1"}
                    }
                }))
                .expect("fake response should parse")),
                _ => Err(McpError::Protocol("unexpected request".to_string())),
            }
        }

        async fn send_notification(
            &mut self,
            _notification: NotificationFromClient,
        ) -> Result<(), McpError> {
            Ok(())
        }

        async fn shutdown(&mut self) {
            self.log.lock().unwrap().push(self.label);
        }
    }

    /// Transport whose handshake always fails.
    struct BrokenTransport;

    #[async_trait]
    impl McpTransport for BrokenTransport {
        async fn send_request(
            &mut self,
            _request: RequestFromClient,
        ) -> Result<ServerMessage, McpError> {
            Err(McpError::Protocol("connection refused".to_string()))
        }

        async fn send_notification(
            &mut self,
            _notification: NotificationFromClient,
        ) -> Result<(), McpError> {
            Err(McpError::Protocol("connection refused".to_string()))
        }

        async fn shutdown(&mut self) {}
    }

    fn stdio_config(name: &str, transport: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            command: "server".to_string(),
            args: Vec::new(),
            env: None,
            transport: transport.to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_transport_fails_with_configuration_error() {
        let mut manager = McpManager::new();
        let err = manager
            .connect_server(&stdio_config("alpha", "carrier-pigeon"))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTransport(_)));
        assert!(manager.server_names().is_empty());
    }

    #[tokio::test]
    async fn connect_with_transport_is_reachable_twice_without_duplicates() {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport(
                "alpha",
                Box::new(FakeTransport::with_tools(vec![("echo", "Echo")])),
            )
            .await
            .unwrap();
        assert!(manager.is_connected("alpha"));

        // connect_server's idempotence guard short-circuits before any
        // transport work.
        manager
            .connect_server(&stdio_config("alpha", "stdio"))
            .await
            .unwrap();
        assert_eq!(manager.server_names(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn failed_handshake_reports_connect_error() {
        let mut manager = McpManager::new();
        let err = manager
            .connect_with_transport("alpha", Box::new(BrokenTransport))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Connect { .. }));
        assert!(!manager.is_connected("alpha"));
    }

    #[tokio::test]
    async fn tools_survive_one_session_failing_to_list() {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport(
                "alpha",
                Box::new(FakeTransport::with_tools(vec![("alpha_tool", "A")])),
            )
            .await
            .unwrap();
        let mut broken = FakeTransport::with_tools(vec![("beta_tool", "B")]);
        broken.fail_list = true;
        manager
            .connect_with_transport("beta", Box::new(broken))
            .await
            .unwrap();
        manager
            .connect_with_transport(
                "gamma",
                Box::new(FakeTransport::with_tools(vec![("gamma_tool", "C")])),
            )
            .await
            .unwrap();

        let tools = manager.get_all_tools().await;
        let names: Vec<&str> = tools
            .iter()
            .map(|d| d.definition.function.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha_tool", "gamma_tool"]);
    }

    #[tokio::test]
    async fn descriptors_use_the_function_wire_shape() {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport(
                "alpha",
                Box::new(FakeTransport::with_tools(vec![("add", "Add numbers")])),
            )
            .await
            .unwrap();

        let tools = manager.get_all_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server, "alpha");
        let value = serde_json::to_value(&tools[0].definition).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "add");
        assert_eq!(value["function"]["description"], "Add numbers");
        assert!(value["function"]["parameters"].is_object());
    }

    #[tokio::test]
    async fn duplicate_tool_names_resolve_to_first_connected_server() {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport(
                "first",
                Box::new(FakeTransport::with_tools(vec![("lookup", "First")])),
            )
            .await
            .unwrap();
        manager
            .connect_with_transport(
                "second",
                Box::new(FakeTransport::with_tools(vec![("lookup", "Second")])),
            )
            .await
            .unwrap();

        let tools = manager.get_all_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].server, "first");
    }

    #[tokio::test]
    async fn unknown_tool_fails_with_not_found() {
        let mut manager = McpManager::new();
        let err = manager
            .execute_tool("unknown", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        manager
            .connect_with_transport(
                "alpha",
                Box::new(FakeTransport::with_tools(vec![("echo", "Echo")])),
            )
            .await
            .unwrap();
        let err = manager
            .execute_tool("still_unknown", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn execute_tool_routes_to_owning_session() {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport(
                "calc",
                Box::new(FakeTransport::with_tools(vec![("add", "Add")])),
            )
            .await
            .unwrap();

        let result = manager
            .execute_tool("add", &json!({"a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(tool_result_text(&result), "ok");
    }

    #[tokio::test]
    async fn close_releases_sessions_and_is_idempotent() {
        let mut manager = McpManager::new();
        let transport = FakeTransport::with_tools(vec![]);
        let shutdowns = transport.shutdowns.clone();
        manager
            .connect_with_transport("alpha", Box::new(transport))
            .await
            .unwrap();

        manager.close().await;
        assert!(manager.server_names().is_empty());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        manager.close().await;
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_releases_sessions_in_reverse_connect_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = McpManager::new();
        for label in ["one", "two", "three"] {
            manager
                .connect_with_transport(
                    label,
                    Box::new(OrderedTransport {
                        label,
                        log: log.clone(),
                    }),
                )
                .await
                .unwrap();
        }
        assert_eq!(manager.server_names(), vec!["one", "two", "three"]);

        manager.close().await;
        assert_eq!(*log.lock().unwrap(), vec!["three", "two", "one"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connect_all_tolerates_one_failing_server() {
        // A minimal stdio MCP server: answer initialize, swallow the rest.
        let script = r#"printf '%s\n' '{"jsonrpc":"2.0","id":0,"result":{"capabilities":{},"protocolVersion":"2025-11-25","serverInfo":{"name":"fake","version":"0"}}}'; cat >/dev/null"#;
        let scripted = |name: &str| ServerConfig {
            name: name.to_string(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: None,
            transport: "stdio".to_string(),
        };

        let mut config = Config::default();
        config.add_mcp_server(scripted("one"));
        config.add_mcp_server(ServerConfig {
            name: "two".to_string(),
            command: "/nonexistent/mcp-server".to_string(),
            args: Vec::new(),
            env: None,
            transport: "stdio".to_string(),
        });
        config.add_mcp_server(scripted("three"));

        let mut manager = McpManager::new();
        manager.connect_all(&config).await;
        assert_eq!(manager.server_names(), vec!["one", "three"]);
        manager.close().await;
    }

    #[test]
    fn tool_result_text_joins_text_blocks() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ]
        }))
        .unwrap();
        assert_eq!(tool_result_text(&result), "line one\nline two");
    }

    #[test]
    fn tool_result_text_falls_back_to_raw_json() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": []
        }))
        .unwrap();
        assert!(tool_result_text(&result).contains("content"));
    }
}
