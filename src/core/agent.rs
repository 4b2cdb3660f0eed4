//! The agent loop: drives one user turn from the freshly appended user
//! message to a final assistant message with no outstanding tool requests.
//!
//! Mode selection is a deliberate trade-off: with no tools available the
//! turn streams (text renders as it arrives), but when tools are present the
//! turn uses buffered generation so the structured `tool_calls` payload
//! arrives atomically.

use tracing::debug;

use crate::api::client::{ApiError, LlmClient, StreamEvent};
use crate::api::{ChatMessage, ToolDefinition};
use crate::mcp::manager::{tool_result_text, McpManager};

/// Upper bound on generate/execute rounds within a single turn, so a model
/// that requests tools forever cannot spin the loop indefinitely.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// What the loop produced for one user turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Final assistant text (already appended to history).
    pub content: String,
    /// True when the text was already rendered incrementally via `on_chunk`.
    pub streamed: bool,
    /// Number of generation rounds the turn took.
    pub rounds: usize,
}

/// Runs one full agent turn against `history`, which must end with the
/// user's message. Appends every assistant and tool message it produces.
///
/// Tool execution failures never escape: they become tool-result content so
/// the model can see and react to them. Only LLM transport failures abort
/// the turn.
pub async fn run_turn(
    client: &dyn LlmClient,
    manager: &mut McpManager,
    history: &mut Vec<ChatMessage>,
    on_chunk: &mut dyn FnMut(&str),
) -> Result<TurnOutcome, ApiError> {
    let descriptors = manager.get_all_tools().await;
    let tools: Vec<ToolDefinition> = descriptors
        .into_iter()
        .map(|descriptor| descriptor.definition)
        .collect();

    if tools.is_empty() {
        return stream_turn(client, history, on_chunk).await;
    }

    let mut rounds = 0;
    loop {
        rounds += 1;
        let response = client.send_request(history, &tools).await?;
        let tool_calls = response.tool_calls;

        // An assistant message carrying tool_calls must be answered by
        // matching tool messages before the next request, so the round-limit
        // bail-out records the message without its tool requests.
        let at_limit = !tool_calls.is_empty() && rounds >= MAX_TOOL_ROUNDS;
        history.push(ChatMessage {
            role: "assistant".to_string(),
            content: response.content.clone(),
            name: None,
            tool_call_id: None,
            tool_calls: (!tool_calls.is_empty() && !at_limit).then(|| tool_calls.clone()),
        });

        if tool_calls.is_empty() || at_limit {
            if at_limit {
                debug!(rounds, "Tool round limit reached; ending turn");
            }
            return Ok(TurnOutcome {
                content: response.content,
                streamed: false,
                rounds,
            });
        }

        // Sequential by design: one tool at a time, results folded back into
        // history before the next generation round.
        for payload in &tool_calls {
            let call = payload.normalize();
            debug!(tool = %call.name, call_id = %call.id, "Executing tool call");
            let result_text = match manager.execute_tool(&call.name, &call.arguments).await {
                Ok(result) => tool_result_text(&result),
                Err(err) => err.to_string(),
            };
            history.push(ChatMessage::tool_result(&call.id, &call.name, result_text));
        }
    }
}

async fn stream_turn(
    client: &dyn LlmClient,
    history: &mut Vec<ChatMessage>,
    on_chunk: &mut dyn FnMut(&str),
) -> Result<TurnOutcome, ApiError> {
    let mut rx = client.stream_request(history, &[]).await?;
    let mut content = String::new();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk(chunk) => {
                on_chunk(&chunk);
                content.push_str(&chunk);
            }
            StreamEvent::Error(err) => {
                // Surface mid-stream failures inline; the turn still ends
                // with a well-formed assistant message.
                let notice = format!("\n[{err}]");
                on_chunk(&notice);
                content.push_str(&notice);
            }
            StreamEvent::End => break,
        }
    }

    history.push(ChatMessage::assistant(content.clone()));
    Ok(TurnOutcome {
        content,
        streamed: true,
        rounds: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResponse, FunctionCall, ToolCallPayload};
    use crate::mcp::transport::McpTransport;
    use crate::mcp::McpError;
    use async_trait::async_trait;
    use rust_mcp_schema::schema_utils::{
        NotificationFromClient, RequestFromClient, ServerMessage,
    };
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// LLM client with a scripted sequence of responses.
    struct ScriptedClient {
        responses: Mutex<Vec<ApiResponse>>,
        stream_chunks: Vec<String>,
    }

    impl ScriptedClient {
        fn with_responses(responses: Vec<ApiResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                stream_chunks: Vec::new(),
            }
        }

        fn with_stream(chunks: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                stream_chunks: chunks.into_iter().map(str::to_string).collect(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn send_request(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ApiResponse, ApiError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ApiError::Decode("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }

        async fn stream_request(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ApiError> {
            let (tx, rx) = mpsc::unbounded_channel();
            for chunk in &self.stream_chunks {
                let _ = tx.send(StreamEvent::Chunk(chunk.clone()));
            }
            let _ = tx.send(StreamEvent::End);
            Ok(rx)
        }
    }

    /// Transport advertising a single calculator tool that returns "5".
    struct CalculatorTransport;

    #[async_trait]
    impl McpTransport for CalculatorTransport {
        async fn send_request(
            &mut self,
            request: RequestFromClient,
        ) -> Result<ServerMessage, McpError> {
            let result = match request {
                RequestFromClient::InitializeRequest(_) => json!({
                    "capabilities": {"tools": {}},
                    "protocolVersion": "2025-11-25",
                    "serverInfo": {"name": "calc", "version": "0.0.1"}
                }),
                RequestFromClient::ListToolsRequest(_) => json!({
                    "tools": [{
                        "name": "calculator.add",
                        "description": "Add two numbers",
                        "inputSchema": {"type": "object"}
                    }]
                }),
                RequestFromClient::CallToolRequest(_) => json!({
                    "content": [{"type": "text", "text": "5"}]
                }),
                _ => return Err(McpError::Protocol("unexpected request".to_string())),
            };
            Ok(serde_json::from_value(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "result": result
            }))
            .unwrap())
        }

        async fn send_notification(
            &mut self,
            _notification: NotificationFromClient,
        ) -> Result<(), McpError> {
            Ok(())
        }

        async fn shutdown(&mut self) {}
    }

    async fn calculator_manager() -> McpManager {
        let mut manager = McpManager::new();
        manager
            .connect_with_transport("calc", Box::new(CalculatorTransport))
            .await
            .unwrap();
        manager
    }

    fn tool_call_response(id: &str, name: &str, arguments: &str) -> ApiResponse {
        ApiResponse {
            content: String::new(),
            tool_calls: vec![ToolCallPayload::Function {
                id: id.to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }],
        }
    }

    fn text_response(content: &str) -> ApiResponse {
        ApiResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_tool_list_streams_the_response() {
        let client = ScriptedClient::with_stream(vec!["Hel", "lo"]);
        let mut manager = McpManager::new();
        let mut history = vec![ChatMessage::user("hi")];
        let mut rendered = String::new();

        let outcome = run_turn(&client, &mut manager, &mut history, &mut |chunk| {
            rendered.push_str(chunk)
        })
        .await
        .unwrap();

        assert!(outcome.streamed);
        assert_eq!(outcome.content, "Hello");
        assert_eq!(rendered, "Hello");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test]
    async fn tool_round_trip_folds_result_into_history() {
        // "add 2 and 3": one tool round, then a final text answer.
        let client = ScriptedClient::with_responses(vec![
            tool_call_response("call-1", "calculator.add", r#"{"a":2,"b":3}"#),
            text_response("2 + 3 = 5"),
        ]);
        let mut manager = calculator_manager().await;
        let mut history = vec![ChatMessage::user("add 2 and 3")];

        let outcome = run_turn(&client, &mut manager, &mut history, &mut |_| {})
            .await
            .unwrap();

        assert!(!outcome.streamed);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.content, "2 + 3 = 5");

        // user, assistant(tool_calls), tool, assistant(final)
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].role, "assistant");
        assert!(history[1].tool_calls.is_some());
        assert_eq!(history[2].role, "tool");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(history[2].name.as_deref(), Some("calculator.add"));
        assert_eq!(history[2].content, "5");
        assert_eq!(history[3].role, "assistant");
    }

    #[tokio::test]
    async fn failed_tool_execution_becomes_tool_result_content() {
        let client = ScriptedClient::with_responses(vec![
            tool_call_response("call-1", "no.such.tool", "{}"),
            text_response("that tool is unavailable"),
        ]);
        let mut manager = calculator_manager().await;
        let mut history = vec![ChatMessage::user("use a missing tool")];

        let outcome = run_turn(&client, &mut manager, &mut history, &mut |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.content, "that tool is unavailable");
        assert_eq!(history[2].role, "tool");
        assert!(history[2].content.contains("not found"));
    }

    #[tokio::test]
    async fn round_limit_caps_a_tool_hungry_model() {
        let responses = (0..MAX_TOOL_ROUNDS + 2)
            .map(|i| tool_call_response(&format!("call-{i}"), "calculator.add", "{}"))
            .collect();
        let client = ScriptedClient::with_responses(responses);
        let mut manager = calculator_manager().await;
        let mut history = vec![ChatMessage::user("loop forever")];

        let outcome = run_turn(&client, &mut manager, &mut history, &mut |_| {})
            .await
            .unwrap();

        assert_eq!(outcome.rounds, MAX_TOOL_ROUNDS);

        // The capped turn must leave history well-formed: no trailing
        // assistant message with tool requests nothing answered.
        let last = history.last().unwrap();
        assert_eq!(last.role, "assistant");
        assert!(last.tool_calls.is_none());
    }
}
