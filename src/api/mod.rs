//! Chat payload shapes shared between the LLM client and the agent loop.
//!
//! Tool-call payloads arrive in two vendor wire shapes: the OpenAI
//! `"function"` shape carries arguments as a JSON string, while the Anthropic
//! `"tool_use"` shape carries structured input. Both normalize into the one
//! internal [`ToolCall`] before routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod client;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Builds the tool-result message that answers one assistant tool call.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Vendor wire shape of a single requested tool invocation.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallPayload {
    /// OpenAI shape: arguments arrive as a JSON-encoded string.
    Function {
        id: String,
        function: FunctionCall,
    },
    /// Anthropic shape: input arrives already structured.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Normalized tool invocation handed to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallPayload {
    /// Flattens either vendor shape into a [`ToolCall`].
    ///
    /// An OpenAI arguments string that fails to parse yields an empty object
    /// rather than an error; the tool itself reports bad arguments.
    pub fn normalize(&self) -> ToolCall {
        match self {
            ToolCallPayload::Function { id, function } => {
                let arguments = serde_json::from_str::<Value>(&function.arguments)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                ToolCall {
                    id: id.clone(),
                    name: function.name.clone(),
                    arguments,
                }
            }
            ToolCallPayload::ToolUse { id, name, input } => ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            },
        }
    }
}

/// Tool descriptor in the shape LLM clients expect:
/// `{"type":"function","function":{name, description, parameters}}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: String, description: Option<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolFunction {
                name,
                description,
                parameters,
            },
        }
    }
}

/// One complete (non-streamed) model response.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallPayload>,
}
