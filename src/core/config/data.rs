//! Persisted configuration: LLM providers and MCP tool servers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Authentication mode; `"anthropic"` switches to x-api-key headers.
    pub mode: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Provider {
    pub fn is_anthropic_mode(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("anthropic"))
    }
}

/// One configured MCP server. Immutable once handed to a connect call.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub name: String,
    /// Executable path for stdio transport, URL for sse transport.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides merged over the parent process environment.
    pub env: Option<HashMap<String, String>>,
    pub transport: String,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub mcp_servers: Vec<ServerConfig>,
}

impl Config {
    pub fn get_provider(&self, name: &str) -> Option<&Provider> {
        self.providers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// The provider named by `default_provider`, falling back to the first
    /// configured one.
    pub fn current_provider(&self) -> Option<&Provider> {
        self.default_provider
            .as_deref()
            .and_then(|name| self.get_provider(name))
            .or_else(|| self.providers.first())
    }

    pub fn list_providers(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn add_provider(&mut self, provider: Provider) {
        self.remove_provider(&provider.name);
        self.providers.push(provider);
    }

    pub fn remove_provider(&mut self, name: &str) {
        self.providers.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    pub fn get_mcp_server(&self, name: &str) -> Option<&ServerConfig> {
        self.mcp_servers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Server names in config file order. Connection and tool-routing order
    /// follow this ordering.
    pub fn list_mcp_servers(&self) -> Vec<&str> {
        self.mcp_servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn add_mcp_server(&mut self, server: ServerConfig) {
        self.remove_mcp_server(&server.name);
        self.mcp_servers.push(server);
    }

    pub fn remove_mcp_server(&mut self, name: &str) {
        self.mcp_servers
            .retain(|s| !s.name.eq_ignore_ascii_case(name));
    }
}
