//! Per-invocation state handed to command bodies.

use std::path::PathBuf;

use crate::api::ChatMessage;
use crate::core::config::{Config, Provider};
use crate::mcp::manager::McpManager;
use crate::utils::git::GitInfo;

/// Everything a command body may read or mutate during one dispatch.
///
/// Constructed fresh per invocation; the history, configuration, and session
/// manager are borrowed from the chat loop that owns them.
pub struct CommandContext<'a> {
    pub history: &'a mut Vec<ChatMessage>,
    pub config: &'a Config,
    pub working_dir: PathBuf,
    pub git: Option<GitInfo>,
    pub manager: &'a mut McpManager,
    provider: Provider,
    exit_requested: bool,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        history: &'a mut Vec<ChatMessage>,
        config: &'a Config,
        provider: Provider,
        working_dir: PathBuf,
        git: Option<GitInfo>,
        manager: &'a mut McpManager,
    ) -> Self {
        Self {
            history,
            config,
            working_dir,
            git,
            manager,
            provider,
            exit_requested: false,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The only sanctioned way to switch providers mid-session.
    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Takes the possibly-switched provider back out after dispatch.
    pub fn into_provider(self) -> Provider {
        self.provider
    }
}
