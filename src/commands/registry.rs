//! Command registration and lookup.
//!
//! The registry is an explicit object constructed once at startup and passed
//! by reference wherever commands are dispatched or introspected. Nothing in
//! the crate reaches for a process-global command table.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::commands::context::CommandContext;

/// A slash command: metadata consulted during validation plus an async body.
///
/// Bodies return `Ok(text)` to print on success or `Err(message)` for a
/// handled failure; the dispatcher wraps the error into a user-facing string.
#[async_trait]
pub trait SlashCommand: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn category(&self) -> &'static str {
        "General"
    }

    fn min_args(&self) -> usize {
        0
    }

    /// `None` means unbounded.
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn requires_git_repo(&self) -> bool {
        false
    }

    /// Command-specific argument validation, run after arity checks.
    fn validate_args(&self, _args: &[String]) -> Result<(), String> {
        Ok(())
    }

    async fn execute(
        &self,
        args: &[String],
        registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String>;
}

/// Holds every registered command, in registration order, plus the alias map.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Box<dyn SlashCommand>>,
    aliases: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. Names are unique: a second registration under an
    /// existing name is logged and dropped, keeping the first.
    pub fn register(&mut self, command: Box<dyn SlashCommand>) {
        if self.get(command.name()).is_some() {
            debug!(name = command.name(), "Command already registered; skipping");
            return;
        }
        for alias in command.aliases() {
            if let Some(previous) = self
                .aliases
                .insert((*alias).to_string(), command.name().to_string())
            {
                debug!(alias, previous = %previous, "Alias re-registered");
            }
        }
        self.commands.push(command);
    }

    /// Looks up a command by canonical name only; resolve aliases first.
    pub fn get(&self, name: &str) -> Option<&dyn SlashCommand> {
        self.commands
            .iter()
            .find(|command| command.name() == name)
            .map(|command| command.as_ref())
    }

    /// Maps an alias to its canonical name; unknown names pass through.
    pub fn resolve_alias(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Commands in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &dyn SlashCommand> {
        self.commands.iter().map(|command| command.as_ref())
    }

    /// Union of canonical names and aliases, for fuzzy suggestions.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .map(|command| command.name().to_string())
            .collect();
        names.extend(self.aliases.keys().cloned());
        names
    }
}
