//! Builtin slash commands.

use async_trait::async_trait;
use serde_json::to_string_pretty;

use crate::commands::context::CommandContext;
use crate::commands::registry::{CommandRegistry, SlashCommand};

/// Registers every builtin command on `registry`. Called once at startup.
pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(Box::new(HelpCommand));
    registry.register(Box::new(ExitCommand));
    registry.register(Box::new(ClearCommand));
    registry.register(Box::new(HistoryCommand));
    registry.register(Box::new(SaveCommand));
    registry.register(Box::new(ProviderCommand));
    registry.register(Box::new(ToolsCommand));
    registry.register(Box::new(ToolCommand));
    registry.register(Box::new(McpCommand));
    registry.register(Box::new(BranchCommand));
}

struct HelpCommand;

#[async_trait]
impl SlashCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "List available commands, or show details for one command"
    }

    fn aliases(&self) -> &[&'static str] {
        &["h", "?"]
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    async fn execute(
        &self,
        args: &[String],
        registry: &CommandRegistry,
        _ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        if let Some(name) = args.first() {
            let canonical = registry.resolve_alias(&name.to_lowercase());
            let command = registry
                .get(&canonical)
                .ok_or_else(|| format!("No command named /{name}"))?;

            let mut lines = vec![
                format!("/{} - {}", command.name(), command.description()),
                format!("Category: {}", command.category()),
            ];
            if !command.aliases().is_empty() {
                lines.push(format!("Aliases: {}", command.aliases().join(", ")));
            }
            if command.min_args() > 0 {
                lines.push(format!("Requires at least {} argument(s)", command.min_args()));
            }
            if command.requires_git_repo() {
                lines.push("Requires a Git repository".to_string());
            }
            return Ok(lines.join("\n"));
        }

        // Grouped by category, in registration order.
        let mut sections: Vec<(&str, Vec<String>)> = Vec::new();
        for command in registry.commands() {
            let entry = format!("  /{:<10} {}", command.name(), command.description());
            match sections
                .iter_mut()
                .find(|(category, _)| *category == command.category())
            {
                Some((_, entries)) => entries.push(entry),
                None => sections.push((command.category(), vec![entry])),
            }
        }

        let mut output = String::from("Available commands:\n");
        for (category, entries) in sections {
            output.push_str(&format!("\n{category}:\n"));
            output.push_str(&entries.join("\n"));
            output.push('\n');
        }
        Ok(output)
    }
}

struct ExitCommand;

#[async_trait]
impl SlashCommand for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn description(&self) -> &'static str {
        "End the chat session"
    }

    fn aliases(&self) -> &[&'static str] {
        &["quit", "q"]
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        ctx.request_exit();
        Ok("Goodbye!".to_string())
    }
}

struct ClearCommand;

#[async_trait]
impl SlashCommand for ClearCommand {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn description(&self) -> &'static str {
        "Clear the conversation history (system prompt is kept)"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let before = ctx.history.len();
        ctx.history.retain(|message| message.role == "system");
        let removed = before - ctx.history.len();
        Ok(format!("Cleared {removed} message(s)."))
    }
}

struct HistoryCommand;

#[async_trait]
impl SlashCommand for HistoryCommand {
    fn name(&self) -> &'static str {
        "history"
    }

    fn description(&self) -> &'static str {
        "Show the conversation so far"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        if ctx.history.is_empty() {
            return Ok("No messages yet.".to_string());
        }

        let lines: Vec<String> = ctx
            .history
            .iter()
            .enumerate()
            .map(|(index, message)| {
                let mut preview: String = message.content.chars().take(72).collect();
                if message.content.chars().count() > 72 {
                    preview.push_str("...");
                }
                format!("{:>3}. [{}] {}", index + 1, message.role, preview)
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

struct SaveCommand;

#[async_trait]
impl SlashCommand for SaveCommand {
    fn name(&self) -> &'static str {
        "save"
    }

    fn description(&self) -> &'static str {
        "Write the conversation to a markdown file"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn validate_args(&self, args: &[String]) -> Result<(), String> {
        if args[0].trim().is_empty() {
            return Err("filename must not be empty".to_string());
        }
        Ok(())
    }

    async fn execute(
        &self,
        args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let path = ctx.working_dir.join(&args[0]);
        let mut transcript = format!(
            "# Conversation saved {}\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for message in ctx.history.iter() {
            transcript.push_str(&format!("## {}\n\n{}\n\n", message.role, message.content));
        }

        tokio::fs::write(&path, transcript)
            .await
            .map_err(|err| format!("could not write {}: {err}", path.display()))?;
        Ok(format!(
            "Saved {} message(s) to {}",
            ctx.history.len(),
            path.display()
        ))
    }
}

struct ProviderCommand;

#[async_trait]
impl SlashCommand for ProviderCommand {
    fn name(&self) -> &'static str {
        "provider"
    }

    fn description(&self) -> &'static str {
        "List configured providers, or switch to one"
    }

    fn aliases(&self) -> &[&'static str] {
        &["p"]
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    async fn execute(
        &self,
        args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let Some(name) = args.first() else {
            let current = ctx.provider().name.clone();
            let lines: Vec<String> = ctx
                .config
                .list_providers()
                .into_iter()
                .map(|provider| {
                    let marker = if provider.eq_ignore_ascii_case(&current) {
                        "*"
                    } else {
                        " "
                    };
                    format!("{marker} {provider}")
                })
                .collect();
            if lines.is_empty() {
                return Ok("No providers configured. Run setup first.".to_string());
            }
            return Ok(lines.join("\n"));
        };

        let provider = ctx
            .config
            .get_provider(name)
            .cloned()
            .ok_or_else(|| format!("Unknown provider '{name}'"))?;
        let switched = provider.name.clone();
        ctx.set_provider(provider);
        Ok(format!("Switched to provider '{switched}'"))
    }
}

struct ToolsCommand;

#[async_trait]
impl SlashCommand for ToolsCommand {
    fn name(&self) -> &'static str {
        "tools"
    }

    fn description(&self) -> &'static str {
        "List tools available from connected MCP servers"
    }

    fn category(&self) -> &'static str {
        "Tools"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let descriptors = ctx.manager.get_all_tools().await;
        if descriptors.is_empty() {
            return Ok("No tools available. Connect an MCP server first.".to_string());
        }

        let mut lines = vec![format!("{} tool(s) available:", descriptors.len())];
        for descriptor in descriptors {
            let description = descriptor
                .definition
                .function
                .description
                .unwrap_or_default();
            lines.push(format!(
                "  {} [{}] {}",
                descriptor.definition.function.name, descriptor.server, description
            ));
        }
        Ok(lines.join("\n"))
    }
}

struct ToolCommand;

#[async_trait]
impl SlashCommand for ToolCommand {
    fn name(&self) -> &'static str {
        "tool"
    }

    fn description(&self) -> &'static str {
        "Show a tool's description and input schema"
    }

    fn category(&self) -> &'static str {
        "Tools"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    async fn execute(
        &self,
        args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let name = &args[0];
        let descriptor = ctx
            .manager
            .get_all_tools()
            .await
            .into_iter()
            .find(|descriptor| descriptor.definition.function.name == *name)
            .ok_or_else(|| format!("Tool {name} not found on any connected MCP server"))?;

        let schema = to_string_pretty(&descriptor.definition.function.parameters)
            .unwrap_or_else(|_| "{}".to_string());
        Ok(format!(
            "{} (served by {})\n{}\n\nInput schema:\n{}",
            descriptor.definition.function.name,
            descriptor.server,
            descriptor
                .definition
                .function
                .description
                .unwrap_or_else(|| "No description.".to_string()),
            schema
        ))
    }
}

struct McpCommand;

#[async_trait]
impl SlashCommand for McpCommand {
    fn name(&self) -> &'static str {
        "mcp"
    }

    fn description(&self) -> &'static str {
        "Show connected MCP servers"
    }

    fn category(&self) -> &'static str {
        "Tools"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        let names: Vec<String> = ctx
            .manager
            .server_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Ok("No MCP servers connected.".to_string());
        }

        let descriptors = ctx.manager.get_all_tools().await;
        let lines: Vec<String> = names
            .into_iter()
            .map(|name| {
                let tool_count = descriptors
                    .iter()
                    .filter(|descriptor| descriptor.server == name)
                    .count();
                format!("  {name}: {tool_count} tool(s)")
            })
            .collect();
        Ok(format!("Connected servers:\n{}", lines.join("\n")))
    }
}

struct BranchCommand;

#[async_trait]
impl SlashCommand for BranchCommand {
    fn name(&self) -> &'static str {
        "branch"
    }

    fn description(&self) -> &'static str {
        "Show the current git branch and repository root"
    }

    fn category(&self) -> &'static str {
        "Git"
    }

    fn requires_git_repo(&self) -> bool {
        true
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    async fn execute(
        &self,
        _args: &[String],
        _registry: &CommandRegistry,
        ctx: &mut CommandContext<'_>,
    ) -> Result<String, String> {
        // The git precondition guarantees this is present.
        let git = ctx.git.as_ref().ok_or("No Git repository")?;
        let branch = git.branch.as_deref().unwrap_or("(unknown)");
        Ok(format!("On branch {} ({})", branch, git.root.display()))
    }
}
