//! Command-line entry points: argument parsing and the thin subcommand
//! bodies around the chat session.

pub mod chat;

use std::error::Error;
use std::io::{self, Write};

use clap::{Parser, Subcommand};

use crate::api::client::{HttpClient, LlmClient};
use crate::api::ChatMessage;
use crate::core::config::{Config, Provider};
use crate::utils::url::normalize_base_url;

#[derive(Parser)]
#[command(
    name = "attache",
    version,
    about = "A terminal LLM assistant with MCP tool support"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session (the default)
    Chat,
    /// Interactively configure an LLM provider
    Setup,
    /// Inspect or edit the persisted configuration
    Config {
        /// One of: list, path, default, remove-provider, remove-server
        action: String,
        name: Option<String>,
    },
    /// Send a single test request to a provider
    Test { provider: Option<String> },
}

/// Parses arguments and runs the selected subcommand, mapping handled
/// failures to exit code 1.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat::run_chat().await,
        Command::Setup => run_setup(),
        Command::Config { action, name } => run_config(&action, name.as_deref()),
        Command::Test { provider } => run_test(provider.as_deref()).await,
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

fn prompt(label: &str) -> Result<String, Box<dyn Error>> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn run_setup() -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;

    println!("Configure an LLM provider.");
    let name = prompt("Provider name")?;
    if name.is_empty() {
        return Err("provider name must not be empty".into());
    }
    let base_url = normalize_base_url(&prompt("Base URL (e.g. https://api.openai.com/v1)")?);
    let api_key = prompt("API key")?;
    let model = prompt("Model")?;
    let mode = prompt("Auth mode (openai/anthropic) [openai]")?;

    config.add_provider(Provider {
        name: name.clone(),
        base_url,
        api_key,
        model,
        mode: (!mode.is_empty()).then_some(mode),
        temperature: None,
        max_tokens: None,
    });

    let make_default = prompt("Set as default provider? [y/N]")?;
    if make_default.eq_ignore_ascii_case("y") || config.default_provider.is_none() {
        config.default_provider = Some(name.clone());
    }

    config.save()?;
    println!("Saved provider '{}' to {}", name, Config::config_path().display());
    Ok(())
}

fn run_config(action: &str, name: Option<&str>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;

    match action {
        "list" => {
            if config.providers.is_empty() && config.mcp_servers.is_empty() {
                println!("No configuration yet. Run `attache setup` first.");
                return Ok(());
            }
            println!("Providers:");
            for provider in &config.providers {
                let marker = if config.default_provider.as_deref() == Some(&provider.name) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {} ({})", provider.name, provider.model);
            }
            println!("MCP servers:");
            for server in &config.mcp_servers {
                println!("  {} [{}] {}", server.name, server.transport, server.command);
            }
            Ok(())
        }
        "path" => {
            println!("{}", Config::config_path().display());
            Ok(())
        }
        "default" => {
            let name = name.ok_or("config default requires a provider name")?;
            if config.get_provider(name).is_none() {
                return Err(format!("Unknown provider '{name}'").into());
            }
            config.default_provider = Some(name.to_string());
            config.save()?;
            println!("Default provider set to '{name}'");
            Ok(())
        }
        "remove-provider" => {
            let name = name.ok_or("config remove-provider requires a provider name")?;
            config.remove_provider(name);
            if config.default_provider.as_deref() == Some(name) {
                config.default_provider = None;
            }
            config.save()?;
            println!("Removed provider '{name}'");
            Ok(())
        }
        "remove-server" => {
            let name = name.ok_or("config remove-server requires a server name")?;
            config.remove_mcp_server(name);
            config.save()?;
            println!("Removed MCP server '{name}'");
            Ok(())
        }
        other => Err(format!(
            "Unknown config action '{other}' (expected list, path, default, remove-provider, remove-server)"
        )
        .into()),
    }
}

async fn run_test(provider: Option<&str>) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let provider = match provider {
        Some(name) => config
            .get_provider(name)
            .ok_or_else(|| format!("Unknown provider '{name}'"))?,
        None => config
            .current_provider()
            .ok_or("No providers configured. Run `attache setup` first.")?,
    };

    println!("Testing provider '{}' ({})...", provider.name, provider.model);
    let client = HttpClient::new(provider.clone());
    let messages = [ChatMessage::user("Reply with a short confirmation.")];
    let response = client.send_request(&messages, &[]).await?;
    println!("{}", response.content);
    Ok(())
}
