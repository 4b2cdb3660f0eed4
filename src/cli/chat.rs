//! The interactive chat session: reads lines from stdin, routes slash
//! commands to the dispatcher and everything else through the agent loop.

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::api::client::HttpClient;
use crate::api::ChatMessage;
use crate::commands::handlers::register_builtins;
use crate::commands::{dispatch, CommandContext, CommandRegistry};
use crate::core::agent;
use crate::core::config::Config;
use crate::mcp::manager::McpManager;
use crate::utils::git::{self, GitInfo};

const SYSTEM_PROMPT: &str = "You are a helpful assistant running in a terminal. \
Use the available tools when they help answer the user's question, and keep \
responses concise.";

/// Runs a full chat session. Sessions and their transports are always torn
/// down on the way out, however the loop ended.
pub async fn run_chat() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let Some(provider) = config.current_provider().cloned() else {
        return Err("No providers configured. Run `attache setup` first.".into());
    };

    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry);

    let working_dir = std::env::current_dir()?;
    let git = git::discover(&working_dir);

    let mut manager = McpManager::new();
    manager.connect_all(&config).await;

    println!(
        "attache {} - {} ({}). Type /help for commands, /exit to quit.",
        env!("CARGO_PKG_VERSION"),
        provider.name,
        provider.model
    );

    let result = chat_loop(
        &config,
        &registry,
        &mut manager,
        provider.name.clone(),
        working_dir,
        git,
    )
    .await;

    manager.close().await;
    result
}

async fn chat_loop(
    config: &Config,
    registry: &CommandRegistry,
    manager: &mut McpManager,
    provider_name: String,
    working_dir: PathBuf,
    git: Option<GitInfo>,
) -> Result<(), Box<dyn Error>> {
    let mut provider = config
        .get_provider(&provider_name)
        .cloned()
        .ok_or_else(|| format!("Unknown provider '{provider_name}'"))?;
    let mut client = HttpClient::new(provider.clone());
    let mut history = vec![ChatMessage::system(SYSTEM_PROMPT)];
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            // EOF
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            let mut ctx = CommandContext::new(
                &mut history,
                config,
                provider.clone(),
                working_dir.clone(),
                git.clone(),
                manager,
            );
            match dispatch(registry, input, &mut ctx).await {
                Ok(output) => println!("{output}"),
                Err(err) => println!("{err}"),
            }

            let exit_requested = ctx.exit_requested();
            let selected = ctx.into_provider();
            if selected.name != provider.name {
                debug!(provider = %selected.name, "Switching provider");
                provider = selected;
                client = HttpClient::new(provider.clone());
            }
            if exit_requested {
                break;
            }
            continue;
        }

        history.push(ChatMessage::user(input));
        let mut on_chunk = |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        };

        // Ctrl-C during a turn cancels the turn, not the session.
        tokio::select! {
            result = agent::run_turn(&client, manager, &mut history, &mut on_chunk) => {
                match result {
                    Ok(outcome) if outcome.streamed => println!(),
                    Ok(outcome) => println!("{}", outcome.content),
                    Err(err) => println!("{err}"),
                }
            }
            _ = tokio::signal::ctrl_c() => println!("\n[Interrupted]"),
        }
    }

    Ok(())
}
