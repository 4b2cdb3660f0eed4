//! Slash command dispatch.
//!
//! Input that starts with `/` is parsed here, resolved through the alias
//! table, validated against the command's declared preconditions, and only
//! then executed. Failures at every stage come back as typed errors whose
//! display text is what the chat loop prints; nothing in this module panics
//! on bad user input.

pub mod context;
pub mod handlers;
pub mod registry;

use thiserror::Error;

pub use context::CommandContext;
pub use registry::{CommandRegistry, SlashCommand};

/// Minimum similarity (1 - distance/length) for a name to be suggested.
const SUGGESTION_CUTOFF: f64 = 0.6;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Error)]
pub enum CommandError {
    /// Input did not start with `/`; callers should treat it as chat text.
    #[error("Not a command")]
    NotACommand,
    #[error("Invalid command format")]
    Invalid,
    #[error("{}", unknown_message(.name, .suggestions))]
    Unknown {
        name: String,
        suggestions: Vec<String>,
    },
    #[error("{0}")]
    Validation(String),
    #[error("Error executing /{name}: {message}")]
    Execution { name: String, message: String },
}

fn unknown_message(name: &str, suggestions: &[String]) -> String {
    let mut message = format!("Unknown command: /{name}");
    if !suggestions.is_empty() {
        let list = suggestions
            .iter()
            .map(|s| format!("/{s}"))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!(". Did you mean: {list}?"));
    }
    message
}

/// Splits `/name arg...` into a lowercased name and its arguments.
pub fn parse_command(input: &str) -> Result<(String, Vec<String>), CommandError> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('/').ok_or(CommandError::NotACommand)?;

    let mut words = split_words(rest);
    if words.is_empty() {
        return Err(CommandError::Invalid);
    }
    let name = words.remove(0).to_lowercase();
    Ok((name, words))
}

/// Runs one command invocation end to end: parse, alias resolution, git and
/// arity preconditions, custom validation, then the body.
pub async fn dispatch(
    registry: &CommandRegistry,
    input: &str,
    ctx: &mut CommandContext<'_>,
) -> Result<String, CommandError> {
    let (name, args) = parse_command(input)?;
    let canonical = registry.resolve_alias(&name);

    let Some(command) = registry.get(&canonical) else {
        return Err(CommandError::Unknown {
            suggestions: suggest(registry, &name),
            name,
        });
    };

    if command.requires_git_repo() && ctx.git.is_none() {
        return Err(CommandError::Validation(format!(
            "/{canonical} requires a Git repository"
        )));
    }
    if args.len() < command.min_args() {
        return Err(CommandError::Validation(format!(
            "/{canonical} requires at least {} argument(s)",
            command.min_args()
        )));
    }
    if let Some(max_args) = command.max_args() {
        if args.len() > max_args {
            return Err(CommandError::Validation(format!(
                "/{canonical} accepts at most {max_args} argument(s)"
            )));
        }
    }
    if let Err(message) = command.validate_args(&args) {
        return Err(CommandError::Validation(message));
    }

    command
        .execute(&args, registry, ctx)
        .await
        .map_err(|message| CommandError::Execution {
            name: canonical,
            message,
        })
}

/// Shell-style word splitting: whitespace separates words, single or double
/// quotes group them. An unterminated quote keeps its partial word rather
/// than failing the whole parse.
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn suggest(registry: &CommandRegistry, name: &str) -> Vec<String> {
    let mut scored: Vec<(f64, String)> = registry
        .all_names()
        .into_iter()
        .map(|candidate| (similarity(name, &candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(MAX_SUGGESTIONS);
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
