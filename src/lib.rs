//! attache - a terminal LLM assistant with MCP tool support.
//!
//! The crate is organized around three cooperating pieces: the MCP layer
//! (`mcp`) manages stdio and SSE connections to tool servers, the agent loop
//! (`core::agent`) drives one user turn through generation and tool
//! execution, and the command dispatcher (`commands`) handles `/name arg...`
//! input. The `api` module holds the LLM wire types and HTTP client, `cli`
//! the thin subcommand surface.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod utils;
