pub mod agent;
pub mod config;
