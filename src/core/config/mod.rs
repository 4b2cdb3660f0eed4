pub mod data;
pub mod io;

pub use data::{Config, Provider, ServerConfig};
