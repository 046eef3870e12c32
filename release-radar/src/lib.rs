pub mod auth;
pub mod cli;
pub mod load_config;
pub mod spotify;

pub use cli::{run, Cli, Commands};
