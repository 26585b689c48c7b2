//! Postern CLI library
//!
//! A line-oriented front end: each subcommand opens the state file, runs a
//! session for one request and exits.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands};
pub use commands::{CommandDispatcher, Session};
pub use config::AppConfig;
pub use error::{CliError, Result};
