//! CLI module
//!
//! Command-line interface for running warehouse jobs.
//!
//! # Commands
//!
//! - `run` - Configure the session, read, then write
//! - `read` - Read through the connector and print rows
//! - `query` - Ad hoc query against the warehouse
//! - `check` - Test staging credentials and the warehouse connection
//! - `config` - Show the session configuration (secrets redacted)
//! - `validate` - Validate the job definition

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
