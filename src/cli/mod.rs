//! CLI layer for agentic-rag.
//!
//! Provides the command-line interface using clap, with commands for
//! running research queries, interactive sessions and inspecting the
//! agent configuration.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
