//! agentic-rag binary entry point.

use std::io::Write;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentic_rag::cli::{Cli, execute};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // -v flags pick the level; RUST_LOG wins when set.
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = execute(&cli)?;
    if !output.is_empty() {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{output}")?;
        if !output.ends_with('\n') {
            writeln!(stdout)?;
        }
    }
    Ok(())
}
