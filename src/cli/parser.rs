//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// agentic-rag: multi-agent research over your knowledge sources.
///
/// A planner picks retrieval agents, they run in parallel, a verifier
/// approves the material or rewrites the query, and a summarizer answers.
#[derive(Parser, Debug)]
#[command(name = "agentic-rag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Agent registry file (TOML).
    #[arg(long, env = "AGENTIC_RAG_REGISTRY", global = true)]
    pub registry: Option<PathBuf>,

    /// Directory containing prompt template files.
    #[arg(long, env = "AGENTIC_RAG_PROMPT_DIR", global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer one research query.
    ///
    /// Runs up to `--max-retries` plan, retrieve and verify cycles, then
    /// summarizes the approved material.
    #[command(after_help = r#"Examples:
  agentic-rag query "What is the MARD of the G7 sensor?"
  agentic-rag query "Compare drift across trials" --max-retries 2
  agentic-rag query "Latest competitor launches" --timeout-secs 30
  agentic-rag --registry agents.toml query "Summarize the 2025 study"
  agentic-rag --format json query "Q3 accuracy" | jq '.outcome'
"#)]
    Query {
        /// The research question.
        query: String,

        /// Maximum plan, retrieve and verify cycles.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-retriever timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Deployment for roles the registry does not pin.
        #[arg(short, long)]
        deployment: Option<String>,

        /// LLM provider (openai, azure).
        #[arg(long)]
        provider: Option<String>,
    },

    /// Interactive research session.
    ///
    /// Each line is one query. `/history` prints the session, `/quit` exits.
    #[command(after_help = r#"Examples:
  agentic-rag chat
  agentic-rag -v chat                     # Log phase transitions to stderr
  agentic-rag --registry agents.toml chat
"#)]
    Chat {
        /// Maximum plan, retrieve and verify cycles per query.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Per-retriever timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List configured agents.
    ///
    /// Validates the registry without contacting the language model.
    #[command(after_help = r#"Examples:
  agentic-rag agents
  agentic-rag --registry agents.toml agents
  agentic-rag --format json agents
"#)]
    Agents,

    /// Write default prompt templates for customization.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  agentic-rag init-prompts                 # ~/.config/agentic-rag/prompts
  agentic-rag init-prompts --dir ./prompts
"#)]
    InitPrompts {
        /// Target directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::try_parse_from(["agentic-rag", "-vv", "agents"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Agents));
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "agentic-rag",
            "query",
            "drift data",
            "--max-retries",
            "2",
            "--timeout-secs",
            "15",
            "--format",
            "json",
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Query {
                query,
                max_retries,
                timeout_secs,
                ..
            } => {
                assert_eq!(query, "drift data");
                assert_eq!(max_retries, Some(2));
                assert_eq!(timeout_secs, Some(15));
            }
            _ => unreachable!(),
        }
    }
}
