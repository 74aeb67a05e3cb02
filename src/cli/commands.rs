//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::fmt::Write as FmtWrite;
use std::io::{self, BufRead, Write as IoWrite};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::config::{AgentConfig, DEFAULT_DEPLOYMENT};
use crate::agent::controller::Controller;
use crate::agent::events::{EventSink, OrchestrationEvent};
use crate::agent::prompt::PromptSet;
use crate::agent::registry::AgentRegistry;
use crate::agent::session::Session;
use crate::cli::output::{
    OutputFormat, format_history, format_registry, format_report, truncate_graphemes,
};
use crate::cli::parser::{Cli, Commands};
use crate::error::{CommandError, Result};

/// Grapheme budget for one history line in `/history`.
const HISTORY_PREVIEW: usize = 160;

/// Overrides for a research session taken from command flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOverrides<'a> {
    /// Cycle budget per query.
    pub max_retries: Option<u32>,
    /// Per-retriever timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Fallback deployment.
    pub deployment: Option<&'a str>,
    /// Provider name.
    pub provider: Option<&'a str>,
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Query {
            query,
            max_retries,
            timeout_secs,
            deployment,
            provider,
        } => {
            let overrides = SessionOverrides {
                max_retries: *max_retries,
                timeout_secs: *timeout_secs,
                deployment: deployment.as_deref(),
                provider: provider.as_deref(),
            };
            cmd_query(cli, query, &overrides, format)
        }
        Commands::Chat {
            max_retries,
            timeout_secs,
        } => {
            let overrides = SessionOverrides {
                max_retries: *max_retries,
                timeout_secs: *timeout_secs,
                ..SessionOverrides::default()
            };
            cmd_chat(cli, &overrides, format)
        }
        Commands::Agents => cmd_agents(cli.registry.as_deref(), format),
        Commands::InitPrompts { dir } => {
            cmd_init_prompts(dir.as_deref().or(cli.prompt_dir.as_deref()), format)
        }
    }
}

/// Resolves session configuration: flags, then environment, then defaults.
///
/// # Errors
///
/// Returns a configuration error if no API key is available or a value is
/// out of range.
pub fn build_config(cli: &Cli, overrides: &SessionOverrides<'_>) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder().from_env();
    if let Some(path) = &cli.registry {
        builder = builder.registry_path(path);
    }
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(n) = overrides.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = overrides.timeout_secs {
        builder = builder.retrieval_timeout(Duration::from_secs(secs));
    }
    if let Some(deployment) = overrides.deployment {
        builder = builder.default_deployment(deployment);
    }
    if let Some(provider) = overrides.provider {
        builder = builder.provider(provider);
    }
    Ok(builder.build()?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn cmd_query(
    cli: &Cli,
    query: &str,
    overrides: &SessionOverrides<'_>,
    format: OutputFormat,
) -> Result<String> {
    let config = build_config(cli, overrides)?;
    let session = Session::from_config(&config)?;

    let mut controller = Controller::new(session);
    if format == OutputFormat::Text {
        controller = controller.with_events(Arc::new(ConsoleEvents));
    }

    let rt = runtime()?;
    let report = rt
        .block_on(controller.run(query))
        .map_err(|e| CommandError::ExecutionFailed(format!("Query failed: {e}")))?;

    Ok(format_report(&report, format))
}

fn cmd_chat(cli: &Cli, overrides: &SessionOverrides<'_>, format: OutputFormat) -> Result<String> {
    let config = build_config(cli, overrides)?;
    let session = Session::from_config(&config)?;
    let retrievers = session.dispatcher().configured();
    let mut controller = Controller::new(session).with_events(Arc::new(ConsoleEvents));
    let rt = runtime()?;

    let mut stdout = io::stdout();
    let labels: Vec<&str> = retrievers.iter().map(|k| k.label()).collect();
    writeln!(
        stdout,
        "Research session with {} retriever(s): {}. Type /history or /quit.",
        labels.len(),
        labels.join(", ")
    )?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut queries = 0_usize;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/history" => {
                let history = format_history(controller.session().history(), HISTORY_PREVIEW, format);
                writeln!(stdout, "{}", history.trim_end())?;
            }
            query => {
                queries += 1;
                match rt.block_on(controller.run(query)) {
                    Ok(report) => writeln!(stdout, "{}\n", format_report(&report, format))?,
                    Err(e) => writeln!(io::stderr(), "Error: {e}")?,
                }
            }
        }
    }

    Ok(format!(
        "Session ended after {queries} quer{}.\n",
        if queries == 1 { "y" } else { "ies" }
    ))
}

fn cmd_agents(registry_path: Option<&Path>, format: OutputFormat) -> Result<String> {
    let deployment = std::env::var("AGENTIC_RAG_DEPLOYMENT")
        .ok()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string());

    let registry = match registry_path {
        Some(path) => AgentRegistry::load(path, &deployment)?,
        None => AgentRegistry::with_defaults(&deployment),
    };

    Ok(format_registry(&registry, format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ))
            } else {
                let mut output = format!(
                    "Wrote {} prompt template(s) to: {}\n",
                    written.len(),
                    target_dir.display()
                );
                for path in &written {
                    let _ = writeln!(
                        output,
                        "  {}",
                        path.file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("unknown")
                    );
                }
                output.push_str("\nEdit these files to customize agent system prompts.\n");
                Ok(output)
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

/// Live progress on stderr.
struct ConsoleEvents;

impl EventSink for ConsoleEvents {
    fn emit(&self, event: &OrchestrationEvent) {
        let line = match event {
            OrchestrationEvent::PhaseStarted { attempt, phase } => {
                format!("[attempt {attempt}] {}", phase.as_str())
            }
            OrchestrationEvent::PlanReady {
                agents,
                justification,
                ..
            } => {
                let labels: Vec<&str> = agents.iter().map(|k| k.label()).collect();
                format!(
                    "  plan: {} ({})",
                    if labels.is_empty() { "none".to_string() } else { labels.join(", ") },
                    truncate_graphemes(justification, 100)
                )
            }
            OrchestrationEvent::AgentStatus {
                role,
                status,
                detail,
            } => match detail {
                Some(detail) => format!(
                    "  {} {} {}: {}",
                    role.icon(),
                    role.name(),
                    status.as_str(),
                    truncate_graphemes(detail, 100)
                ),
                None => format!("  {} {} {}", role.icon(), role.name(), status.as_str()),
            },
            OrchestrationEvent::Verdict {
                status, content, ..
            } => format!("  verdict: {status:?}: {}", truncate_graphemes(content, 100)),
            OrchestrationEvent::QueryRewritten { query, .. } => {
                format!("  rewritten query: {query}")
            }
            OrchestrationEvent::Aborted { reason } => format!("  aborted: {reason}"),
            OrchestrationEvent::FinalSummary { .. } => return,
        };
        let _ = writeln!(io::stderr(), "{line}");
    }
}
