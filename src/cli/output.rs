//! Output formatting for CLI commands.
//!
//! Every command renders to a `String`; `main` writes it to stdout.

#![allow(clippy::format_push_string)]

use std::fmt::Write as _;

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::agent::controller::{RunOutcome, RunReport};
use crate::agent::registry::AgentRegistry;
use crate::agent::session::ChatTurn;
use crate::role::AgentRole;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

/// Truncates to at most `max` grapheme clusters, appending `...` when cut.
#[must_use]
pub fn truncate_graphemes(s: &str, max: usize) -> String {
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return graphemes[..max].concat();
    }
    format!("{}...", graphemes[..max - 3].concat())
}

/// Renders a run report.
#[must_use]
pub fn format_report(report: &RunReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(report);
    }

    let mut output = String::new();
    match &report.outcome {
        RunOutcome::Answered { answer } => {
            output.push_str(answer.trim_end());
            let sources = sources(report);
            if !sources.is_empty() {
                output.push_str("\n\nSources:");
                for source in sources {
                    output.push_str(&format!("\n- {source}"));
                }
            }
        }
        RunOutcome::Aborted {
            message, advice, ..
        } => {
            output.push_str(&format!("No answer: {message}"));
            if !advice.is_empty() {
                output.push_str("\n\nTips to improve your query:");
                for tip in advice {
                    output.push_str(&format!("\n- {tip}"));
                }
            }
        }
    }

    let agents: Vec<&str> = report
        .cycles
        .last()
        .map(|c| c.plan.agents_needed.iter().map(|k| k.label()).collect())
        .unwrap_or_default();
    let agents = if agents.is_empty() {
        "none".to_string()
    } else {
        agents.join(", ")
    };

    output.push_str(&format!(
        "\n\n---\nAttempts: {} | Agents: {agents} | Tokens: {} | Time: {:.1}s",
        report.attempts(),
        report.usage.total_tokens,
        report.elapsed.as_secs_f64()
    ));
    output
}

/// Citations from the final cycle's retrievals, deduplicated.
fn sources(report: &RunReport) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(bundle) = report.cycles.last().and_then(|c| c.bundle.as_ref()) else {
        return out;
    };
    for (_, retrieved) in bundle.retrieved() {
        for citation in retrieved.citations() {
            if !out.iter().any(|c| c == citation) {
                out.push(citation.to_string());
            }
        }
    }
    out
}

/// Renders the agent registry.
#[must_use]
pub fn format_registry(registry: &AgentRegistry, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        let agents: Vec<_> = registry
            .iter()
            .map(|(role, spec)| {
                serde_json::json!({
                    "role": role,
                    "deployment": spec.deployment,
                    "knowledge_source": spec.knowledge_source,
                    "custom_prompt": spec.system_prompt.is_some(),
                })
            })
            .collect();
        return format.to_json(&serde_json::json!({ "agents": agents }));
    }

    let mut output = String::new();
    for (role, spec) in registry.iter() {
        let _ = write!(
            output,
            "{} {:<30} {}",
            role.icon(),
            role.name(),
            spec.deployment
        );
        if let Some(source) = &spec.knowledge_source {
            let _ = write!(output, "  [{source}]");
        }
        if spec.system_prompt.is_some() {
            output.push_str("  (custom prompt)");
        }
        output.push('\n');
    }

    let missing: Vec<&str> = AgentRole::ALL
        .into_iter()
        .filter(|role| registry.get(*role).is_none())
        .map(AgentRole::name)
        .collect();
    if !missing.is_empty() {
        let _ = writeln!(output, "\nNot configured: {}", missing.join(", "));
    }
    output
}

/// Renders session history; each turn is cut to `preview` graphemes in text mode.
#[must_use]
pub fn format_history(turns: &[ChatTurn], preview: usize, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return format.to_json(turns);
    }

    if turns.is_empty() {
        return "No turns yet.\n".to_string();
    }

    let mut output = String::new();
    for turn in turns {
        let attempt = turn
            .attempt
            .map(|a| format!(" (attempt {a})"))
            .unwrap_or_default();
        let text = truncate_graphemes(&turn.content.replace('\n', " "), preview);
        let _ = writeln!(
            output,
            "{} {}{attempt}: {text}",
            turn.speaker.icon(),
            turn.speaker.label()
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::bundle::{RetrievalBundle, RetrievalEntry, Retrieved};
    use crate::agent::controller::{AbortReason, CycleReport};
    use crate::agent::message::TokenUsage;
    use crate::agent::planner::PlanDecision;
    use crate::role::RetrieverKind;

    fn report(outcome: RunOutcome) -> RunReport {
        let mut bundle = RetrievalBundle::new();
        bundle.insert(
            RetrieverKind::SharePoint,
            RetrievalEntry::Retrieved(Retrieved {
                text: "T1\n\n**Citations:**\n- trial.pdf\n- trial.pdf".to_string(),
                latency: Duration::from_secs(1),
                usage: TokenUsage::default(),
            }),
        );
        RunReport {
            query: "X".to_string(),
            outcome,
            cycles: vec![CycleReport {
                attempt: 1,
                query: "X".to_string(),
                plan: PlanDecision {
                    agents_needed: vec![RetrieverKind::SharePoint],
                    ..PlanDecision::default()
                },
                bundle: Some(bundle),
                verdict: None,
            }],
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_truncate_graphemes() {
        assert_eq!(truncate_graphemes("short", 10), "short");
        assert_eq!(truncate_graphemes("abcdefghij", 6), "abc...");
        assert_eq!(truncate_graphemes("abcdef", 2), "ab");
        assert_eq!(truncate_graphemes("🧭🧭🧭🧭🧭", 4), "🧭...");
    }

    #[test]
    fn test_format_answered_report() {
        let text = format_report(
            &report(RunOutcome::Answered {
                answer: "The answer.".to_string(),
            }),
            OutputFormat::Text,
        );
        assert!(text.starts_with("The answer."));
        assert_eq!(text.matches("- trial.pdf").count(), 1);
        assert!(text.contains("Attempts: 1 | Agents: SharePoint | Tokens: 15 | Time: 1.5s"));
    }

    #[test]
    fn test_format_aborted_report() {
        let reason = AbortReason::DeniedWithoutRewrite {
            reason: "off topic".to_string(),
        };
        let outcome = RunOutcome::Aborted {
            message: reason.to_string(),
            advice: vec!["Be specific.".to_string()],
            reason,
        };
        let text = format_report(&report(outcome), OutputFormat::Text);
        assert!(text.starts_with("No answer: "));
        assert!(text.contains("- Be specific."));
    }

    #[test]
    fn test_format_report_json() {
        let json = format_report(
            &report(RunOutcome::Answered {
                answer: "A".to_string(),
            }),
            OutputFormat::Json,
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap_or_default();
        assert_eq!(value["outcome"]["status"], "answered");
        assert_eq!(value["cycles"][0]["bundle"]["sharepoint"]["outcome"], "retrieved");
    }

    #[test]
    fn test_format_registry_lists_missing() {
        let registry = AgentRegistry::parse(
            "[agents.web]\nknowledge_source = \"bing\"\n",
            std::path::Path::new("a.toml"),
            "gpt-4o",
        )
        .unwrap_or_else(|_| unreachable!());
        let text = format_registry(&registry, OutputFormat::Text);
        assert!(text.contains("BingDataRetrievalAgent"));
        assert!(text.contains("[bing]"));
        assert!(text.contains("Not configured: SharePointDataRetrievalAgent, FabricDataRetrievalAgent"));
    }

    #[test]
    fn test_format_history() {
        let turns = vec![
            ChatTurn::user("hello"),
            ChatTurn::agent(AgentRole::Planner, "line one\nline two", 1),
        ];
        let text = format_history(&turns, 80, OutputFormat::Text);
        assert!(text.contains("You: hello"));
        assert!(text.contains("PlannerAgent (attempt 1): line one line two"));
        assert_eq!(format_history(&[], 80, OutputFormat::Text), "No turns yet.\n");
    }
}
