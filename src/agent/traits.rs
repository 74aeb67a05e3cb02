//! Agent trait definition.
//!
//! Every role (planner, retrievers, verifier, summarizer) implements this
//! trait, which provides the single `run` entry point the controller and
//! dispatcher use.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::message::{
    ChatMessage, ResponseFormat, TokenUsage, ToolDefinition, assistant_message, user_message,
};
use super::oracle::{Completion, GenerationParams, OracleRequest, complete};
use super::provider::LlmProvider;
use crate::error::AgentError;
use crate::role::AgentRole;

/// Instruction prepended to structured requests whose system prompt does
/// not already ask for JSON.
pub const JSON_INSTRUCTION: &str = "Respond ONLY with a single valid JSON object. ";

/// Outcome of one successful agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Agent that ran.
    pub role: AgentRole,
    /// Decoded reply.
    pub completion: Completion,
    /// Reply text exactly as returned.
    pub raw: String,
    /// Token usage for the call.
    pub usage: TokenUsage,
    /// Wall time of the call.
    pub latency: Duration,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    /// Caller's history extended with this exchange.
    pub history: Vec<ChatMessage>,
}

impl AgentRun {
    /// Decoded JSON object, for structured runs.
    #[must_use]
    pub const fn structured(&self) -> Option<&Value> {
        match &self.completion {
            Completion::Structured(value) => Some(value),
            Completion::Text(_) => None,
        }
    }

    /// Returns `true` if generation stopped at the token limit.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Returns the system prompt actually sent for the given format.
#[must_use]
pub fn effective_system_prompt(prompt: &str, format: ResponseFormat) -> Cow<'_, str> {
    if format == ResponseFormat::Structured && !prompt.to_lowercase().contains("json") {
        Cow::Owned(format!("{JSON_INSTRUCTION}{prompt}"))
    } else {
        Cow::Borrowed(prompt)
    }
}

/// Trait implemented by all agents in the system.
///
/// Agents bind a role to a deployment, a fixed system prompt and sampling
/// parameters. The default [`Agent::run`] sends one request through the
/// provider and never mutates the caller's history.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Role this agent plays.
    fn role(&self) -> AgentRole;

    /// Deployment or model identifier to call.
    fn deployment(&self) -> &str;

    /// System prompt that defines the agent's behavior.
    fn system_prompt(&self) -> &str;

    /// Reply shape this agent expects.
    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Text
    }

    /// Sampling parameters.
    fn params(&self) -> GenerationParams;

    /// Tool definitions offered to the model. None by default.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Runs the agent once.
    ///
    /// Sends the system prompt, `history` and `user_prompt`. Structured
    /// requests get [`JSON_INSTRUCTION`] prepended unless the prompt already
    /// mentions JSON. The returned history is a copy of `history` with the
    /// user and assistant turns appended.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Oracle`] attributed to this role when the call
    /// fails or a structured reply does not decode.
    async fn run(
        &self,
        provider: &dyn LlmProvider,
        user_prompt: &str,
        history: &[ChatMessage],
        format: ResponseFormat,
    ) -> Result<AgentRun, AgentError> {
        let role = self.role();
        let system = effective_system_prompt(self.system_prompt(), format);
        let tools = self.tools();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.extend_from_slice(history);
        messages.push(user_message(user_prompt));

        let request = OracleRequest {
            deployment: self.deployment(),
            system_prompt: &system,
            messages: &messages,
            format,
            params: self.params(),
            tools: &tools,
        };

        let start = Instant::now();
        let reply = complete(provider, &request)
            .await
            .map_err(|source| AgentError::Oracle { role, source })?;
        let latency = start.elapsed();

        debug!(
            role = %role,
            elapsed_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            tokens = reply.usage.total_tokens,
            "agent run complete"
        );

        messages.push(assistant_message(&reply.raw));

        Ok(AgentRun {
            role,
            completion: reply.completion,
            raw: reply.raw,
            usage: reply.usage,
            latency,
            finish_reason: reply.finish_reason,
            history: messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;
    use crate::agent::test_support::ScriptedProvider;
    use crate::error::OracleError;

    struct EchoAgent {
        prompt: &'static str,
    }

    impl Agent for EchoAgent {
        fn role(&self) -> AgentRole {
            AgentRole::Planner
        }

        fn deployment(&self) -> &str {
            "echo"
        }

        fn system_prompt(&self) -> &str {
            self.prompt
        }

        fn params(&self) -> GenerationParams {
            GenerationParams {
                temperature: 0.0,
                max_tokens: 50,
                top_p: 1.0,
                seed: None,
            }
        }
    }

    #[test]
    fn test_effective_prompt_prepends_instruction() {
        let prompt = effective_system_prompt("Pick agents.", ResponseFormat::Structured);
        assert!(prompt.starts_with(JSON_INSTRUCTION));

        let prompt = effective_system_prompt("Reply in json.", ResponseFormat::Structured);
        assert_eq!(prompt, "Reply in json.");

        let prompt = effective_system_prompt("Pick agents.", ResponseFormat::Text);
        assert_eq!(prompt, "Pick agents.");
    }

    #[tokio::test]
    async fn test_run_returns_extended_copy() {
        let provider = ScriptedProvider::new().reply("echo", r#"{"ok": true}"#);
        let agent = EchoAgent { prompt: "Pick agents." };
        let history = vec![user_message("earlier"), assistant_message("answer")];

        let run = agent
            .run(&provider, "now", &history, ResponseFormat::Structured)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(history.len(), 2);
        assert_eq!(run.history.len(), 4);
        assert_eq!(run.history[2].content, "now");
        assert_eq!(run.history[3].role, Role::Assistant);
        assert_eq!(run.structured(), Some(&serde_json::json!({"ok": true})));

        let sent = provider.requests("echo");
        assert!(sent[0].messages[0].content.starts_with(JSON_INSTRUCTION));
        assert_eq!(sent[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_run_attributes_failure_to_role() {
        let provider = ScriptedProvider::new().fail(
            "echo",
            OracleError::Connection {
                message: "reset".to_string(),
            },
        );
        let agent = EchoAgent { prompt: "p" };

        let err = agent
            .run(&provider, "q", &[], ResponseFormat::Text)
            .await;
        assert!(matches!(
            err,
            Err(AgentError::Oracle {
                role: AgentRole::Planner,
                source: OracleError::Connection { .. }
            })
        ));
    }

    #[tokio::test]
    async fn test_run_surfaces_decode_failure() {
        let provider = ScriptedProvider::new().reply("echo", "I think SharePoint.");
        let agent = EchoAgent { prompt: "p" };

        let err = agent
            .run(&provider, "q", &[], ResponseFormat::Structured)
            .await;
        assert!(matches!(
            err,
            Err(AgentError::Oracle {
                source: OracleError::MalformedOutput { .. },
                ..
            })
        ));
    }
}
