//! Summarizer agent.

use tracing::warn;

use super::bundle::RetrievalBundle;
use super::config::AgentConfig;
use super::message::{ChatMessage, ResponseFormat};
use super::oracle::GenerationParams;
use super::prompt::{PromptSet, build_summary_prompt};
use super::provider::LlmProvider;
use super::registry::AgentSpec;
use super::traits::{Agent, AgentRun};
use crate::error::AgentError;
use crate::role::AgentRole;

/// Agent that writes the final answer from an approved bundle.
pub struct SummarizerAgent {
    deployment: String,
    system_prompt: String,
    params: GenerationParams,
}

impl SummarizerAgent {
    /// Creates the summarizer from its registry binding.
    #[must_use]
    pub fn new(spec: &AgentSpec, prompts: &PromptSet, config: &AgentConfig) -> Self {
        Self {
            deployment: spec.deployment.clone(),
            system_prompt: spec
                .system_prompt
                .clone()
                .unwrap_or_else(|| prompts.summarizer.clone()),
            params: config.params_for(AgentRole::Summarizer),
        }
    }

    /// Summarizes `bundle` as the answer to `original_query`.
    ///
    /// The bundle is only read; calling this twice with the same inputs
    /// leaves it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Oracle`] if the call fails, or
    /// [`AgentError::Contract`] if the reply is empty.
    pub async fn summarize(
        &self,
        provider: &dyn LlmProvider,
        original_query: &str,
        bundle: &RetrievalBundle,
        history: &[ChatMessage],
    ) -> Result<AgentRun, AgentError> {
        let user_msg = build_summary_prompt(original_query, bundle);
        let run = self
            .run(provider, &user_msg, history, ResponseFormat::Text)
            .await?;

        if run.raw.trim().is_empty() {
            return Err(AgentError::Contract {
                role: AgentRole::Summarizer,
                message: "empty summary".to_string(),
                raw: run.raw,
            });
        }
        if run.truncated() {
            warn!(
                max_tokens = self.params.max_tokens,
                "summary truncated at the token limit"
            );
        }

        Ok(run)
    }
}

impl Agent for SummarizerAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Summarizer
    }

    fn deployment(&self) -> &str {
        &self.deployment
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn params(&self) -> GenerationParams {
        self.params
    }
}
