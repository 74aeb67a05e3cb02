//! Retrieval agents.
//!
//! One [`RetrieverAgent`] per configured knowledge domain. Each answers the
//! query from its own source and ends its reply with a citation trailer.

use tracing::warn;

use super::config::AgentConfig;
use super::message::ResponseFormat;
use super::oracle::GenerationParams;
use super::prompt::{PromptSet, build_retriever_prompt};
use super::provider::LlmProvider;
use super::registry::AgentSpec;
use super::traits::{Agent, AgentRun};
use crate::error::AgentError;
use crate::role::{AgentRole, RetrieverKind};

/// Agent that fetches content from one knowledge domain.
///
/// Retrievers are stateless: every call sees only the query it is given,
/// never the conversation.
pub struct RetrieverAgent {
    kind: RetrieverKind,
    deployment: String,
    system_prompt: String,
    knowledge_source: Option<String>,
    params: GenerationParams,
}

impl RetrieverAgent {
    /// Creates a retriever from its registry binding.
    #[must_use]
    pub fn new(
        kind: RetrieverKind,
        spec: &AgentSpec,
        prompts: &PromptSet,
        config: &AgentConfig,
    ) -> Self {
        let role = AgentRole::Retriever(kind);
        Self {
            kind,
            deployment: spec.deployment.clone(),
            system_prompt: spec
                .system_prompt
                .clone()
                .unwrap_or_else(|| prompts.for_role(role).to_string()),
            knowledge_source: spec.knowledge_source.clone(),
            params: config.params_for(role),
        }
    }

    /// Knowledge domain this agent serves.
    #[must_use]
    pub const fn kind(&self) -> RetrieverKind {
        self.kind
    }

    /// Knowledge source the agent is scoped to, if any.
    #[must_use]
    pub fn knowledge_source(&self) -> Option<&str> {
        self.knowledge_source.as_deref()
    }

    /// Runs the retrieval for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Oracle`] if the call fails, or
    /// [`AgentError::Contract`] if the reply is empty.
    pub async fn retrieve(
        &self,
        provider: &dyn LlmProvider,
        query: &str,
    ) -> Result<AgentRun, AgentError> {
        let user_msg = build_retriever_prompt(query, self.knowledge_source());
        let run = self.run(provider, &user_msg, &[], ResponseFormat::Text).await?;

        if run.raw.trim().is_empty() {
            return Err(AgentError::Contract {
                role: self.role(),
                message: "empty retrieval reply".to_string(),
                raw: run.raw,
            });
        }
        if run.truncated() {
            warn!(
                agent = %self.role(),
                max_tokens = self.params.max_tokens,
                "retrieval reply truncated at the token limit"
            );
        }

        Ok(run)
    }
}

impl Agent for RetrieverAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Retriever(self.kind)
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
