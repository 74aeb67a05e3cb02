//! Verifier agent.
//!
//! Judges whether a cycle's [`RetrievalBundle`] answers the query. A denial
//! may carry a rewritten query for the next cycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::bundle::RetrievalBundle;
use super::config::AgentConfig;
use super::message::ResponseFormat;
use super::oracle::GenerationParams;
use super::prompt::{PromptSet, build_verifier_prompt};
use super::provider::LlmProvider;
use super::registry::AgentSpec;
use super::traits::{Agent, AgentRun};
use crate::error::AgentError;
use crate::role::AgentRole;

/// Verifier decision for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum Verdict {
    /// The material answers the query.
    Approved {
        /// Why the material is sufficient.
        reason: String,
        /// Verifier's own draft answer.
        response: String,
    },
    /// The material is insufficient.
    Denied {
        /// What is missing or contradictory.
        reason: String,
        /// Query for the next cycle; `None` when no rewrite could help.
        #[serde(skip_serializing_if = "Option::is_none")]
        rewritten_query: Option<String>,
    },
}

/// Verdict status without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictStatus {
    /// See [`Verdict::Approved`].
    Approved,
    /// See [`Verdict::Denied`].
    Denied,
}

impl Verdict {
    /// Status of the verdict.
    #[must_use]
    pub const fn status(&self) -> VerdictStatus {
        match self {
            Self::Approved { .. } => VerdictStatus::Approved,
            Self::Denied { .. } => VerdictStatus::Denied,
        }
    }

    /// Reason given by the verifier.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Approved { reason, .. } | Self::Denied { reason, .. } => reason,
        }
    }

    /// Text shown to the user for this verdict.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Approved { response, .. } if !response.is_empty() => response,
            Self::Approved { reason, .. } | Self::Denied { reason, .. } => reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    rewritten_query: Option<String>,
}

/// Agent that approves or denies a cycle's retrievals.
pub struct VerifierAgent {
    deployment: String,
    system_prompt: String,
    params: GenerationParams,
}

impl VerifierAgent {
    /// Creates the verifier from its registry binding.
    #[must_use]
    pub fn new(spec: &AgentSpec, prompts: &PromptSet, config: &AgentConfig) -> Self {
        Self {
            deployment: spec.deployment.clone(),
            system_prompt: spec
                .system_prompt
                .clone()
                .unwrap_or_else(|| prompts.verifier.clone()),
            params: config.params_for(AgentRole::Verifier),
        }
    }

    /// Verifies `bundle` against `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Oracle`] if the call fails or the reply is not
    /// JSON, and [`AgentError::Contract`] if it is not a verdict.
    pub async fn verify(
        &self,
        provider: &dyn LlmProvider,
        query: &str,
        bundle: &RetrievalBundle,
    ) -> Result<(Verdict, AgentRun), AgentError> {
        let user_msg = build_verifier_prompt(query, bundle);
        let run = self
            .run(provider, &user_msg, &[], self.response_format())
            .await?;
        let value = run.structured().cloned().unwrap_or(Value::Null);
        let verdict = Self::parse_verdict(value, &run.raw)?;
        Ok((verdict, run))
    }

    /// Converts the decoded reply into a verdict.
    fn parse_verdict(value: Value, raw: &str) -> Result<Verdict, AgentError> {
        let contract = |message: String| AgentError::Contract {
            role: AgentRole::Verifier,
            message,
            raw: raw.to_string(),
        };

        let parsed: RawVerdict = serde_json::from_value(value)
            .map_err(|e| contract(format!("failed to parse verdict: {e}")))?;

        match parsed.status.trim().to_lowercase().as_str() {
            "approved" => Ok(Verdict::Approved {
                reason: parsed.reason.trim().to_string(),
                response: parsed.response.trim().to_string(),
            }),
            "denied" => Ok(Verdict::Denied {
                reason: parsed.reason.trim().to_string(),
                rewritten_query: parsed
                    .rewritten_query
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty()),
            }),
            other => Err(contract(format!("unknown verdict status: {other:?}"))),
        }
    }
}

impl Agent for VerifierAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Verifier
    }

    fn deployment(&self) -> &str {
        &self.deployment
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Structured
    }

    fn params(&self) -> GenerationParams {
        self.params
    }
}
