//! Planner agent.
//!
//! Reads the query and the retrievers on offer and produces a
//! [`PlanDecision`] naming the retrievers the dispatcher should run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::AgentConfig;
use super::message::{ChatMessage, ResponseFormat};
use super::oracle::GenerationParams;
use super::prompt::{PromptSet, build_planner_prompt};
use super::provider::LlmProvider;
use super::registry::AgentSpec;
use super::traits::{Agent, AgentRun};
use crate::error::AgentError;
use crate::role::{AgentRole, RetrieverKind};

/// Retrievers selected for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanDecision {
    /// Retrievers to run, deduplicated, in the order the planner named them.
    pub agents_needed: Vec<RetrieverKind>,
    /// Planner's explanation.
    pub justification: String,
    /// Names the planner emitted that are not retrieval agents.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecognized: Vec<String>,
}

impl PlanDecision {
    /// Returns `true` when no retriever was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents_needed.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    agents_needed: Vec<String>,
    #[serde(default)]
    justification: String,
}

/// Agent that selects retrievers for a query.
pub struct PlannerAgent {
    deployment: String,
    system_prompt: String,
    params: GenerationParams,
}

impl PlannerAgent {
    /// Creates the planner from its registry binding.
    #[must_use]
    pub fn new(spec: &AgentSpec, prompts: &PromptSet, config: &AgentConfig) -> Self {
        Self {
            deployment: spec.deployment.clone(),
            system_prompt: spec
                .system_prompt
                .clone()
                .unwrap_or_else(|| prompts.planner.clone()),
            params: config.params_for(AgentRole::Planner),
        }
    }

    /// Asks the planner which of `available` the query needs.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Oracle`] if the call fails or the reply is not
    /// JSON, and [`AgentError::Contract`] if it is not a plan.
    pub async fn plan(
        &self,
        provider: &dyn LlmProvider,
        query: &str,
        available: &[RetrieverKind],
        history: &[ChatMessage],
    ) -> Result<(PlanDecision, AgentRun), AgentError> {
        let user_msg = build_planner_prompt(query, available);
        let run = self
            .run(provider, &user_msg, history, self.response_format())
            .await?;
        let value = run.structured().cloned().unwrap_or(Value::Null);
        let plan = Self::parse_plan(value, &run.raw)?;
        Ok((plan, run))
    }

    /// Converts the decoded reply into a plan.
    fn parse_plan(value: Value, raw: &str) -> Result<PlanDecision, AgentError> {
        let parsed: RawPlan = serde_json::from_value(value).map_err(|e| AgentError::Contract {
            role: AgentRole::Planner,
            message: format!("failed to parse plan: {e}"),
            raw: raw.to_string(),
        })?;

        let mut plan = PlanDecision {
            justification: parsed.justification.trim().to_string(),
            ..PlanDecision::default()
        };

        for name in parsed.agents_needed {
            match AgentRole::parse(&name).and_then(AgentRole::retriever) {
                Some(kind) if !plan.agents_needed.contains(&kind) => plan.agents_needed.push(kind),
                Some(_) => {}
                None => plan.unrecognized.push(name),
            }
        }

        Ok(plan)
    }
}

impl Agent for PlannerAgent {
    fn role(&self) -> AgentRole {
        AgentRole::Planner
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
