//! Research session context.
//!
//! A [`Session`] owns everything that lives as long as one conversation: the
//! shared provider handle, the immutable agent registry, the agents built
//! from it and the ordered chat history. The caller creates it and hands it
//! to a [`Controller`](super::controller::Controller); nothing here is
//! process-global.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::client::create_provider;
use super::config::AgentConfig;
use super::dispatcher::RetrievalDispatcher;
use super::message::{ChatMessage, assistant_message, user_message};
use super::planner::PlannerAgent;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::registry::{AgentRegistry, AgentSpec};
use super::retriever::RetrieverAgent;
use super::summarizer::SummarizerAgent;
use super::verifier::VerifierAgent;
use crate::error::ConfigError;
use crate::role::{AgentRole, RetrieverKind};

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The person asking.
    User,
    /// One of the agents.
    Agent(AgentRole),
    /// The orchestrator itself: aborts, errors and advice.
    System,
}

impl Speaker {
    /// Display icon.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::User => "🧑",
            Self::Agent(role) => role.icon(),
            Self::System => "⚙️",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Agent(role) => role.name(),
            Self::System => "System",
        }
    }
}

/// One entry of the session history, with display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    /// Producer of the turn.
    pub speaker: Speaker,
    /// Turn text.
    pub content: String,
    /// Cycle the turn belongs to, for agent turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl ChatTurn {
    /// A user query.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
            attempt: None,
        }
    }

    /// An agent output within a cycle.
    #[must_use]
    pub fn agent(role: AgentRole, content: impl Into<String>, attempt: u32) -> Self {
        Self {
            speaker: Speaker::Agent(role),
            content: content.into(),
            attempt: Some(attempt),
        }
    }

    /// An orchestrator notice.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            content: content.into(),
            attempt: None,
        }
    }
}

/// The agents of a session, one per configured role.
pub struct AgentSet {
    /// Planner.
    pub planner: PlannerAgent,
    /// Verifier.
    pub verifier: VerifierAgent,
    /// Summarizer.
    pub summarizer: SummarizerAgent,
    /// Retrievers bound in the registry.
    pub retrievers: BTreeMap<RetrieverKind, Arc<RetrieverAgent>>,
}

impl AgentSet {
    /// Builds every agent the registry binds.
    #[must_use]
    pub fn build(registry: &AgentRegistry, prompts: &PromptSet, config: &AgentConfig) -> Self {
        let fallback = AgentSpec {
            deployment: config.default_deployment.clone(),
            system_prompt: None,
            knowledge_source: None,
        };
        let spec = |role: AgentRole| registry.get(role).unwrap_or(&fallback);

        let retrievers = registry
            .retrievers()
            .into_iter()
            .map(|kind| {
                let agent = RetrieverAgent::new(kind, spec(kind.into()), prompts, config);
                (kind, Arc::new(agent))
            })
            .collect();

        Self {
            planner: PlannerAgent::new(spec(AgentRole::Planner), prompts, config),
            verifier: VerifierAgent::new(spec(AgentRole::Verifier), prompts, config),
            summarizer: SummarizerAgent::new(spec(AgentRole::Summarizer), prompts, config),
            retrievers,
        }
    }
}

/// State of one conversation.
pub struct Session {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<AgentRegistry>,
    agents: AgentSet,
    dispatcher: RetrievalDispatcher,
    max_retries: u32,
    history: Vec<ChatTurn>,
}

impl Session {
    /// Creates a session over an existing provider.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<AgentRegistry>,
        prompts: &PromptSet,
        config: &AgentConfig,
    ) -> Self {
        let agents = AgentSet::build(&registry, prompts, config);
        let dispatcher = RetrievalDispatcher::new(
            Arc::clone(&provider),
            agents.retrievers.clone(),
            config.retrieval_timeout,
        );
        Self {
            provider,
            registry,
            agents,
            dispatcher,
            max_retries: config.max_retries,
            history: Vec::new(),
        }
    }

    /// Loads the registry and prompts named by `config` and connects the
    /// configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the registry is invalid or the provider
    /// cannot be created.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        let registry = AgentRegistry::from_config(config)?;
        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(config, &registry)?);
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Ok(Self::new(provider, Arc::new(registry), &prompts, config))
    }

    /// Shared provider handle.
    #[must_use]
    pub fn provider(&self) -> &dyn LlmProvider {
        &*self.provider
    }

    /// Registry the session was built from.
    #[must_use]
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Agents of this session.
    #[must_use]
    pub const fn agents(&self) -> &AgentSet {
        &self.agents
    }

    /// Retrieval dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &RetrievalDispatcher {
        &self.dispatcher
    }

    /// Cycle budget per query.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// All turns so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Appends a turn.
    pub fn record(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    /// Prior user queries and final answers as oracle messages.
    ///
    /// Intermediate agent output stays out so follow-up questions see the
    /// conversation, not the retrieval traffic.
    #[must_use]
    pub fn dialogue(&self) -> Vec<ChatMessage> {
        self.history
            .iter()
            .filter_map(|turn| match turn.speaker {
                Speaker::User => Some(user_message(&turn.content)),
                Speaker::Agent(AgentRole::Summarizer) => Some(assistant_message(&turn.content)),
                Speaker::Agent(_) | Speaker::System => None,
            })
            .collect()
    }
}
