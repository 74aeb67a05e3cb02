//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use super::oracle::GenerationParams;
use crate::error::ConfigError;
use crate::role::AgentRole;

/// Default deployment used by roles the registry does not pin.
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o";
/// Default per-retriever timeout in seconds.
pub const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 90;
/// Default number of Plan → Retrieve → Verify cycles per query.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default Azure `OpenAI` API version.
pub const DEFAULT_API_VERSION: &str = "2024-10-21";
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default nucleus sampling mass.
const DEFAULT_TOP_P: f32 = 1.0;
/// Default sampling seed.
const DEFAULT_SEED: i64 = 42;
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 500;
/// Default retriever max tokens.
const DEFAULT_RETRIEVER_MAX_TOKENS: u32 = 1500;
/// Default verifier max tokens.
const DEFAULT_VERIFIER_MAX_TOKENS: u32 = 400;
/// Default summarizer max tokens.
const DEFAULT_SUMMARIZER_MAX_TOKENS: u32 = 3000;

/// Configuration for a research session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (`"openai"` or `"azure"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override; the resource endpoint for Azure.
    pub base_url: Option<String>,
    /// Azure `OpenAI` API version.
    pub api_version: String,
    /// Deployment for roles the registry does not pin.
    pub default_deployment: String,
    /// Agent registry file.
    pub registry_path: Option<PathBuf>,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<PathBuf>,
    /// Budget for each retrieval agent within one dispatch round.
    pub retrieval_timeout: Duration,
    /// Maximum Plan → Retrieve → Verify cycles per query.
    pub max_retries: u32,
    /// Sampling temperature for every role.
    pub temperature: f32,
    /// Nucleus sampling mass for every role.
    pub top_p: f32,
    /// Sampling seed for every role.
    pub seed: Option<i64>,
    /// Maximum tokens for planner replies.
    pub planner_max_tokens: u32,
    /// Maximum tokens for retriever replies.
    pub retriever_max_tokens: u32,
    /// Maximum tokens for verifier replies.
    pub verifier_max_tokens: u32,
    /// Maximum tokens for summarizer replies.
    pub summarizer_max_tokens: u32,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }

    /// Sampling parameters for the given role.
    #[must_use]
    pub const fn params_for(&self, role: AgentRole) -> GenerationParams {
        let max_tokens = match role {
            AgentRole::Planner => self.planner_max_tokens,
            AgentRole::Retriever(_) => self.retriever_max_tokens,
            AgentRole::Verifier => self.verifier_max_tokens,
            AgentRole::Summarizer => self.summarizer_max_tokens,
        };
        GenerationParams {
            temperature: self.temperature,
            max_tokens,
            top_p: self.top_p,
            seed: self.seed,
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    default_deployment: Option<String>,
    registry_path: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
    retrieval_timeout: Option<Duration>,
    max_retries: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    seed: Option<i64>,
    planner_max_tokens: Option<u32>,
    retriever_max_tokens: Option<u32>,
    verifier_max_tokens: Option<u32>,
    summarizer_max_tokens: Option<u32>,
}

fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
    })
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = env_first(&["AGENTIC_RAG_PROVIDER"]);
        }
        if self.api_key.is_none() {
            self.api_key = env_first(&[
                "OPENAI_API_KEY",
                "AZURE_OPENAI_API_KEY",
                "AGENTIC_RAG_API_KEY",
            ]);
        }
        if self.base_url.is_none() {
            self.base_url = env_first(&[
                "OPENAI_BASE_URL",
                "AZURE_OPENAI_ENDPOINT",
                "AGENTIC_RAG_BASE_URL",
            ]);
        }
        if self.api_version.is_none() {
            self.api_version = env_first(&["AGENTIC_RAG_API_VERSION", "OPENAI_API_VERSION"]);
        }
        if self.default_deployment.is_none() {
            self.default_deployment = env_first(&["AGENTIC_RAG_DEPLOYMENT"]);
        }
        if self.registry_path.is_none() {
            self.registry_path = env_first(&["AGENTIC_RAG_REGISTRY"]).map(PathBuf::from);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = env_first(&["AGENTIC_RAG_PROMPT_DIR"]).map(PathBuf::from);
        }
        if self.retrieval_timeout.is_none() {
            self.retrieval_timeout = env_first(&["AGENTIC_RAG_TIMEOUT_SECS"])
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries =
                env_first(&["AGENTIC_RAG_MAX_RETRIES"]).and_then(|v| v.parse().ok());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the Azure API version.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the fallback deployment.
    #[must_use]
    pub fn default_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.default_deployment = Some(deployment.into());
        self
    }

    /// Sets the agent registry file.
    #[must_use]
    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the per-retriever timeout.
    #[must_use]
    pub const fn retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = Some(timeout);
        self
    }

    /// Sets the cycle budget.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the nucleus sampling mass.
    #[must_use]
    pub const fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    /// Sets the sampling seed.
    #[must_use]
    pub const fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the planner max tokens.
    #[must_use]
    pub const fn planner_max_tokens(mut self, n: u32) -> Self {
        self.planner_max_tokens = Some(n);
        self
    }

    /// Sets the retriever max tokens.
    #[must_use]
    pub const fn retriever_max_tokens(mut self, n: u32) -> Self {
        self.retriever_max_tokens = Some(n);
        self
    }

    /// Sets the verifier max tokens.
    #[must_use]
    pub const fn verifier_max_tokens(mut self, n: u32) -> Self {
        self.verifier_max_tokens = Some(n);
        self
    }

    /// Sets the summarizer max tokens.
    #[must_use]
    pub const fn summarizer_max_tokens(mut self, n: u32) -> Self {
        self.summarizer_max_tokens = Some(n);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ApiKeyMissing`] if no API key was set, or
    /// [`ConfigError::Invalid`] for a zero cycle budget or zero timeout.
    pub fn build(self) -> Result<AgentConfig, ConfigError> {
        let api_key = self.api_key.ok_or(ConfigError::ApiKeyMissing)?;

        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(ConfigError::Invalid {
                message: "max retries must be at least 1".to_string(),
            });
        }

        let retrieval_timeout = self
            .retrieval_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_RETRIEVAL_TIMEOUT_SECS));
        if retrieval_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "retrieval timeout must be greater than zero".to_string(),
            });
        }

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            api_version: self
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            default_deployment: self
                .default_deployment
                .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
            registry_path: self.registry_path,
            prompt_dir: self.prompt_dir,
            retrieval_timeout,
            max_retries,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: self.top_p.unwrap_or(DEFAULT_TOP_P),
            seed: Some(self.seed.unwrap_or(DEFAULT_SEED)),
            planner_max_tokens: self
                .planner_max_tokens
                .unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            retriever_max_tokens: self
                .retriever_max_tokens
                .unwrap_or(DEFAULT_RETRIEVER_MAX_TOKENS),
            verifier_max_tokens: self
                .verifier_max_tokens
                .unwrap_or(DEFAULT_VERIFIER_MAX_TOKENS),
            summarizer_max_tokens: self
                .summarizer_max_tokens
                .unwrap_or(DEFAULT_SUMMARIZER_MAX_TOKENS),
        })
    }
}
