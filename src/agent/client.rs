//! Provider factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::registry::AgentRegistry;
use crate::error::ConfigError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): OpenAI-compatible APIs via `async-openai`
/// - `"azure"`: Azure `OpenAI`, one client per deployment in `registry`
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedProvider`] for unknown provider names
/// or when the crate was built without the `openai` feature, and
/// [`ConfigError::Invalid`] when Azure has no endpoint.
#[cfg(feature = "openai")]
pub fn create_provider(
    config: &AgentConfig,
    registry: &AgentRegistry,
) -> Result<Box<dyn LlmProvider>, ConfigError> {
    use crate::agent::providers::{AzureOpenAiProvider, OpenAiProvider};

    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config))),
        "azure" => Ok(Box::new(AzureOpenAiProvider::new(
            config,
            registry.deployments(),
        )?)),
        other => Err(ConfigError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Errors
///
/// Always returns [`ConfigError::UnsupportedProvider`]: no backend was
/// compiled in.
#[cfg(not(feature = "openai"))]
pub fn create_provider(
    config: &AgentConfig,
    _registry: &AgentRegistry,
) -> Result<Box<dyn LlmProvider>, ConfigError> {
    Err(ConfigError::UnsupportedProvider {
        name: config.provider.clone(),
    })
}
