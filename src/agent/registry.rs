//! Agent registry: which deployment, prompt and knowledge source each role uses.
//!
//! The registry is read once at session start from a TOML file:
//!
//! ```toml
//! [agents.planner]
//! deployment = "gpt-4o"
//!
//! [agents.SharePointDataRetrievalAgent]
//! deployment = "gpt-4o-mini"
//! knowledge_source = "https://contoso.sharepoint.com/sites/rnd"
//!
//! [agents.web]
//! system_prompt = "You search the public web..."
//! ```
//!
//! Role names are resolved with [`AgentRole::parse`]; an unknown name fails
//! the load. Planner, verifier and summarizer always exist and default to
//! the configured fallback deployment. Retrievers exist only when listed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::config::AgentConfig;
use crate::error::ConfigError;
use crate::role::{AgentRole, RetrieverKind};

/// Binding of one role to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    /// Deployment or model identifier.
    pub deployment: String,
    /// Role-specific system prompt, overriding the prompt set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// External knowledge source the agent is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_source: Option<String>,
}

impl AgentSpec {
    fn bare(deployment: &str) -> Self {
        Self {
            deployment: deployment.to_string(),
            system_prompt: None,
            knowledge_source: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    agents: BTreeMap<String, SpecFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    deployment: Option<String>,
    system_prompt: Option<String>,
    knowledge_source: Option<String>,
}

/// Immutable mapping from role to its oracle binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRegistry {
    specs: BTreeMap<AgentRole, AgentSpec>,
}

impl AgentRegistry {
    /// Binds every role, all three retrievers included, to one deployment.
    #[must_use]
    pub fn with_defaults(default_deployment: &str) -> Self {
        let specs = AgentRole::ALL
            .into_iter()
            .map(|role| (role, AgentSpec::bare(default_deployment)))
            .collect();
        Self { specs }
    }

    /// Loads the registry named by the configuration, or binds every role
    /// to the default deployment when no file is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or validated.
    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        config.registry_path.as_deref().map_or_else(
            || Ok(Self::with_defaults(&config.default_deployment)),
            |path| Self::load(path, &config.default_deployment),
        )
    }

    /// Reads and validates a registry file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any
    /// validation error from [`AgentRegistry::parse`].
    pub fn load(path: &Path, default_deployment: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path, default_deployment)
    }

    /// Parses registry TOML; `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML,
    /// [`ConfigError::UnknownAgent`] for names outside the role set,
    /// [`ConfigError::DuplicateAgent`] when two entries resolve to one role,
    /// and [`ConfigError::Invalid`] for an empty deployment.
    pub fn parse(text: &str, origin: &Path, default_deployment: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut specs = BTreeMap::new();
        for (name, entry) in file.agents {
            let role: AgentRole = name.parse()?;

            let deployment = entry
                .deployment
                .unwrap_or_else(|| default_deployment.to_string());
            if deployment.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("agent {role} has an empty deployment"),
                });
            }

            let spec = AgentSpec {
                deployment,
                system_prompt: entry.system_prompt.filter(|p| !p.trim().is_empty()),
                knowledge_source: entry.knowledge_source.filter(|s| !s.trim().is_empty()),
            };

            if specs.insert(role, spec).is_some() {
                return Err(ConfigError::DuplicateAgent { role });
            }
        }

        for role in [AgentRole::Planner, AgentRole::Verifier, AgentRole::Summarizer] {
            specs
                .entry(role)
                .or_insert_with(|| AgentSpec::bare(default_deployment));
        }

        Ok(Self { specs })
    }

    /// Binding for a role, if configured.
    #[must_use]
    pub fn get(&self, role: AgentRole) -> Option<&AgentSpec> {
        self.specs.get(&role)
    }

    /// Configured retrievers, in bundle order.
    #[must_use]
    pub fn retrievers(&self) -> Vec<RetrieverKind> {
        self.specs.keys().filter_map(|role| role.retriever()).collect()
    }

    /// Distinct deployments the session addresses.
    #[must_use]
    pub fn deployments(&self) -> BTreeSet<&str> {
        self.specs.values().map(|s| s.deployment.as_str()).collect()
    }

    /// All bindings in role order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentRole, &AgentSpec)> {
        self.specs.iter().map(|(role, spec)| (*role, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<AgentRegistry, ConfigError> {
        AgentRegistry::parse(text, Path::new("agents.toml"), "fallback")
    }

    #[test]
    fn test_with_defaults_binds_every_role() {
        let registry = AgentRegistry::with_defaults("gpt-4o");
        assert_eq!(registry.iter().count(), 6);
        assert_eq!(registry.retrievers(), RetrieverKind::ALL.to_vec());
        assert_eq!(registry.deployments().len(), 1);
    }

    #[test]
    fn test_parse_aliases_and_fallbacks() {
        let registry = parse(
            r#"
            [agents.SharePointDataRetrievalAgent]
            deployment = "gpt-4o-mini"
            knowledge_source = "rnd-library"

            [agents.verifier]
            deployment = "o4-mini"
            system_prompt = "Be strict."
            "#,
        )
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(registry.retrievers(), vec![RetrieverKind::SharePoint]);
        let sp = registry
            .get(AgentRole::Retriever(RetrieverKind::SharePoint))
            .unwrap_or_else(|| unreachable!());
        assert_eq!(sp.knowledge_source.as_deref(), Some("rnd-library"));

        let verifier = registry
            .get(AgentRole::Verifier)
            .unwrap_or_else(|| unreachable!());
        assert_eq!(verifier.deployment, "o4-mini");
        assert_eq!(verifier.system_prompt.as_deref(), Some("Be strict."));

        let planner = registry
            .get(AgentRole::Planner)
            .unwrap_or_else(|| unreachable!());
        assert_eq!(planner.deployment, "fallback");
        assert!(registry.get(AgentRole::Retriever(RetrieverKind::Web)).is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_agent() {
        let err = parse("[agents.DatabaseAgent]\ndeployment = \"x\"\n");
        assert!(matches!(err, Err(ConfigError::UnknownAgent { name }) if name == "DatabaseAgent"));
    }

    #[test]
    fn test_parse_rejects_duplicate_role() {
        let err = parse("[agents.web]\n[agents.bing]\n");
        assert!(matches!(
            err,
            Err(ConfigError::DuplicateAgent {
                role: AgentRole::Retriever(RetrieverKind::Web)
            })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_deployment() {
        let err = parse("[agents.fabric]\ndeployment = \"  \"\n");
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = parse("[agents.fabric]\nmodel = \"x\"\n");
        assert!(matches!(err, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let err = AgentRegistry::load(&dir.path().join("missing.toml"), "x");
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_config_reads_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("agents.toml");
        std::fs::write(&path, "[agents.web]\ndeployment = \"web-dep\"\n")
            .unwrap_or_else(|_| unreachable!());

        let config = AgentConfig::builder()
            .api_key("k")
            .registry_path(&path)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let registry = AgentRegistry::from_config(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(registry.retrievers(), vec![RetrieverKind::Web]);
        assert!(registry.deployments().contains("web-dep"));
    }
}
