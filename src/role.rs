//! Agent role identities.
//!
//! Roles form a closed set. Names coming from the registry file or from the
//! planner's reply are resolved here, case-insensitively, so the rest of the
//! crate never compares agent names as strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Knowledge domain served by a retrieval agent.
///
/// The declaration order fixes the iteration order of retrieval bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    /// Document libraries on `SharePoint`.
    SharePoint,
    /// Structured data in a Fabric lakehouse.
    Fabric,
    /// Public web search.
    Web,
}

impl RetrieverKind {
    /// Every retriever kind, in bundle order.
    pub const ALL: [Self; 3] = [Self::SharePoint, Self::Fabric, Self::Web];

    /// Short human label used in prompts and progress output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SharePoint => "SharePoint",
            Self::Fabric => "Fabric",
            Self::Web => "Web",
        }
    }
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of an agent taking part in a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgentRole {
    /// Selects which retrievers a query needs.
    Planner,
    /// Fetches content from one knowledge domain.
    Retriever(RetrieverKind),
    /// Approves the gathered material or asks for a rewritten query.
    Verifier,
    /// Writes the final answer.
    Summarizer,
}

impl AgentRole {
    /// Every role, in registry listing order.
    pub const ALL: [Self; 6] = [
        Self::Planner,
        Self::Retriever(RetrieverKind::SharePoint),
        Self::Retriever(RetrieverKind::Fabric),
        Self::Retriever(RetrieverKind::Web),
        Self::Verifier,
        Self::Summarizer,
    ];

    /// Canonical agent name, as the planner is told to emit it.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Planner => "PlannerAgent",
            Self::Retriever(RetrieverKind::SharePoint) => "SharePointDataRetrievalAgent",
            Self::Retriever(RetrieverKind::Fabric) => "FabricDataRetrievalAgent",
            Self::Retriever(RetrieverKind::Web) => "BingDataRetrievalAgent",
            Self::Verifier => "VerifierAgent",
            Self::Summarizer => "SummaryAgent",
        }
    }

    /// Display icon shown next to chat turns produced by this role.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Planner => "🧭",
            Self::Retriever(RetrieverKind::SharePoint) => "📁",
            Self::Retriever(RetrieverKind::Fabric) => "🏭",
            Self::Retriever(RetrieverKind::Web) => "🌐",
            Self::Verifier => "✅",
            Self::Summarizer => "📝",
        }
    }

    /// Returns the retriever kind for retrieval roles.
    #[must_use]
    pub const fn retriever(self) -> Option<RetrieverKind> {
        match self {
            Self::Retriever(kind) => Some(kind),
            _ => None,
        }
    }

    /// Resolves a canonical name or alias, ignoring case, spaces, `-` and `_`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "planner" | "planneragent" => Some(Self::Planner),
            "sharepoint" | "sharepointagent" | "sharepointdataretrievalagent" => {
                Some(Self::Retriever(RetrieverKind::SharePoint))
            }
            "fabric" | "fabricagent" | "fabricdataretrievalagent" => {
                Some(Self::Retriever(RetrieverKind::Fabric))
            }
            "web" | "bing" | "webagent" | "bingagent" | "bingdataretrievalagent" => {
                Some(Self::Retriever(RetrieverKind::Web))
            }
            "verifier" | "verifieragent" => Some(Self::Verifier),
            "summarizer" | "summary" | "summaryagent" | "summarizeragent" => {
                Some(Self::Summarizer)
            }
            _ => None,
        }
    }
}

impl From<RetrieverKind> for AgentRole {
    fn from(kind: RetrieverKind) -> Self {
        Self::Retriever(kind)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ConfigError::UnknownAgent {
            name: s.to_string(),
        })
    }
}

impl Serialize for AgentRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AgentRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
