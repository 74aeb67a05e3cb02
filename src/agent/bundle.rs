//! Per-cycle retrieval results.
//!
//! A [`RetrievalBundle`] holds exactly one entry per retriever named in the
//! cycle's plan: either the retrieved text or an explicit absence marker.
//! Bundles are built fresh by every dispatch round and never merged.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::message::TokenUsage;
use crate::error::OracleErrorKind;
use crate::role::RetrieverKind;

/// Marker line that opens the citation trailer of a retrieval reply.
const CITATIONS_MARKER: &str = "**Citations:**";

/// Text returned by one retrieval agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retrieved {
    /// Reply text, citation trailer included.
    pub text: String,
    /// Time the agent took.
    #[serde(serialize_with = "serialize_duration")]
    pub latency: Duration,
    /// Token usage of the call.
    pub usage: TokenUsage,
}

impl Retrieved {
    /// Citation entries listed after the `**Citations:**` marker.
    #[must_use]
    pub fn citations(&self) -> Vec<&str> {
        let Some((_, trailer)) = self.text.split_once(CITATIONS_MARKER) else {
            return Vec::new();
        };
        trailer
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*']).trim())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

/// Why a planned retriever has no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Absence {
    /// The agent exceeded the dispatch timeout; any late reply is discarded.
    TimedOut {
        /// Budget that was exceeded.
        #[serde(serialize_with = "serialize_duration")]
        after: Duration,
    },
    /// The agent failed.
    Failed {
        /// Oracle failure kind, when the failure came from the oracle.
        kind: Option<OracleErrorKind>,
        /// Failure detail.
        message: String,
    },
    /// The registry has no agent bound to this retriever.
    NotConfigured,
}

impl fmt::Display for Absence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { after } => write!(f, "timed out after {:.1}s", after.as_secs_f64()),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
            Self::NotConfigured => f.write_str("not configured"),
        }
    }
}

/// Outcome of one planned retriever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetrievalEntry {
    /// The agent returned text.
    Retrieved(Retrieved),
    /// The agent produced nothing usable.
    Absent(Absence),
}

/// Mapping from retriever to its outcome for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RetrievalBundle {
    entries: BTreeMap<RetrieverKind, RetrievalEntry>,
}

impl RetrievalBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for a retriever, replacing any earlier one.
    pub fn insert(&mut self, kind: RetrieverKind, entry: RetrievalEntry) {
        self.entries.insert(kind, entry);
    }

    /// Outcome for a retriever, if it was planned.
    #[must_use]
    pub fn get(&self, kind: RetrieverKind) -> Option<&RetrievalEntry> {
        self.entries.get(&kind)
    }

    /// All entries in retriever order.
    pub fn iter(&self) -> impl Iterator<Item = (RetrieverKind, &RetrievalEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Entries that carry retrieved text.
    pub fn retrieved(&self) -> impl Iterator<Item = (RetrieverKind, &Retrieved)> {
        self.iter().filter_map(|(kind, entry)| match entry {
            RetrievalEntry::Retrieved(r) => Some((kind, r)),
            RetrievalEntry::Absent(_) => None,
        })
    }

    /// Entries marked absent.
    pub fn absent(&self) -> impl Iterator<Item = (RetrieverKind, &Absence)> {
        self.iter().filter_map(|(kind, entry)| match entry {
            RetrievalEntry::Absent(a) => Some((kind, a)),
            RetrievalEntry::Retrieved(_) => None,
        })
    }

    /// Number of planned retrievers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no retriever was planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if at least one retriever returned text.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.retrieved().next().is_some()
    }

    /// Total token usage of the retrieval calls that completed.
    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for (_, r) in self.retrieved() {
            total.accumulate(&r.usage);
        }
        total
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}
