//! Parallel retrieval dispatch.
//!
//! One task per planned retriever, each under the same timeout. Every
//! planned retriever gets exactly one bundle entry; failures and timeouts
//! become absence markers and never cancel sibling tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

use super::bundle::{Absence, RetrievalBundle, RetrievalEntry, Retrieved};
use super::events::{AgentStatus, EventSink, OrchestrationEvent};
use super::provider::LlmProvider;
use super::retriever::RetrieverAgent;
use super::traits::AgentRun;
use crate::error::AgentError;
use crate::role::{AgentRole, RetrieverKind};

type TaskOutput = (Result<Result<AgentRun, AgentError>, Elapsed>, Duration);

/// Runs planned retrievers concurrently and assembles the cycle's bundle.
pub struct RetrievalDispatcher {
    provider: Arc<dyn LlmProvider>,
    retrievers: BTreeMap<RetrieverKind, Arc<RetrieverAgent>>,
    timeout: Duration,
}

impl RetrievalDispatcher {
    /// Creates a dispatcher over the configured retrievers.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        retrievers: BTreeMap<RetrieverKind, Arc<RetrieverAgent>>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            retrievers,
            timeout,
        }
    }

    /// Per-agent timeout budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retrievers that have a bound agent.
    #[must_use]
    pub fn configured(&self) -> Vec<RetrieverKind> {
        self.retrievers.keys().copied().collect()
    }

    /// Runs every planned retriever against `query`.
    ///
    /// Returns once all tasks have finished, failed or timed out. A timed
    /// out call keeps running in the background; its reply is dropped.
    pub async fn dispatch(
        &self,
        planned: &[RetrieverKind],
        query: &str,
        events: &dyn EventSink,
    ) -> RetrievalBundle {
        let mut kinds = planned.to_vec();
        kinds.sort_unstable();
        kinds.dedup();

        for &kind in &kinds {
            emit_status(events, kind, AgentStatus::Pending, None);
        }

        let start = Instant::now();
        let mut bundle = RetrievalBundle::new();
        let mut pending = FuturesUnordered::new();

        for kind in kinds {
            let Some(agent) = self.retrievers.get(&kind) else {
                warn!(agent = %AgentRole::Retriever(kind), "planned retriever is not configured");
                let absence = Absence::NotConfigured;
                emit_status(events, kind, AgentStatus::Error, Some(absence.to_string()));
                bundle.insert(kind, RetrievalEntry::Absent(absence));
                continue;
            };

            let agent = Arc::clone(agent);
            let provider = Arc::clone(&self.provider);
            let query = query.to_string();
            let budget = self.timeout;

            emit_status(events, kind, AgentStatus::Running, None);
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(budget, agent.retrieve(&*provider, &query)).await;
                (result, started.elapsed())
            });

            pending.push(async move { (kind, handle.await) });
        }

        while let Some((kind, joined)) = pending.next().await {
            let entry = self.settle(kind, joined);
            let (status, detail) = match &entry {
                RetrievalEntry::Retrieved(_) => (AgentStatus::Done, None),
                RetrievalEntry::Absent(absence @ Absence::TimedOut { .. }) => {
                    (AgentStatus::Timeout, Some(absence.to_string()))
                }
                RetrievalEntry::Absent(absence) => (AgentStatus::Error, Some(absence.to_string())),
            };
            emit_status(events, kind, status, detail);
            bundle.insert(kind, entry);
        }

        info!(
            planned = bundle.len(),
            retrieved = bundle.retrieved().count(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "dispatch complete"
        );

        bundle
    }

    /// Maps one task's outcome to its bundle entry.
    fn settle(&self, kind: RetrieverKind, joined: Result<TaskOutput, JoinError>) -> RetrievalEntry {
        let role = AgentRole::Retriever(kind);
        match joined {
            Ok((Ok(Ok(run)), latency)) => {
                debug!(agent = %role, elapsed_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX), "retrieval done");
                RetrievalEntry::Retrieved(Retrieved {
                    text: run.raw,
                    latency,
                    usage: run.usage,
                })
            }
            Ok((Ok(Err(e)), _)) => {
                warn!(agent = %role, error = %e, "retrieval failed");
                RetrievalEntry::Absent(Absence::Failed {
                    kind: e.oracle_kind(),
                    message: e.to_string(),
                })
            }
            Ok((Err(_), _)) => {
                warn!(agent = %role, timeout_secs = self.timeout.as_secs_f64(), "retrieval timed out");
                RetrievalEntry::Absent(Absence::TimedOut {
                    after: self.timeout,
                })
            }
            Err(e) => {
                warn!(agent = %role, error = %e, "retrieval task failed");
                RetrievalEntry::Absent(Absence::Failed {
                    kind: None,
                    message: format!("task join failed: {e}"),
                })
            }
        }
    }
}

fn emit_status(
    events: &dyn EventSink,
    kind: RetrieverKind,
    status: AgentStatus,
    detail: Option<String>,
) {
    events.emit(&OrchestrationEvent::AgentStatus {
        role: AgentRole::Retriever(kind),
        status,
        detail,
    });
}
