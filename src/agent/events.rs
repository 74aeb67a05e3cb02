//! Presentation events emitted during a research run.
//!
//! Events are advisory: sinks must not block, and nothing in the controller
//! depends on a sink having seen an event.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::verifier::VerdictStatus;
use crate::role::{AgentRole, RetrieverKind};

/// Lifecycle of one retrieval agent within a dispatch round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Planned, not yet started.
    Pending,
    /// Call in flight.
    Running,
    /// Returned text.
    Done,
    /// Failed or not configured.
    Error,
    /// Exceeded the dispatch timeout.
    Timeout,
}

impl AgentStatus {
    /// Short label for progress output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Planner is selecting retrievers.
    Planning,
    /// Retrievers are running.
    Dispatching,
    /// Verifier is judging the bundle.
    Verifying,
    /// A rewritten query is replacing the current one.
    Retrying,
    /// Summarizer is writing the answer.
    Summarizing,
}

impl Phase {
    /// Short label for progress output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Dispatching => "dispatching",
            Self::Verifying => "verifying",
            Self::Retrying => "retrying",
            Self::Summarizing => "summarizing",
        }
    }
}

/// Event sent from the controller to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A phase began.
    PhaseStarted {
        /// Cycle number, starting at 1.
        attempt: u32,
        /// Phase entered.
        phase: Phase,
    },
    /// The planner selected retrievers.
    PlanReady {
        /// Cycle number.
        attempt: u32,
        /// Selected retrievers.
        agents: Vec<RetrieverKind>,
        /// Planner's explanation.
        justification: String,
    },
    /// A retrieval agent changed status.
    AgentStatus {
        /// Agent concerned.
        role: AgentRole,
        /// New status.
        status: AgentStatus,
        /// Failure or timeout detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// The verifier ruled on a cycle.
    Verdict {
        /// Cycle number.
        attempt: u32,
        /// Approved or denied.
        status: VerdictStatus,
        /// Verifier text shown to the user.
        content: String,
    },
    /// The next cycle will use a rewritten query.
    QueryRewritten {
        /// Cycle that will use it.
        attempt: u32,
        /// New query.
        query: String,
    },
    /// The final answer.
    FinalSummary {
        /// Answer text.
        text: String,
    },
    /// The run ended without an answer.
    Aborted {
        /// Human-readable reason.
        reason: String,
    },
}

/// Receiver of orchestration events.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must return promptly.
    fn emit(&self, event: &OrchestrationEvent);
}

/// Sink that drops every event.
pub struct NoEvents;

impl EventSink for NoEvents {
    fn emit(&self, _event: &OrchestrationEvent) {}
}

/// Sink that mirrors events into the `tracing` log.
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: &OrchestrationEvent) {
        match event {
            OrchestrationEvent::PhaseStarted { attempt, phase } => {
                debug!(attempt, phase = phase.as_str(), "phase started");
            }
            OrchestrationEvent::PlanReady {
                attempt, agents, ..
            } => {
                info!(attempt, agents = ?agents, "plan ready");
            }
            OrchestrationEvent::AgentStatus {
                role,
                status,
                detail,
            } => {
                debug!(role = %role, status = status.as_str(), detail = ?detail, "agent status");
            }
            OrchestrationEvent::Verdict {
                attempt, status, ..
            } => {
                info!(attempt, status = ?status, "verdict");
            }
            OrchestrationEvent::QueryRewritten { attempt, query } => {
                info!(attempt, query = %query, "query rewritten");
            }
            OrchestrationEvent::FinalSummary { text } => {
                info!(chars = text.len(), "final summary");
            }
            OrchestrationEvent::Aborted { reason } => {
                warn!(reason = %reason, "run aborted");
            }
        }
    }
}

impl<F> EventSink for F
where
    F: Fn(&OrchestrationEvent) + Send + Sync,
{
    fn emit(&self, event: &OrchestrationEvent) {
        self(event);
    }
}
