//! Orchestration controller.
//!
//! Drives one query through the research state machine:
//!
//! ```text
//! Planning ─► Dispatching ─► Verifying ─┬─► Summarizing   (approved)
//!    ▲                                  ├─► Retrying ─► Planning
//!    │                                  │     (denied, rewrite, budget left)
//!    └──────────────────────────────────┘
//!                                       └─► Aborted
//!            (no agents | denied without rewrite | budget exhausted)
//! ```
//!
//! The controller is the only writer of session history. Retrieval workers
//! return pure results that are folded in after each dispatch round.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use super::bundle::{RetrievalBundle, RetrievalEntry, serialize_duration};
use super::events::{EventSink, OrchestrationEvent, Phase, TracingEvents};
use super::message::{ChatMessage, TokenUsage};
use super::planner::PlanDecision;
use super::session::{ChatTurn, Session};
use super::verifier::Verdict;
use crate::error::{AgentError, OracleError, OrchestrationError};
use crate::role::AgentRole;

/// Longest accepted query, in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

const NO_AGENTS_ADVICE: &[&str] = &[
    "Ask about internal documents, experiment data or public information.",
    "Name the product, study or metric you are interested in.",
];

const REFINE_ADVICE: &[&str] = &[
    "Be specific about what you want to know or compare.",
    "Add context, such as timeframes, product names, or data ranges.",
    "Clarify your goal (e.g., \"summarize clinical impact\" or \"compare accuracy in a range\").",
];

/// Why a run ended without an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The planner selected no retriever.
    NoAgentsSelected {
        /// Planner's explanation.
        justification: String,
    },
    /// The verifier denied and offered no rewritten query.
    DeniedWithoutRewrite {
        /// Verifier's reason.
        reason: String,
    },
    /// Every cycle of the budget ended in a denial.
    RetryBudgetExhausted {
        /// Cycles run.
        attempts: u32,
        /// Verifier's reason on the last cycle.
        last_reason: String,
    },
}

impl AbortReason {
    /// Suggestions for the user on how to reword the query.
    #[must_use]
    pub const fn advice(&self) -> &'static [&'static str] {
        match self {
            Self::NoAgentsSelected { .. } => NO_AGENTS_ADVICE,
            Self::DeniedWithoutRewrite { .. } | Self::RetryBudgetExhausted { .. } => REFINE_ADVICE,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAgentsSelected { justification } if justification.is_empty() => {
                f.write_str("No agents matched this query.")
            }
            Self::NoAgentsSelected { justification } => {
                write!(f, "No agents matched this query: {justification}")
            }
            Self::DeniedWithoutRewrite { reason } => write!(
                f,
                "The verifier rejected the retrieved material and suggested no better query: {reason}"
            ),
            Self::RetryBudgetExhausted {
                attempts,
                last_reason,
            } => write!(
                f,
                "Maximum retries reached after {attempts} attempts without an approved answer: {last_reason}"
            ),
        }
    }
}

/// What the controller does after a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Write the answer from the approved bundle.
    Summarize,
    /// Run another cycle with this query.
    Retry {
        /// Rewritten query.
        query: String,
    },
    /// Stop without an answer.
    Abort(AbortReason),
}

/// Transition out of Planning: a plan with no retriever aborts the run.
#[must_use]
pub fn after_plan(plan: &PlanDecision) -> Option<AbortReason> {
    plan.is_empty().then(|| AbortReason::NoAgentsSelected {
        justification: plan.justification.clone(),
    })
}

/// Transition out of Verifying on cycle `attempt` of `max_retries`.
#[must_use]
pub fn after_verdict(verdict: &Verdict, attempt: u32, max_retries: u32) -> NextStep {
    match verdict {
        Verdict::Approved { .. } => NextStep::Summarize,
        Verdict::Denied {
            reason,
            rewritten_query: None,
        } => NextStep::Abort(AbortReason::DeniedWithoutRewrite {
            reason: reason.clone(),
        }),
        Verdict::Denied {
            rewritten_query: Some(query),
            ..
        } if attempt < max_retries => NextStep::Retry {
            query: query.clone(),
        },
        Verdict::Denied { reason, .. } => NextStep::Abort(AbortReason::RetryBudgetExhausted {
            attempts: attempt,
            last_reason: reason.clone(),
        }),
    }
}

/// Record of one Plan → Dispatch → Verify cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub attempt: u32,
    /// Query the cycle ran with.
    pub query: String,
    /// Planner decision.
    pub plan: PlanDecision,
    /// Retrieval results; absent when the plan aborted the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<RetrievalBundle>,
    /// Verifier decision; absent when the plan aborted the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The summarizer produced an answer.
    Answered {
        /// Answer text.
        answer: String,
    },
    /// The run stopped without an answer.
    Aborted {
        /// Machine-readable reason.
        reason: AbortReason,
        /// Human-readable reason.
        message: String,
        /// How the user might reword the query.
        advice: Vec<String>,
    },
}

impl RunOutcome {
    fn aborted(reason: AbortReason) -> Self {
        Self::Aborted {
            message: reason.to_string(),
            advice: reason.advice().iter().map(ToString::to_string).collect(),
            reason,
        }
    }

    /// Answer text, if the run succeeded.
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Answered { answer } => Some(answer),
            Self::Aborted { .. } => None,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Query as submitted.
    pub query: String,
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Cycles in order.
    pub cycles: Vec<CycleReport>,
    /// Token usage across every oracle call.
    pub usage: TokenUsage,
    /// Wall time of the run.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl RunReport {
    /// Number of cycles run.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.cycles.len()
    }
}

enum State {
    Planning,
    Dispatching(PlanDecision),
    Verifying(RetrievalBundle),
    Retrying(String),
    Summarizing(RetrievalBundle),
    Aborted(AbortReason),
}

/// Per-run bookkeeping.
struct RunState {
    original: String,
    current: String,
    attempt: u32,
    prior: Vec<ChatMessage>,
    cycles: Vec<CycleReport>,
    usage: TokenUsage,
}

impl RunState {
    fn cycle_mut(&mut self) -> Option<&mut CycleReport> {
        self.cycles.last_mut()
    }
}

/// Runs research queries against a [`Session`].
pub struct Controller {
    session: Session,
    events: Arc<dyn EventSink>,
}

impl Controller {
    /// Creates a controller that reports events to the log.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            events: Arc::new(TracingEvents),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Session the controller drives.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the session, history included.
    #[must_use]
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Runs one query to completion.
    ///
    /// Aborts (no agents, denied without rewrite, budget exhausted) are
    /// reported in [`RunReport::outcome`]. Agent turns gathered before a
    /// failure stay in the session history.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::InvalidQuery`] for an empty or oversized
    /// query, and the planning, verification or summarization error that
    /// stopped the run.
    pub async fn run(&mut self, query: &str) -> Result<RunReport, OrchestrationError> {
        let started = Instant::now();
        let original = validate_query(query)?;

        let mut state = RunState {
            original: original.clone(),
            current: original.clone(),
            attempt: 1,
            prior: self.session.dialogue(),
            cycles: Vec::new(),
            usage: TokenUsage::default(),
        };
        self.session.record(ChatTurn::user(original.as_str()));
        info!(query_len = original.len(), max_retries = self.session.max_retries(), "run started");

        match self.drive(&mut state).await {
            Ok(outcome) => {
                let elapsed = started.elapsed();
                info!(
                    attempts = state.cycles.len(),
                    tokens = state.usage.total_tokens,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    answered = outcome.answer().is_some(),
                    "run finished"
                );
                Ok(RunReport {
                    query: original,
                    outcome,
                    cycles: state.cycles,
                    usage: state.usage,
                    elapsed,
                })
            }
            Err(e) => {
                warn!(attempt = state.attempt, error = %e, "run failed");
                self.session.record(ChatTurn::system(format!("Error: {e}")));
                self.events.emit(&OrchestrationEvent::Aborted {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&mut self, run: &mut RunState) -> Result<RunOutcome, OrchestrationError> {
        let max_retries = self.session.max_retries();
        let mut state = State::Planning;

        loop {
            state = match state {
                State::Planning => self.plan(run).await?,
                State::Dispatching(plan) => self.dispatch(run, &plan).await,
                State::Verifying(bundle) => self.verify(run, bundle, max_retries).await?,
                State::Retrying(query) => {
                    run.attempt += 1;
                    self.phase(run.attempt, Phase::Retrying);
                    info!(attempt = run.attempt, query = %query, "retrying with rewritten query");
                    self.events.emit(&OrchestrationEvent::QueryRewritten {
                        attempt: run.attempt,
                        query: query.clone(),
                    });
                    run.current = query;
                    State::Planning
                }
                State::Summarizing(bundle) => {
                    return self.summarize(run, &bundle).await;
                }
                State::Aborted(reason) => {
                    warn!(attempt = run.attempt, reason = %reason, "run aborted");
                    let outcome = RunOutcome::aborted(reason);
                    if let RunOutcome::Aborted {
                        message, advice, ..
                    } = &outcome
                    {
                        self.events.emit(&OrchestrationEvent::Aborted {
                            reason: message.clone(),
                        });
                        let mut text = message.clone();
                        for tip in advice {
                            text.push_str("\n- ");
                            text.push_str(tip);
                        }
                        self.session.record(ChatTurn::system(text));
                    }
                    return Ok(outcome);
                }
            };
        }
    }

    async fn plan(&mut self, run: &mut RunState) -> Result<State, OrchestrationError> {
        self.phase(run.attempt, Phase::Planning);
        let available = self.session.dispatcher().configured();

        let (plan, agent_run) = self
            .session
            .agents()
            .planner
            .plan(self.session.provider(), &run.current, &available, &run.prior)
            .await
            .map_err(OrchestrationError::Planning)?;
        run.usage.accumulate(&agent_run.usage);

        if !plan.unrecognized.is_empty() {
            warn!(names = ?plan.unrecognized, "planner named unknown agents");
        }
        info!(attempt = run.attempt, agents = ?plan.agents_needed, "plan ready");

        let names: Vec<&str> = plan
            .agents_needed
            .iter()
            .map(|&kind| AgentRole::Retriever(kind).name())
            .collect();
        let summary = if names.is_empty() {
            format!("No agents selected. {}", plan.justification)
        } else {
            format!("Agents: {}. {}", names.join(", "), plan.justification)
        };
        self.session.record(ChatTurn::agent(
            AgentRole::Planner,
            summary.trim_end(),
            run.attempt,
        ));
        self.events.emit(&OrchestrationEvent::PlanReady {
            attempt: run.attempt,
            agents: plan.agents_needed.clone(),
            justification: plan.justification.clone(),
        });

        run.cycles.push(CycleReport {
            attempt: run.attempt,
            query: run.current.clone(),
            plan: plan.clone(),
            bundle: None,
            verdict: None,
        });

        Ok(after_plan(&plan).map_or(State::Dispatching(plan), State::Aborted))
    }

    async fn dispatch(&mut self, run: &mut RunState, plan: &PlanDecision) -> State {
        self.phase(run.attempt, Phase::Dispatching);

        let bundle = self
            .session
            .dispatcher()
            .dispatch(&plan.agents_needed, &run.current, &*self.events)
            .await;
        run.usage.accumulate(&bundle.usage());

        for (kind, entry) in bundle.iter() {
            let content = match entry {
                RetrievalEntry::Retrieved(r) => r.text.clone(),
                RetrievalEntry::Absent(absence) => format!("No data: {absence}"),
            };
            self.session
                .record(ChatTurn::agent(kind.into(), content, run.attempt));
        }

        if let Some(cycle) = run.cycle_mut() {
            cycle.bundle = Some(bundle.clone());
        }
        State::Verifying(bundle)
    }

    async fn verify(
        &mut self,
        run: &mut RunState,
        bundle: RetrievalBundle,
        max_retries: u32,
    ) -> Result<State, OrchestrationError> {
        self.phase(run.attempt, Phase::Verifying);

        let (verdict, agent_run) = self
            .session
            .agents()
            .verifier
            .verify(self.session.provider(), &run.current, &bundle)
            .await
            .map_err(verification_error)?;
        run.usage.accumulate(&agent_run.usage);

        info!(attempt = run.attempt, status = ?verdict.status(), "verdict");
        self.session.record(ChatTurn::agent(
            AgentRole::Verifier,
            format!("{:?}: {}", verdict.status(), verdict.reason()),
            run.attempt,
        ));
        self.events.emit(&OrchestrationEvent::Verdict {
            attempt: run.attempt,
            status: verdict.status(),
            content: verdict.content().to_string(),
        });

        let next = after_verdict(&verdict, run.attempt, max_retries);
        if let Some(cycle) = run.cycle_mut() {
            cycle.verdict = Some(verdict);
        }

        Ok(match next {
            NextStep::Summarize => State::Summarizing(bundle),
            NextStep::Retry { query } => State::Retrying(query),
            NextStep::Abort(reason) => State::Aborted(reason),
        })
    }

    async fn summarize(
        &mut self,
        run: &mut RunState,
        bundle: &RetrievalBundle,
    ) -> Result<RunOutcome, OrchestrationError> {
        self.phase(run.attempt, Phase::Summarizing);

        let agent_run = self
            .session
            .agents()
            .summarizer
            .summarize(self.session.provider(), &run.original, bundle, &run.prior)
            .await
            .map_err(OrchestrationError::Summarization)?;
        run.usage.accumulate(&agent_run.usage);

        self.session.record(ChatTurn::agent(
            AgentRole::Summarizer,
            agent_run.raw.as_str(),
            run.attempt,
        ));
        self.events.emit(&OrchestrationEvent::FinalSummary {
            text: agent_run.raw.clone(),
        });

        Ok(RunOutcome::Answered {
            answer: agent_run.raw,
        })
    }

    fn phase(&self, attempt: u32, phase: Phase) {
        self.events
            .emit(&OrchestrationEvent::PhaseStarted { attempt, phase });
    }
}

fn validate_query(query: &str) -> Result<String, OrchestrationError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(OrchestrationError::InvalidQuery {
            message: "query is empty".to_string(),
        });
    }
    if trimmed.len() > MAX_QUERY_LEN {
        return Err(OrchestrationError::InvalidQuery {
            message: format!(
                "query is {} bytes, limit is {MAX_QUERY_LEN}",
                trimmed.len()
            ),
        });
    }
    Ok(trimmed.to_string())
}

/// A verifier reply that is not a verdict is fatal for the query.
fn verification_error(e: AgentError) -> OrchestrationError {
    match e {
        AgentError::Contract { message, raw, .. }
        | AgentError::Oracle {
            source:
                OracleError::MalformedOutput {
                    message,
                    content: raw,
                },
            ..
        } => OrchestrationError::VerificationContract { message, raw },
        other @ AgentError::Oracle { .. } => OrchestrationError::Verification(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::AgentConfig;
    use crate::agent::events::NoEvents;
    use crate::agent::prompt::PromptSet;
    use crate::agent::registry::AgentRegistry;
    use crate::agent::session::Speaker;
    use crate::agent::test_support::ScriptedProvider;
    use crate::role::RetrieverKind;
    use proptest::prelude::*;

    const REGISTRY: &str = r#"
        [agents.planner]
        deployment = "planner"
        [agents.verifier]
        deployment = "verifier"
        [agents.summarizer]
        deployment = "summarizer"
        [agents.sharepoint]
        deployment = "sharepoint"
        [agents.web]
        deployment = "web"
    "#;

    fn controller(provider: Arc<ScriptedProvider>) -> Controller {
        let config = AgentConfig::builder()
            .api_key("k")
            .retrieval_timeout(Duration::from_millis(200))
            .build()
            .unwrap_or_else(|_| unreachable!());
        let registry = AgentRegistry::parse(REGISTRY, std::path::Path::new("t.toml"), "x")
            .unwrap_or_else(|_| unreachable!());
        let session = Session::new(provider, Arc::new(registry), &PromptSet::defaults(), &config);
        Controller::new(session).with_events(Arc::new(NoEvents))
    }

    fn denied(rewrite: Option<&str>) -> Verdict {
        Verdict::Denied {
            reason: "thin".to_string(),
            rewritten_query: rewrite.map(str::to_string),
        }
    }

    #[test]
    fn test_after_plan_empty_aborts() {
        let plan = PlanDecision {
            justification: "off topic".to_string(),
            ..PlanDecision::default()
        };
        assert_eq!(
            after_plan(&plan),
            Some(AbortReason::NoAgentsSelected {
                justification: "off topic".to_string()
            })
        );

        let plan = PlanDecision {
            agents_needed: vec![RetrieverKind::Web],
            ..PlanDecision::default()
        };
        assert!(after_plan(&plan).is_none());
    }

    #[test]
    fn test_after_verdict_table() {
        let approved = Verdict::Approved {
            reason: "ok".to_string(),
            response: "A".to_string(),
        };
        assert_eq!(after_verdict(&approved, 3, 3), NextStep::Summarize);
        assert_eq!(
            after_verdict(&denied(Some("X refined")), 1, 3),
            NextStep::Retry {
                query: "X refined".to_string()
            }
        );
        assert!(matches!(
            after_verdict(&denied(Some("X refined")), 3, 3),
            NextStep::Abort(AbortReason::RetryBudgetExhausted { attempts: 3, .. })
        ));
        assert!(matches!(
            after_verdict(&denied(None), 1, 3),
            NextStep::Abort(AbortReason::DeniedWithoutRewrite { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_retry_only_below_budget(attempt in 1u32..20, max in 1u32..20, rewrite in proptest::option::of("[a-z]{1,8}")) {
            let next = after_verdict(&denied(rewrite.as_deref()), attempt, max);
            match next {
                NextStep::Retry { .. } => prop_assert!(rewrite.is_some() && attempt < max),
                NextStep::Abort(AbortReason::DeniedWithoutRewrite { .. }) => prop_assert!(rewrite.is_none()),
                NextStep::Abort(AbortReason::RetryBudgetExhausted { attempts, .. }) => {
                    prop_assert!(rewrite.is_some() && attempt >= max);
                    prop_assert_eq!(attempts, attempt);
                }
                NextStep::Summarize | NextStep::Abort(AbortReason::NoAgentsSelected { .. }) => {
                    prop_assert!(false, "denial never summarizes");
                }
            }
        }
    }

    #[test]
    fn test_abort_reason_display_and_advice() {
        let reason = AbortReason::RetryBudgetExhausted {
            attempts: 3,
            last_reason: "still thin".to_string(),
        };
        assert!(reason.to_string().contains("Maximum retries reached"));
        assert_eq!(reason.advice().len(), 3);

        let reason = AbortReason::NoAgentsSelected {
            justification: String::new(),
        };
        assert_eq!(reason.to_string(), "No agents matched this query.");
    }

    #[test]
    fn test_verification_error_mapping() {
        let err = verification_error(AgentError::Oracle {
            role: AgentRole::Verifier,
            source: OracleError::MalformedOutput {
                message: "expected value".to_string(),
                content: "Approved!".to_string(),
            },
        });
        assert!(matches!(
            err,
            OrchestrationError::VerificationContract { ref raw, .. } if raw == "Approved!"
        ));

        let err = verification_error(AgentError::Oracle {
            role: AgentRole::Verifier,
            source: OracleError::Connection {
                message: "reset".to_string(),
            },
        });
        assert!(matches!(err, OrchestrationError::Verification(_)));
    }

    #[tokio::test]
    async fn test_run_rejects_empty_query() {
        let mut c = controller(Arc::new(ScriptedProvider::new()));
        let err = c.run("   ").await;
        assert!(matches!(err, Err(OrchestrationError::InvalidQuery { .. })));
        assert!(c.session().history().is_empty());
    }

    #[tokio::test]
    async fn test_run_approved_first_cycle() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("planner", r#"{"agents_needed": ["sharepoint"], "justification": "docs"}"#)
                .reply("sharepoint", "T1")
                .reply(
                    "verifier",
                    r#"{"status": "Approved", "reason": "ok", "response": "draft"}"#,
                )
                .reply("summarizer", "final answer"),
        );
        let mut c = controller(Arc::clone(&provider));

        let report = c.run("X").await.unwrap_or_else(|_| unreachable!());

        assert_eq!(report.outcome.answer(), Some("final answer"));
        assert_eq!(report.attempts(), 1);
        assert_eq!(report.usage.total_tokens, 60);
        assert_eq!(provider.calls("web"), 0);

        let speakers: Vec<Speaker> = c.session().history().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            vec![
                Speaker::User,
                Speaker::Agent(AgentRole::Planner),
                Speaker::Agent(AgentRole::Retriever(RetrieverKind::SharePoint)),
                Speaker::Agent(AgentRole::Verifier),
                Speaker::Agent(AgentRole::Summarizer),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_planner_failure_keeps_history() {
        let provider = Arc::new(ScriptedProvider::new().reply("planner", "not json"));
        let mut c = controller(provider);

        let err = c.run("X").await;
        assert!(matches!(err, Err(OrchestrationError::Planning(_))));

        let history = c.session().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].speaker, Speaker::System);
        assert!(history[1].content.contains("planning failed"));
    }

    #[tokio::test]
    async fn test_follow_up_sees_prior_dialogue() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("planner", r#"{"agents_needed": ["web"], "justification": "news"}"#)
                .reply("web", "W")
                .reply("verifier", r#"{"status": "Approved", "reason": "ok", "response": "r"}"#)
                .reply("summarizer", "answer"),
        );
        let mut c = controller(Arc::clone(&provider));

        c.run("first").await.unwrap_or_else(|_| unreachable!());
        c.run("second").await.unwrap_or_else(|_| unreachable!());

        let planner = provider.requests("planner");
        assert_eq!(planner[0].messages.len(), 2);
        assert_eq!(planner[1].messages.len(), 4);
        assert_eq!(planner[1].messages[1].content, "first");
        assert_eq!(planner[1].messages[2].content, "answer");
    }
}
