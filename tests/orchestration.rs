//! End-to-end controller behavior against a scripted oracle.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use agentic_rag::agent::{
    AbortReason, Absence, AgentConfig, AgentRegistry, ChatRequest, ChatResponse, Controller,
    LlmProvider, OrchestrationEvent, Phase, PromptSet, RetrievalEntry, RunOutcome, Session,
    Speaker, TokenUsage,
};
use agentic_rag::error::{OracleError, OrchestrationError};
use agentic_rag::{AgentRole, RetrieverKind};
use async_trait::async_trait;

#[derive(Default)]
struct Script {
    replies: VecDeque<String>,
    delay: Duration,
    prompts: Vec<String>,
}

/// Oracle keyed by deployment. Each deployment replays its queue; the last
/// reply repeats.
#[derive(Default)]
struct MockOracle {
    scripts: Mutex<HashMap<String, Script>>,
}

impl MockOracle {
    fn scripts(&self) -> MutexGuard<'_, HashMap<String, Script>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reply(self, deployment: &str, text: &str) -> Self {
        self.scripts()
            .entry(deployment.to_string())
            .or_default()
            .replies
            .push_back(text.to_string());
        self
    }

    fn hang(self, deployment: &str, delay: Duration) -> Self {
        self.scripts()
            .entry(deployment.to_string())
            .or_default()
            .delay = delay;
        self
    }

    fn calls(&self, deployment: &str) -> usize {
        self.scripts().get(deployment).map_or(0, |s| s.prompts.len())
    }

    /// Last user message of every request sent to `deployment`.
    fn prompts(&self, deployment: &str) -> Vec<String> {
        self.scripts()
            .get(deployment)
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for MockOracle {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError> {
        let (reply, delay) = {
            let mut scripts = self.scripts();
            let script = scripts.entry(request.model.clone()).or_default();
            script.prompts.push(
                request
                    .messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
            );
            let reply = if script.replies.len() > 1 {
                script.replies.pop_front()
            } else {
                script.replies.front().cloned()
            };
            (reply, script.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        reply
            .map(|content| ChatResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
                finish_reason: Some("stop".to_string()),
            })
            .ok_or_else(|| OracleError::Connection {
                message: format!("no script for {}", request.model),
            })
    }
}

const REGISTRY: &str = r#"
[agents.planner]
deployment = "planner"

[agents.verifier]
deployment = "verifier"

[agents.summarizer]
deployment = "summarizer"

[agents.SharePointDataRetrievalAgent]
deployment = "sharepoint"
knowledge_source = "rnd-library"

[agents.BingDataRetrievalAgent]
deployment = "web"
"#;

const APPROVED: &str =
    r#"{"status": "Approved", "reason": "complete", "response": "draft", "rewritten_query": ""}"#;

fn controller(oracle: &Arc<MockOracle>, max_retries: u32, timeout: Duration) -> Controller {
    let config = AgentConfig::builder()
        .api_key("test")
        .max_retries(max_retries)
        .retrieval_timeout(timeout)
        .build()
        .unwrap_or_else(|_| unreachable!());
    let registry = AgentRegistry::parse(REGISTRY, Path::new("agents.toml"), "unused")
        .unwrap_or_else(|_| unreachable!());
    let provider: Arc<dyn LlmProvider> = Arc::clone(oracle) as Arc<dyn LlmProvider>;
    let session = Session::new(
        provider,
        Arc::new(registry),
        &PromptSet::defaults(),
        &config,
    );
    Controller::new(session)
}

fn plan(agents: &[&str]) -> String {
    serde_json::json!({"agents_needed": agents, "justification": "test"}).to_string()
}

#[tokio::test]
async fn empty_plan_aborts_before_dispatch() {
    let oracle = Arc::new(MockOracle::default().reply("planner", &plan(&[])));
    let mut c = controller(&oracle, 3, Duration::from_secs(5));

    let report = c.run("What is the weather on Mars?").await.unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::NoAgentsSelected { .. },
            ..
        }
    ));
    assert_eq!(oracle.calls("planner"), 1);
    assert_eq!(oracle.calls("sharepoint"), 0);
    assert_eq!(oracle.calls("web"), 0);
    assert_eq!(oracle.calls("verifier"), 0);
    assert_eq!(oracle.calls("summarizer"), 0);
    assert!(report.cycles[0].bundle.is_none());
}

#[tokio::test]
async fn bundle_has_one_entry_per_planned_agent() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply(
                "planner",
                &plan(&["SharePointDataRetrievalAgent", "FabricDataRetrievalAgent", "BingDataRetrievalAgent"]),
            )
            .reply("sharepoint", "T1")
            .reply("web", "W1")
            .reply("verifier", APPROVED)
            .reply("summarizer", "answer"),
    );
    let mut c = controller(&oracle, 3, Duration::from_secs(5));

    let report = c.run("X").await.unwrap_or_else(|_| unreachable!());
    let bundle = report.cycles[0].bundle.as_ref().unwrap_or_else(|| unreachable!());

    assert_eq!(bundle.len(), 3);
    assert_eq!(
        bundle.get(RetrieverKind::Fabric),
        Some(&RetrievalEntry::Absent(Absence::NotConfigured))
    );
    assert!(matches!(bundle.get(RetrieverKind::Web), Some(RetrievalEntry::Retrieved(_))));
    assert!(oracle.prompts("verifier")[0].contains("FabricDataRetrievalAgent: not configured"));
}

#[tokio::test]
async fn hanging_retriever_does_not_block_dispatch() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["sharepoint", "web"]))
            .reply("sharepoint", "T1")
            .reply("web", "late")
            .hang("web", Duration::from_secs(60))
            .reply("verifier", APPROVED)
            .reply("summarizer", "answer"),
    );
    let mut c = controller(&oracle, 3, Duration::from_millis(100));

    let start = Instant::now();
    let report = c.run("X").await.unwrap_or_else(|_| unreachable!());

    assert!(start.elapsed() < Duration::from_secs(5));
    let bundle = report.cycles[0].bundle.as_ref().unwrap_or_else(|| unreachable!());
    assert!(matches!(
        bundle.get(RetrieverKind::Web),
        Some(RetrievalEntry::Absent(Absence::TimedOut { .. }))
    ));
    assert!(!oracle.prompts("verifier")[0].contains("late"));
}

#[tokio::test]
async fn retry_budget_exhausted_after_max_cycles() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["web"]))
            .reply("web", "thin")
            .reply(
                "verifier",
                r#"{"status": "Denied", "reason": "thin", "response": "", "rewritten_query": "X refined"}"#,
            ),
    );
    let mut c = controller(&oracle, 3, Duration::from_secs(5));

    let report = c.run("X").await.unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        &report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::RetryBudgetExhausted { attempts: 3, .. },
            advice,
            ..
        } if !advice.is_empty()
    ));
    assert_eq!(oracle.calls("planner"), 3);
    assert_eq!(oracle.calls("verifier"), 3);
    assert_eq!(oracle.calls("summarizer"), 0);
    assert_eq!(report.attempts(), 3);
    assert_eq!(report.usage.total_tokens, 9 * 15);

    let last = c.session().history().last().unwrap_or_else(|| unreachable!());
    assert_eq!(last.speaker, Speaker::System);
    assert!(last.content.contains("Maximum retries reached"));
}

#[tokio::test]
async fn denial_without_rewrite_stops_on_same_attempt() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["sharepoint"]))
            .reply("sharepoint", "nothing relevant")
            .reply(
                "verifier",
                r#"{"status": "Denied", "reason": "out of scope", "response": "", "rewritten_query": ""}"#,
            ),
    );
    let mut c = controller(&oracle, 3, Duration::from_secs(5));

    let report = c.run("X").await.unwrap_or_else(|_| unreachable!());

    assert!(matches!(
        report.outcome,
        RunOutcome::Aborted {
            reason: AbortReason::DeniedWithoutRewrite { .. },
            ..
        }
    ));
    assert_eq!(oracle.calls("planner"), 1);
    assert_eq!(report.attempts(), 1);
}

#[tokio::test]
async fn rewritten_query_drives_next_cycle_and_summary_uses_original() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["SharePoint", "Web"]))
            .reply("sharepoint", "T1")
            .reply("sharepoint", "T2")
            .reply("web", "never")
            .hang("web", Duration::from_secs(60))
            .reply(
                "verifier",
                r#"{"status": "Denied", "reason": "web missing", "rewritten_query": "X refined"}"#,
            )
            .reply("verifier", APPROVED)
            .reply("summarizer", "final"),
    );
    let mut c = controller(&oracle, 3, Duration::from_millis(100));

    let report = c.run("X").await.unwrap_or_else(|_| unreachable!());

    assert_eq!(report.outcome.answer(), Some("final"));
    assert_eq!(report.attempts(), 2);
    assert_eq!(report.cycles[0].query, "X");
    assert_eq!(report.cycles[1].query, "X refined");

    let planner = oracle.prompts("planner");
    assert!(planner[0].contains("<query>X</query>"));
    assert!(planner[1].contains("<query>X refined</query>"));

    let verifier = oracle.prompts("verifier");
    assert!(verifier[0].contains("T1"));
    assert!(verifier[0].contains("BingDataRetrievalAgent: timed out"));

    let summary = oracle.prompts("summarizer");
    assert_eq!(summary.len(), 1);
    assert!(summary[0].contains("<query>X</query>"));
    assert!(summary[0].contains("T2"));
    assert!(!summary[0].contains("T1"));
}

#[tokio::test]
async fn undecodable_verdict_is_fatal_and_history_is_kept() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["sharepoint"]))
            .reply("sharepoint", "T1")
            .reply("verifier", "Looks good to me."),
    );
    let mut c = controller(&oracle, 3, Duration::from_secs(5));

    let err = c.run("X").await;

    assert!(matches!(
        err,
        Err(OrchestrationError::VerificationContract { ref raw, .. }) if raw == "Looks good to me."
    ));
    assert_eq!(oracle.calls("planner"), 1);
    assert!(
        c.session()
            .history()
            .iter()
            .any(|t| t.speaker == Speaker::Agent(AgentRole::Retriever(RetrieverKind::SharePoint))
                && t.content == "T1")
    );
}

#[tokio::test]
async fn phases_are_reported_in_order() {
    let oracle = Arc::new(
        MockOracle::default()
            .reply("planner", &plan(&["web"]))
            .reply("web", "W")
            .reply("verifier", APPROVED)
            .reply("summarizer", "answer"),
    );
    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink_phases = Arc::clone(&phases);
    let mut c = controller(&oracle, 3, Duration::from_secs(5)).with_events(Arc::new(
        move |event: &OrchestrationEvent| {
            if let OrchestrationEvent::PhaseStarted { phase, .. } = event
                && let Ok(mut phases) = sink_phases.lock()
            {
                phases.push(*phase);
            }
        },
    ));

    c.run("X").await.unwrap_or_else(|_| unreachable!());

    let phases = phases.lock().map(|p| p.clone()).unwrap_or_default();
    assert_eq!(
        phases,
        vec![
            Phase::Planning,
            Phase::Dispatching,
            Phase::Verifying,
            Phase::Summarizing
        ]
    );
}
