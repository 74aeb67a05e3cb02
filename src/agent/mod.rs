//! Multi-agent research orchestration.
//!
//! A planner picks retrieval agents for the query, the dispatcher runs them
//! concurrently under a per-agent timeout, a verifier approves the results
//! or asks for a rewritten query, and a summarizer writes the answer. All
//! agents reach the hosted language model through one [`LlmProvider`].
//!
//! # Architecture
//!
//! ```text
//! User query → Controller (owns Session)
//!   ├── PlannerAgent (selects retrievers → PlanDecision)
//!   ├── RetrievalDispatcher
//!   │   └── one task per planned RetrieverAgent, each under the timeout
//!   │       → RetrievalBundle (result or absence per retriever)
//!   ├── VerifierAgent → Verdict
//!   │   ├── Approved → SummarizerAgent → final answer
//!   │   ├── Denied + rewrite, budget left → next cycle with rewritten query
//!   │   └── otherwise → Aborted
//!   └── RunReport (outcome, cycles, token usage)
//! ```
//!
//! # Feature Gate
//!
//! The hosted backends (`OpenAI` and Azure `OpenAI`) require the `openai`
//! feature, enabled by default.

pub mod bundle;
pub mod client;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod events;
pub mod message;
pub mod oracle;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retriever;
pub mod session;
pub mod summarizer;
pub mod traits;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types
pub use bundle::{Absence, RetrievalBundle, RetrievalEntry, Retrieved};
pub use config::AgentConfig;
pub use controller::{AbortReason, Controller, CycleReport, RunOutcome, RunReport};
pub use dispatcher::RetrievalDispatcher;
pub use events::{AgentStatus, EventSink, NoEvents, OrchestrationEvent, Phase, TracingEvents};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use oracle::{Completion, Decoded, GenerationParams};
pub use planner::{PlanDecision, PlannerAgent};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use registry::{AgentRegistry, AgentSpec};
pub use retriever::RetrieverAgent;
pub use session::{ChatTurn, Session, Speaker};
pub use summarizer::SummarizerAgent;
pub use traits::{Agent, AgentRun};
pub use verifier::{Verdict, VerdictStatus, VerifierAgent};
