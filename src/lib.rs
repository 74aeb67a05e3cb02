//! # agentic-rag
//!
//! Multi-agent research orchestration over hosted language models.
//!
//! A research run plans which retrieval agents a query needs, runs them in
//! parallel under a per-agent timeout, has a verifier approve the gathered
//! material or rewrite the query for another cycle, and finally summarizes
//! the approved material into an answer.
//!
//! ## Example
//!
//! ```no_run
//! use agentic_rag::agent::{AgentConfig, Controller, Session};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentConfig::from_env()?;
//! let mut controller = Controller::new(Session::from_config(&config)?);
//! let report = controller.run("How accurate is the new sensor?").await?;
//! if let Some(answer) = report.outcome.answer() {
//!     println!("{answer}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod error;
pub mod role;

pub use error::{Error, Result};
pub use role::{AgentRole, RetrieverKind};
