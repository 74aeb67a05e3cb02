//! Error types for agentic-rag.
//!
//! Each layer has its own `thiserror` enum: the oracle boundary, individual
//! agents, configuration loading, the orchestration controller and the CLI.
//! Terminal aborts of a research run (no agents selected, denied without a
//! rewrite, retry budget exhausted) are outcomes, not errors, and live in
//! [`crate::agent::controller::AbortReason`].

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::role::AgentRole;

/// Result type alias for CLI-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A research run failed.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// A CLI command failed.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of oracle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleErrorKind {
    /// The service could not be reached.
    ConnectionFailure,
    /// The prompt exceeded the deployment's context window.
    ContextLengthExceeded,
    /// The reply could not be decoded in the requested format.
    MalformedOutput,
    /// Any other service-side failure.
    Unknown,
}

/// Failure reported by the hosted language-model service.
#[derive(Error, Debug, Clone)]
pub enum OracleError {
    /// Transport-level failure.
    #[error("connection to the language model failed: {message}")]
    Connection {
        /// Underlying transport message.
        message: String,
    },

    /// The request was rejected for exceeding the context window.
    #[error("context length exceeded: {message}")]
    ContextLengthExceeded {
        /// Service message.
        message: String,
    },

    /// A structured reply was requested but the text is not a JSON object.
    #[error("malformed model output: {message}")]
    MalformedOutput {
        /// Decoder diagnostic.
        message: String,
        /// Raw text returned by the model.
        content: String,
    },

    /// Any other failure.
    #[error("language model request failed: {message}")]
    Unknown {
        /// Service message.
        message: String,
        /// HTTP status when known.
        status: Option<u16>,
    },
}

impl OracleError {
    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> OracleErrorKind {
        match self {
            Self::Connection { .. } => OracleErrorKind::ConnectionFailure,
            Self::ContextLengthExceeded { .. } => OracleErrorKind::ContextLengthExceeded,
            Self::MalformedOutput { .. } => OracleErrorKind::MalformedOutput,
            Self::Unknown { .. } => OracleErrorKind::Unknown,
        }
    }
}

/// Failure of a single agent invocation.
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// The oracle call behind this agent failed.
    #[error("{role} failed: {source}")]
    Oracle {
        /// Agent that issued the call.
        role: AgentRole,
        /// Oracle failure.
        #[source]
        source: OracleError,
    },

    /// The reply decoded but does not match the role's reply schema.
    #[error("{role} returned an unusable reply: {message}")]
    Contract {
        /// Agent that produced the reply.
        role: AgentRole,
        /// What was wrong with it.
        message: String,
        /// Raw reply text.
        raw: String,
    },
}

impl AgentError {
    /// Agent the failure is attributed to.
    #[must_use]
    pub const fn role(&self) -> AgentRole {
        match self {
            Self::Oracle { role, .. } | Self::Contract { role, .. } => *role,
        }
    }

    /// Oracle failure kind, when the failure came from the oracle.
    #[must_use]
    pub const fn oracle_kind(&self) -> Option<OracleErrorKind> {
        match self {
            Self::Oracle { source, .. } => Some(source.kind()),
            Self::Contract { .. } => None,
        }
    }
}

/// Configuration errors, raised at session start.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No API key was found in flags or environment.
    #[error(
        "API key not configured (set OPENAI_API_KEY, AZURE_OPENAI_API_KEY or AGENTIC_RAG_API_KEY)"
    )]
    ApiKeyMissing,

    /// The provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// The registry names an agent outside the closed role set.
    #[error("unknown agent: {name}")]
    UnknownAgent {
        /// Offending name.
        name: String,
    },

    /// Two registry entries resolve to the same role.
    #[error("agent {role} is configured more than once")]
    DuplicateAgent {
        /// Role configured twice.
        role: AgentRole,
    },

    /// The registry file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The registry file is not valid TOML for the expected shape.
    #[error("failed to parse {}: {message}", path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A value is out of range.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Failure that aborts a research run.
#[derive(Error, Debug, Clone)]
pub enum OrchestrationError {
    /// The query was rejected before planning.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Why it was rejected.
        message: String,
    },

    /// The planner could not produce a plan.
    #[error("planning failed: {0}")]
    Planning(#[source] AgentError),

    /// The verifier call failed.
    #[error("verification failed: {0}")]
    Verification(#[source] AgentError),

    /// The verifier replied with something that is not a verdict.
    #[error("verifier reply is not a valid verdict: {message}")]
    VerificationContract {
        /// What was wrong with the reply.
        message: String,
        /// Raw reply text.
        raw: String,
    },

    /// The summarizer call failed.
    #[error("summarization failed: {0}")]
    Summarization(#[source] AgentError),
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Output serialization failed.
    #[error("output format error: {0}")]
    OutputFormat(String),
}
