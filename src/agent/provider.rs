//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. This keeps all agent logic decoupled
//! from any particular LLM vendor.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::OracleError;

/// Trait for LLM provider backends.
///
/// One provider instance is shared read-only by every agent of a session,
/// including retrieval agents running concurrently, so implementations must
/// be stateless per call. Providers never retry; retry policy belongs to the
/// orchestration controller.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`, `"azure"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// Returns the raw reply text even when a structured reply was
    /// requested; decoding is done by [`super::oracle::complete`].
    ///
    /// # Errors
    ///
    /// Returns [`OracleError`] classified by failure kind.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError>;
}
