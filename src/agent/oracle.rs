//! Uniform request contract for the hosted language model.
//!
//! [`complete`] sends a system prompt plus a role-tagged message sequence
//! through an [`LlmProvider`] and returns either free text or a decoded JSON
//! object. A structured request whose reply does not decode is an
//! [`OracleError::MalformedOutput`], never a silent fallback to raw text.

use serde::Serialize;
use serde_json::Value;

use super::message::{
    ChatMessage, ChatRequest, ResponseFormat, TokenUsage, ToolDefinition, system_message,
};
use super::provider::LlmProvider;
use crate::error::OracleError;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Seed for best-effort deterministic sampling.
    pub seed: Option<i64>,
}

/// One call to the oracle.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Deployment or model identifier.
    pub deployment: &'a str,
    /// System prompt, sent as the first message.
    pub system_prompt: &'a str,
    /// Conversation so far, ending with the new user turn.
    pub messages: &'a [ChatMessage],
    /// Requested reply shape.
    pub format: ResponseFormat,
    /// Sampling parameters.
    pub params: GenerationParams,
    /// Functions the model may call.
    pub tools: &'a [ToolDefinition],
}

/// Result of decoding a reply that was requested as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The reply is a JSON object.
    Structured(Value),
    /// The reply is not a JSON object.
    DecodeFailed {
        /// Raw reply text.
        raw: String,
        /// Decoder diagnostic.
        reason: String,
    },
}

/// Decodes a reply as a JSON object, tolerating a surrounding markdown fence.
#[must_use]
pub fn decode_structured(raw: &str) -> Decoded {
    let trimmed = raw.trim();

    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    match serde_json::from_str::<Value>(json_str) {
        Ok(value @ Value::Object(_)) => Decoded::Structured(value),
        Ok(other) => Decoded::DecodeFailed {
            raw: raw.to_string(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        },
        Err(e) => Decoded::DecodeFailed {
            raw: raw.to_string(),
            reason: e.to_string(),
        },
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decoded payload of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Free-text reply.
    Text(String),
    /// JSON object reply.
    Structured(Value),
}

/// A successful oracle call.
#[derive(Debug, Clone)]
pub struct OracleReply {
    /// Decoded payload.
    pub completion: Completion,
    /// Reply text exactly as returned.
    pub raw: String,
    /// Token usage for the call.
    pub usage: TokenUsage,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
}

/// Sends one request through the provider and decodes the reply.
///
/// # Errors
///
/// Returns the provider's [`OracleError`] unchanged, or
/// [`OracleError::MalformedOutput`] when a structured reply does not decode.
pub async fn complete(
    provider: &dyn LlmProvider,
    request: &OracleRequest<'_>,
) -> Result<OracleReply, OracleError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(system_message(request.system_prompt));
    messages.extend_from_slice(request.messages);

    let chat_request = ChatRequest {
        model: request.deployment.to_string(),
        messages,
        temperature: Some(request.params.temperature),
        max_tokens: Some(request.params.max_tokens),
        top_p: Some(request.params.top_p),
        seed: request.params.seed,
        response_format: request.format,
        tools: request.tools.to_vec(),
    };

    let response = provider.chat(&chat_request).await?;

    let completion = match request.format {
        ResponseFormat::Text => Completion::Text(response.content.clone()),
        ResponseFormat::Structured => match decode_structured(&response.content) {
            Decoded::Structured(value) => Completion::Structured(value),
            Decoded::DecodeFailed { raw, reason } => {
                return Err(OracleError::MalformedOutput {
                    message: reason,
                    content: raw,
                });
            }
        },
    };

    Ok(OracleReply {
        completion,
        raw: response.content,
        usage: response.usage,
        finish_reason: response.finish_reason,
    })
}
