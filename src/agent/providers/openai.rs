//! `OpenAI` and Azure `OpenAI` providers using the `async-openai` crate.
//!
//! [`OpenAiProvider`] talks to any `OpenAI`-compatible endpoint and sends the
//! deployment as the model name. [`AzureOpenAiProvider`] keeps one client
//! per registered deployment, since Azure routes by deployment in the URL.

use std::collections::HashMap;

use async_openai::Client;
use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequest, FunctionObject, ResponseFormat as OpenAiResponseFormat,
};
use async_trait::async_trait;
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{
    ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Role, TokenUsage,
};
use crate::agent::provider::LlmProvider;
use crate::error::{ConfigError, OracleError};

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError> {
        send(&self.client, request).await
    }
}

/// Azure `OpenAI` provider with one client per deployment.
pub struct AzureOpenAiProvider {
    clients: HashMap<String, Client<AzureConfig>>,
}

impl AzureOpenAiProvider {
    /// Creates clients for every deployment the session will address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no endpoint is configured.
    pub fn new<'a>(
        config: &AgentConfig,
        deployments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config
            .base_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid {
                message: "azure provider requires an endpoint (AZURE_OPENAI_ENDPOINT)"
                    .to_string(),
            })?;

        let clients = deployments
            .into_iter()
            .map(|deployment| {
                let azure = AzureConfig::new()
                    .with_api_base(endpoint)
                    .with_api_version(&config.api_version)
                    .with_deployment_id(deployment)
                    .with_api_key(&config.api_key);
                (deployment.to_string(), Client::with_config(azure))
            })
            .collect();

        Ok(Self { clients })
    }
}

impl std::fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut deployments: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        deployments.sort_unstable();
        f.debug_struct("AzureOpenAiProvider")
            .field("deployments", &deployments)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError> {
        let client = self
            .clients
            .get(&request.model)
            .ok_or_else(|| OracleError::Unknown {
                message: format!("deployment {} is not registered", request.model),
                status: None,
            })?;
        send(client, request).await
    }
}

async fn send<C: Config>(
    client: &Client<C>,
    request: &ChatRequest,
) -> Result<ChatResponse, OracleError> {
    let openai_request = build_request(request);

    debug!(
        model = %request.model,
        messages = request.messages.len(),
        "sending chat completion"
    );

    let response = client
        .chat()
        .create(openai_request)
        .await
        .map_err(map_error)?;

    let choice = response.choices.first();

    let content = choice
        .and_then(|c| c.message.content.as_ref())
        .cloned()
        .unwrap_or_default();

    let finish_reason = choice.and_then(|c| {
        c.finish_reason
            .as_ref()
            .map(|fr| format!("{fr:?}").to_lowercase())
    });

    let usage = response
        .usage
        .map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

    Ok(ChatResponse {
        content,
        usage,
        finish_reason,
    })
}

/// Converts our message type to the `OpenAI` SDK type.
fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
    match msg.role {
        Role::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
            name: None,
        }),
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
            name: None,
        }),
        Role::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    msg.content.clone(),
                )),
                name: None,
                tool_calls: None,
                refusal: None,
                audio: None,
                function_call: None,
            })
        }
    }
}

/// Builds an `OpenAI` chat completion request from our generic request.
fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
    let messages: Vec<_> = request.messages.iter().map(convert_message).collect();

    let response_format = match request.response_format {
        ResponseFormat::Structured => Some(OpenAiResponseFormat::JsonObject),
        ResponseFormat::Text => None,
    };

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|td| ChatCompletionTool {
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionObject {
                        name: td.name.clone(),
                        description: Some(td.description.clone()),
                        parameters: Some(td.parameters.clone()),
                        strict: None,
                    },
                })
                .collect(),
        )
    };

    CreateChatCompletionRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        seed: request.seed,
        max_completion_tokens: request.max_tokens,
        response_format,
        tools,
        ..Default::default()
    }
}

/// Maps SDK failures onto the oracle failure kinds.
fn map_error(err: OpenAIError) -> OracleError {
    match err {
        OpenAIError::Reqwest(e) => OracleError::Connection {
            message: e.to_string(),
        },
        OpenAIError::ApiError(api) => {
            let code = api.code.as_ref().map(ToString::to_string);
            classify_api_error(api.message, code.as_deref())
        }
        OpenAIError::JSONDeserialize(e) => OracleError::MalformedOutput {
            message: format!("unreadable service response: {e}"),
            content: String::new(),
        },
        other => OracleError::Unknown {
            message: other.to_string(),
            status: None,
        },
    }
}

fn classify_api_error(message: String, code: Option<&str>) -> OracleError {
    let code_says_length = code.is_some_and(|c| c.contains("context_length_exceeded"));
    let message_says_length = message.contains("maximum context length");

    if code_says_length || message_says_length {
        OracleError::ContextLengthExceeded { message }
    } else {
        OracleError::Unknown {
            message,
            status: None,
        }
    }
}
