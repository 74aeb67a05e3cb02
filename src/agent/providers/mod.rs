//! Concrete [`LlmProvider`](super::provider::LlmProvider) backends.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{AzureOpenAiProvider, OpenAiProvider};
