//! Chat-completion adapter: role-tagged prompts in, text and token usage out.
//!
//! [`ChatProvider`] is the network seam (one request per call). [`LlmClient`]
//! wraps a provider with the default model and a bounded immediate-retry policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub mod openai;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid LLM client configuration: {0}")]
    Config(String),
    #[error("failed to reach LLM provider: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited by LLM provider: {0}")]
    RateLimited(String),
    #[error("LLM provider error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
    #[error("LLM returned no completion choices")]
    EmptyCompletion,
}

/// One outbound chat completion call.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], model: &str)
        -> Result<Completion, LlmError>;
}

/// Provider plus default model and retry budget.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn ChatProvider>,
    default_model: String,
    retries_limit: u32,
}

impl LlmClient {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        default_model: impl Into<String>,
        retries_limit: u32,
    ) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            retries_limit,
        }
    }

    /// Send `messages` once, then retry immediately up to `retries_limit` times.
    /// At most `retries_limit + 1` provider calls are made; the last error is returned.
    pub async fn ask(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<Completion, LlmError> {
        let model = model.unwrap_or(&self.default_model);
        let mut attempt = 0u32;
        loop {
            match self.provider.complete(messages, model).await {
                Ok(completion) => {
                    debug!(
                        model,
                        attempt,
                        prompt_tokens = completion.usage.prompt_tokens,
                        completion_tokens = completion.usage.completion_tokens,
                        "llm call succeeded"
                    );
                    return Ok(completion);
                }
                Err(err) if attempt < self.retries_limit => {
                    attempt += 1;
                    warn!(%err, model, attempt, "llm call failed; retrying");
                }
                Err(err) => {
                    warn!(%err, model, attempt, "llm call failed; retry budget exhausted");
                    return Err(err);
                }
            }
        }
    }
}
