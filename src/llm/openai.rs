use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

use super::{ChatMessage, ChatProvider, Completion, LlmError, TokenUsage};
use crate::config;

const OPENAI_API_BASE: &str = "https://api.openai.com/";

/// OpenAI-compatible `v1/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    temperature: f32,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        let base_url =
            Url::parse(OPENAI_API_BASE).map_err(|e| LlmError::Config(e.to_string()))?;
        Self::with_base_url(api_key, base_url, 0.0)
    }

    pub fn with_base_url(api_key: String, base_url: Url, temperature: f32) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("article-forge/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            temperature,
        })
    }

    pub fn from_config(cfg: &config::Llm) -> Result<Self, LlmError> {
        let mut base = cfg.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| LlmError::Config(e.to_string()))?;
        Self::with_base_url(cfg.api_key.clone(), base_url, cfg.temperature)
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request, LlmError> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .map_err(|e| LlmError::Config(e.to_string()))?;
        let request = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()?;
        Ok(request)
    }

    async fn execute(&self, body: Value) -> Result<Completion, LlmError> {
        let request = self.build_request(&body)?;
        debug!(url = %request.url(), model = %body["model"], "sending chat completion");

        let res = self.http.execute(request).await?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by LLM provider: {}", body);
            return Err(LlmError::RateLimited(body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("LLM API error - Status: {}, Body: {}", status, body);
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response_body = res.text().await?;
        parse_completion(&response_body)
    }
}

pub fn build_chat_body(messages: &[ChatMessage], model: &str, temperature: f32) -> Value {
    json!({
        "model": model,
        "temperature": temperature,
        "messages": messages,
    })
}

fn parse_completion(body: &str) -> Result<Completion, LlmError> {
    let payload: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyCompletion)?;
    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage: payload.usage.unwrap_or_default(),
    })
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<Completion, LlmError> {
        let body = build_chat_body(messages, model, self.temperature);
        self.execute(body).await
    }
}
