use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::ProxyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
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
}

/// Body sent to an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    /// Text of the first choice.
    pub content: String,
    /// Provider response, passed through untouched.
    pub body: serde_json::Value,
}

impl Completion {
    /// Accepts a provider body only if it carries `choices[0].message.content`.
    pub fn from_body(body: serde_json::Value) -> Result<Self, ProxyError> {
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProxyError::ResponseError("missing choices[0].message.content".into()))?
            .to_string();

        Ok(Self { content, body })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProxyError>;
}

/// Together AI, or any other OpenAI-compatible chat completions API.
pub struct TogetherProvider {
    client: Client,
    api_base: String,
    api_key: String,
    max_retries: u32,
}

impl TogetherProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProxyError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, ProxyError> {
        let url = format!("{}/chat/completions", self.api_base);
        let mut attempt = 0;
        loop {
            match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(response) => return Ok(response),
                // Only retried when the request never reached the provider.
                Err(e) if e.is_connect() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Connection to completion API failed, retrying");
                }
                Err(e) => return Err(ProxyError::RequestFailed(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for TogetherProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProxyError> {
        debug!(model = %request.model, turns = request.messages.len(), "Requesting completion");
        let response = self.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProxyError::ResponseError(e.to_string()))?;

        Completion::from_body(body)
    }
}
