//! Chat gateway: identity → rate limit → quota → provider → usage record.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::AuthService;
use crate::config::Settings;
use crate::db::{Message, MessageStore, Store};
use crate::error::AppError;
use crate::proxy::provider::{ChatTurn, Completion, CompletionProvider, CompletionRequest, Role};
use crate::usage::{Identity, QuotaEnforcer, RateLimitConfig, RateLimitStatus, RateLimiter};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let last = self
            .messages
            .last()
            .ok_or_else(|| AppError::ValidationError("messages must not be empty".into()))?;
        if last.role != Role::User {
            return Err(AppError::ValidationError(
                "the last message must come from the user".into(),
            ));
        }
        if last.content.trim().is_empty() {
            return Err(AppError::ValidationError("message content must not be empty".into()));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AppError::ValidationError(
                    "temperature must be between 0 and 2".into(),
                ));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(AppError::ValidationError("max_tokens must be positive".into()));
        }
        Ok(())
    }

    fn user_turn(&self) -> &str {
        self.messages
            .last()
            .map(|turn| turn.content.as_str())
            .unwrap_or_default()
    }
}

/// Upstream parameters used when the caller leaves them out.
#[derive(Debug, Clone)]
pub struct ChatDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

#[derive(Debug)]
pub struct ChatOutcome {
    pub completion: Completion,
    pub rate_limit: RateLimitStatus,
    pub identity: Identity,
}

pub struct ChatGateway {
    auth: Arc<AuthService>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
    quota: QuotaEnforcer,
    provider: Arc<dyn CompletionProvider>,
    defaults: ChatDefaults,
}

impl ChatGateway {
    pub fn new(
        settings: &Settings,
        auth: Arc<AuthService>,
        store: Arc<dyn Store>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let llm = &settings.llm;
        Self {
            rate_limiter: RateLimiter::new(store.clone(), RateLimitConfig::from(&settings.rate_limit)),
            quota: QuotaEnforcer::new(store.clone(), &settings.quota),
            auth,
            store,
            provider,
            defaults: ChatDefaults {
                model: llm.default_model.clone(),
                temperature: llm.default_temperature,
                max_tokens: llm.default_max_tokens,
                system_prompt: llm.system_prompt.clone(),
            },
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn quota(&self) -> &QuotaEnforcer {
        &self.quota
    }

    /// Runs one chat turn. Steps stop at the first failure; a quota slot taken
    /// for a request whose upstream call fails is handed back.
    pub async fn handle(
        &self,
        request: ChatRequest,
        session_token: Option<&str>,
        client_address: &str,
    ) -> Result<ChatOutcome, AppError> {
        request.validate()?;

        let user = self.auth.resolve(session_token).await;
        let identity = Identity::from_session(user, client_address);

        let rate_limit = self
            .rate_limiter
            .check_rate_limit(&identity.rate_limit_key())
            .await?;
        if !rate_limit.allowed {
            return Err(AppError::RateLimited(rate_limit));
        }

        let reservation = self.quota.reserve(&identity).await?;

        let upstream = self.upstream_request(&request);
        let completion = match self.provider.complete(&upstream).await {
            Ok(completion) => completion,
            Err(e) => {
                error!(error = %e, identity = %identity.rate_limit_key(), "Completion request failed");
                if let Some(reservation) = reservation {
                    self.quota.release(reservation).await;
                }
                return Err(e.into());
            }
        };

        if let Some(user) = identity.user() {
            let message = Message::new(user.id, request.user_turn().to_string());
            if let Err(e) = self.store.create_message(&message).await {
                error!(error = %e, user_id = %user.id, "Failed to persist chat turn");
                if let Some(reservation) = reservation {
                    self.quota.release(reservation).await;
                }
                return Err(e.into());
            }
        }

        info!(
            identity = %identity.rate_limit_key(),
            tier = %identity.tier(),
            remaining = rate_limit.remaining,
            "Chat turn completed"
        );
        Ok(ChatOutcome {
            completion,
            rate_limit,
            identity,
        })
    }

    fn upstream_request(&self, request: &ChatRequest) -> CompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !self.defaults.system_prompt.is_empty() {
            messages.push(ChatTurn::system(self.defaults.system_prompt.clone()));
        }
        messages.extend(request.messages.iter().cloned());

        CompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.defaults.model.clone()),
            messages,
            temperature: request.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.defaults.max_tokens),
        }
    }
}
