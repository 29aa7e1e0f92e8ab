use actix_web::HttpResponseBuilder;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::config::RateLimitSettings;
use crate::db::Store;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::minutes(1),
            max_requests: 10,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            window_size: Duration::seconds(settings.window_secs),
            max_requests: settings.max_requests,
        }
    }
}

/// Outcome of a rate-limit check, mirrored into `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the oldest counted request leaves the window.
    pub reset: i64,
}

impl RateLimitStatus {
    pub fn apply_headers(&self, builder: &mut HttpResponseBuilder) {
        builder
            .insert_header(("X-RateLimit-Limit", self.limit.to_string()))
            .insert_header(("X-RateLimit-Remaining", self.remaining.to_string()))
            .insert_header(("X-RateLimit-Reset", self.reset.to_string()));
    }
}

/// Sliding-window limiter. The window lives in the store, which admits and
/// records each hit atomically.
pub struct RateLimiter {
    store: Arc<dyn Store>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check_rate_limit(&self, key: &str) -> Result<RateLimitStatus, AppError> {
        self.check_rate_limit_at(key, Utc::now()).await
    }

    pub async fn check_rate_limit_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, AppError> {
        let limit = self.config.max_requests;
        let state = self
            .store
            .record_hit(key, now, self.config.window_size, limit)
            .await?;

        let reset = state.oldest_hit.unwrap_or(now) + self.config.window_size;
        let status = RateLimitStatus {
            allowed: state.admitted,
            limit,
            remaining: limit.saturating_sub(state.count),
            reset: reset.timestamp(),
        };

        if !status.allowed {
            warn!(key, limit, reset = status.reset, "Rate limit exceeded");
        }
        Ok(status)
    }

    /// Drops hits that can no longer affect any window.
    pub async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        Ok(self
            .store
            .purge_hits_before(now - self.config.window_size)
            .await?)
    }
}
