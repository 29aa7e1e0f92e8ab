use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::{QuotaConfig, ResetPeriod};
use crate::db::Store;
use crate::error::AppError;
use crate::usage::Identity;

/// A slot taken from an identity's quota. Released if the request fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaReservation {
    pub key: String,
    pub count: i64,
}

/// Caps the number of chat turns for anonymous and free-tier callers.
pub struct QuotaEnforcer {
    store: Arc<dyn Store>,
    limit: i64,
    reset_period: ResetPeriod,
}

impl QuotaEnforcer {
    pub fn new(store: Arc<dyn Store>, config: &QuotaConfig) -> Self {
        Self {
            store,
            limit: config.free_message_limit,
            reset_period: config.reset_period,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn applies_to(&self, identity: &Identity) -> bool {
        !identity.tier().is_paid()
    }

    /// Takes one slot for `identity`. Paid tiers get `Ok(None)`; a spent quota
    /// fails with [`AppError::QuotaExceeded`] and leaves the counter untouched.
    pub async fn reserve(&self, identity: &Identity) -> Result<Option<QuotaReservation>, AppError> {
        self.reserve_at(identity, Utc::now()).await
    }

    pub async fn reserve_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaReservation>, AppError> {
        if !self.applies_to(identity) {
            return Ok(None);
        }

        let key = self.counter_key(identity, now);
        match self.store.try_reserve_quota(&key, self.limit).await? {
            Some(count) => {
                debug!(key = %key, count, limit = self.limit, "Quota slot reserved");
                Ok(Some(QuotaReservation { key, count }))
            }
            None => {
                info!(key = %key, limit = self.limit, "Free message limit reached");
                Err(AppError::QuotaExceeded)
            }
        }
    }

    /// Gives a slot back. Failures are logged, not returned.
    pub async fn release(&self, reservation: QuotaReservation) {
        if let Err(e) = self.store.release_quota(&reservation.key).await {
            error!(key = %reservation.key, error = %e, "Failed to release quota slot");
        }
    }

    pub async fn used(&self, identity: &Identity) -> Result<i64, AppError> {
        let key = self.counter_key(identity, Utc::now());
        Ok(self.store.quota_count(&key).await?)
    }

    fn counter_key(&self, identity: &Identity, now: DateTime<Utc>) -> String {
        let base = identity.quota_key();
        match self.reset_period {
            ResetPeriod::Never => base,
            ResetPeriod::Daily => format!("{}:{}", base, now.format("%Y-%m-%d")),
            ResetPeriod::Monthly => format!("{}:{}", base, now.format("%Y-%m")),
        }
    }
}
