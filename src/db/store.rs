//! Storage interface shared by the Postgres and in-memory backends.
//!
//! Counters (rate-limit windows and quota) are only ever changed through the
//! atomic operations below; callers never read a value, modify it and write
//! it back.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::models::{Message, Session, Tier, User, WindowState};
use crate::error::DatabaseError;

pub type StoreResult<T> = std::result::Result<T, DatabaseError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`DatabaseError::Duplicate`] when the email is taken.
    async fn create_user(&self, user: &User) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn get_user_by_customer_id(&self, customer_id: &str) -> StoreResult<Option<User>>;

    /// Sets the tier; a `Some` customer id replaces the stored one, `None` keeps it.
    async fn update_subscription(
        &self,
        user_id: Uuid,
        tier: Tier,
        customer_id: Option<&str>,
    ) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> StoreResult<()>;

    async fn get_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: &Message) -> StoreResult<()>;

    async fn count_messages(&self, user_id: Uuid) -> StoreResult<i64>;

    async fn list_messages(&self, user_id: Uuid) -> StoreResult<Vec<Message>>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Offers one hit to the trailing window `(now - window, now]` of `key`.
    /// The hit is recorded only if fewer than `limit` hits are already inside.
    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
        limit: u32,
    ) -> StoreResult<WindowState>;

    /// Drops hits at or before `cutoff` for every key.
    async fn purge_hits_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Increments the counter for `key` only while it is below `limit`.
    /// Returns the new count, or `None` when the limit was already reached.
    async fn try_reserve_quota(&self, key: &str, limit: i64) -> StoreResult<Option<i64>>;

    /// Undoes one successful reservation. Never drops below zero.
    async fn release_quota(&self, key: &str) -> StoreResult<()>;

    async fn quota_count(&self, key: &str) -> StoreResult<i64>;
}

/// Everything the services need from a backend.
pub trait Store: UserStore + SessionStore + MessageStore + UsageStore {}

impl<T> Store for T where T: UserStore + SessionStore + MessageStore + UsageStore {}
