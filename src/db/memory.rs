//! In-process store for tests and local development (`database.url = "memory://"`).
//!
//! Each map sits behind its own lock, so every trait call is atomic with
//! respect to other calls on the same store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::db::models::{Message, Session, Tier, User, WindowState};
use crate::db::store::{MessageStore, SessionStore, StoreResult, UsageStore, UserStore};
use crate::error::DatabaseError;

#[derive(Debug, Default)]
struct RequestWindow {
    timestamps: Vec<DateTime<Utc>>,
}

impl RequestWindow {
    fn cleanup_old_requests(&mut self, cutoff: DateTime<Utc>) {
        self.timestamps.retain(|ts| *ts > cutoff);
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, Session>>,
    messages: RwLock<Vec<Message>>,
    windows: Mutex<HashMap<String, RequestWindow>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_user(&self, user_id: Uuid) -> StoreResult<()> {
        if self.users.read().await.contains_key(&user_id) {
            Ok(())
        } else {
            Err(DatabaseError::QueryError(format!("user {} does not exist", user_id)))
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Duplicate);
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_customer_id(&self, customer_id: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        tier: Tier,
        customer_id: Option<&str>,
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(DatabaseError::NotFound)?;
        user.subscription_tier = tier;
        if let Some(customer_id) = customer_id {
            user.stripe_customer_id = Some(customer_id.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> StoreResult<()> {
        self.ensure_user(session.user_id).await?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token_hash) {
            return Err(DatabaseError::Duplicate);
        }
        sessions.insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn get_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().await.get(token_hash).cloned())
    }

    async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, message: &Message) -> StoreResult<()> {
        self.ensure_user(message.user_id).await?;
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn count_messages(&self, user_id: Uuid) -> StoreResult<i64> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| m.user_id == user_id).count() as i64)
    }

    async fn list_messages(&self, user_id: Uuid) -> StoreResult<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| m.user_id == user_id).cloned().collect())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
        limit: u32,
    ) -> StoreResult<WindowState> {
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_default();
        entry.cleanup_old_requests(now - window);

        let admitted = entry.timestamps.len() < limit as usize;
        if admitted {
            entry.timestamps.push(now);
        }

        Ok(WindowState {
            admitted,
            count: entry.timestamps.len() as u32,
            oldest_hit: entry.timestamps.iter().min().copied(),
        })
    }

    async fn purge_hits_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut windows = self.windows.lock().await;
        let mut purged = 0u64;
        windows.retain(|_, window| {
            let before = window.timestamps.len();
            window.cleanup_old_requests(cutoff);
            purged += (before - window.timestamps.len()) as u64;
            !window.timestamps.is_empty()
        });
        Ok(purged)
    }

    async fn try_reserve_quota(&self, key: &str, limit: i64) -> StoreResult<Option<i64>> {
        let mut counters = self.counters.lock().await;
        let count = counters.entry(key.to_string()).or_insert(0);
        if *count >= limit {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn release_quota(&self, key: &str) -> StoreResult<()> {
        if let Some(count) = self.counters.lock().await.get_mut(key) {
            *count = (*count - 1).max(0);
        }
        Ok(())
    }

    async fn quota_count(&self, key: &str) -> StoreResult<i64> {
        Ok(self.counters.lock().await.get(key).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let first = User::new("a@x.com".into(), "hash-1".into());
        store.create_user(&first).await.unwrap();

        let second = store.create_user(&User::new("a@x.com".into(), "hash-2".into())).await;
        assert!(matches!(second, Err(DatabaseError::Duplicate)));

        let stored = store.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.password_hash, "hash-1");
    }

    #[tokio::test]
    async fn sessions_and_messages_require_an_existing_user() {
        let store = MemoryStore::new();
        let session = Session::new(Uuid::new_v4(), "h".into(), Duration::hours(1));
        assert!(store.create_session(&session).await.is_err());

        let message = Message::new(Uuid::new_v4(), "hi".into());
        assert!(store.create_message(&message).await.is_err());
    }

    #[tokio::test]
    async fn window_forgets_hits_older_than_window() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let window = Duration::seconds(60);

        for _ in 0..2 {
            assert!(store.record_hit("k", start, window, 2).await.unwrap().admitted);
        }
        let denied = store.record_hit("k", start, window, 2).await.unwrap();
        assert!(!denied.admitted);
        assert_eq!(denied.count, 2);
        assert_eq!(denied.oldest_hit, Some(start));

        // A hit exactly one window old has left the window.
        let state = store.record_hit("k", start + window, window, 2).await.unwrap();
        assert!(state.admitted);
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_exceed_limit() {
        let store = Arc::new(MemoryStore::new());
        let attempts = (0..50).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_reserve_quota("ip:1.2.3.4", 5).await.unwrap() })
        });

        let granted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Some(_))))
            .count();

        assert_eq!(granted, 5);
        assert_eq!(store.quota_count("ip:1.2.3.4").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn release_never_goes_negative() {
        let store = MemoryStore::new();
        store.release_quota("nobody").await.unwrap();
        assert_eq!(store.quota_count("nobody").await.unwrap(), 0);

        store.try_reserve_quota("k", 1).await.unwrap();
        store.release_quota("k").await.unwrap();
        store.release_quota("k").await.unwrap();
        assert_eq!(store.quota_count("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_drops_stale_windows() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::minutes(5);
        store.record_hit("stale", old, Duration::seconds(60), 10).await.unwrap();
        store.record_hit("fresh", Utc::now(), Duration::seconds(60), 10).await.unwrap();

        let purged = store.purge_hits_before(Utc::now() - Duration::seconds(60)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.windows.lock().await.get("stale").is_none());
    }
}
