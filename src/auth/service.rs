use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::auth::{password, token};
use crate::config::AuthConfig;
use crate::db::{Session, Store, User};
use crate::error::{AppError, AuthError, DatabaseError};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Raw session token; only its hash is stored.
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    session_ttl: Duration,
    // Verified against when the email is unknown so both login failures cost the same.
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, config: &AuthConfig) -> Self {
        Self {
            store,
            session_ttl: Duration::hours(config.session_ttl_hours),
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Creates a free-tier user. Does not log the user in.
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        validate_credentials(&email, password)?;

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("User already exists".into()));
        }

        let plaintext = password.to_string();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&plaintext)).await??;

        // The unique constraint still catches a concurrent registration.
        let user = match self.store.create_user(&User::new(email, password_hash)).await {
            Ok(user) => user,
            Err(DatabaseError::Duplicate) => {
                return Err(AppError::Conflict("User already exists".into()))
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let email = normalize_email(email);
        validate_credentials(&email, password)?;

        let user = self.store.get_user_by_email(&email).await?;
        let stored_hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash().await?.to_string(),
        };

        let plaintext = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            password::verify_password(&plaintext, &stored_hash)
        })
        .await??;

        let user = match user {
            Some(user) if matches => user,
            _ => return Err(AuthError::InvalidCredentials.into()),
        };

        let raw_token = token::generate_token();
        let session = Session::new(user.id, token::hash_token(&raw_token), self.session_ttl);
        self.store.create_session(&session).await?;

        info!(user_id = %user.id, expires_at = %session.expires_at, "Session issued");
        Ok(LoginOutcome {
            token: raw_token,
            user,
            expires_at: session.expires_at,
        })
    }

    /// Resolves a session token to its user. Anything short of a live session
    /// yields `None`, including storage failures.
    pub async fn resolve(&self, token: Option<&str>) -> Option<User> {
        self.resolve_at(token, Utc::now()).await
    }

    pub async fn resolve_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Option<User> {
        let token = token.map(str::trim).filter(|t| !t.is_empty())?;

        match self.lookup(token, now).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Session lookup failed; treating caller as anonymous");
                None
            }
        }
    }

    async fn lookup(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>, AppError> {
        let Some(session) = self
            .store
            .get_session_by_token_hash(&token::hash_token(token))
            .await?
        else {
            debug!("Unknown session token");
            return Ok(None);
        };

        if session.is_expired_at(now) {
            debug!(session_id = %session.id, "Session expired");
            return Ok(None);
        }

        Ok(self.store.get_user_by_id(session.user_id).await?)
    }

    async fn dummy_hash(&self) -> Result<&String, AppError> {
        self.dummy_hash
            .get_or_try_init(|| async {
                let random = token::generate_token();
                tokio::task::spawn_blocking(move || password::hash_password(&random)).await?
            })
            .await
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if email.is_empty() || password.is_empty() {
        return Err(AppError::ValidationError(
            "Email and password are required".into(),
        ));
    }
    if !email.contains('@') {
        return Err(AppError::ValidationError("Invalid email address".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{MemoryStore, Tier};

    fn service() -> AuthService {
        let settings = Settings::new_for_test().unwrap();
        AuthService::new(Arc::new(MemoryStore::new()), &settings.auth)
    }

    #[tokio::test]
    async fn register_then_login_resolves_free_user() {
        let auth = service();
        auth.register("A@X.com ", "pw").await.unwrap();

        let outcome = auth.login("a@x.com", "pw").await.unwrap();
        assert_eq!(outcome.user.email, "a@x.com");

        let user = auth.resolve(Some(&outcome.token)).await.unwrap();
        assert_eq!(user.id, outcome.user.id);
        assert_eq!(user.subscription_tier, Tier::Free);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let auth = service();
        let first = auth.register("a@x.com", "pw").await.unwrap();

        let err = auth.register("a@x.com", "other").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Original password still works.
        let outcome = auth.login("a@x.com", "pw").await.unwrap();
        assert_eq!(outcome.user.id, first.id);
    }

    #[tokio::test]
    async fn login_failures_look_identical() {
        let auth = service();
        auth.register("a@x.com", "pw").await.unwrap();

        let wrong_password = auth.login("a@x.com", "nope").await.unwrap_err();
        let unknown_email = auth.login("b@x.com", "pw").await.unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert!(matches!(wrong_password, AppError::AuthError(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let auth = service();
        assert!(matches!(
            auth.register("", "pw").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            auth.register("a@x.com", "").await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            auth.register("not-an-email", "pw").await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn session_expires_after_ttl() {
        let auth = service();
        auth.register("a@x.com", "pw").await.unwrap();
        let outcome = auth.login("a@x.com", "pw").await.unwrap();
        let issued = outcome.expires_at - auth.session_ttl();

        let just_before = issued + Duration::hours(24) - Duration::seconds(1);
        let just_after = issued + Duration::hours(24) + Duration::seconds(1);

        assert!(auth.resolve_at(Some(&outcome.token), just_before).await.is_some());
        assert!(auth.resolve_at(Some(&outcome.token), just_after).await.is_none());
    }

    #[tokio::test]
    async fn unknown_or_empty_tokens_resolve_to_none() {
        let auth = service();
        assert!(auth.resolve(None).await.is_none());
        assert!(auth.resolve(Some("")).await.is_none());
        assert!(auth.resolve(Some("not-a-session")).await.is_none());
    }

    #[tokio::test]
    async fn each_login_issues_a_distinct_session() {
        let auth = service();
        auth.register("a@x.com", "pw").await.unwrap();
        let first = auth.login("a@x.com", "pw").await.unwrap();
        let second = auth.login("a@x.com", "pw").await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(auth.resolve(Some(&first.token)).await.is_some());
        assert!(auth.resolve(Some(&second.token)).await.is_some());
    }
}
