use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::usage::RateLimitStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Billing error: {0}")]
    BillingError(#[from] BillingError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Free message limit exceeded")]
    QuotaExceeded,

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitStatus),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("blocking task failed: {}", err))
    }
}

impl AppError {
    /// Message exposed to the client. Server-side failures never leak their cause.
    fn public_message(&self) -> String {
        match self {
            AppError::AuthError(e) => e.to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::BillingError(e) if !matches!(e, BillingError::Store(_)) => e.to_string(),
            AppError::QuotaExceeded | AppError::RateLimited(_) => self.to_string(),
            AppError::ProxyError(_) => "Failed to process request".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let message = self.public_message();
        match self {
            AppError::RateLimited(limits) => {
                let mut builder = HttpResponse::build(status);
                limits.apply_headers(&mut builder);
                builder.json(json!({
                    "error": message,
                    "limit": limits.limit,
                    "remaining": limits.remaining,
                    "reset": limits.reset,
                }))
            }
            _ => HttpResponse::build(status).json(json!({ "error": message })),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::BillingError(BillingError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BillingError(_) => StatusCode::BAD_REQUEST,
            AppError::ProxyError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid session")]
    InvalidSession,
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("API response error: {0}")]
    ResponseError(String),
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                DatabaseError::Duplicate
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionError(err.to_string())
            }
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Missing signature")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}
