//! Usage metering: per-identity rate limiting and the free-tier message quota.

mod quota;
mod rate_limit;

pub use quota::{QuotaEnforcer, QuotaReservation};
pub use rate_limit::{RateLimitConfig, RateLimitStatus, RateLimiter};

use crate::db::{Tier, User};

/// Who a request is metered against.
#[derive(Debug, Clone)]
pub enum Identity {
    User(User),
    /// No valid session; keyed by the forwarded client address.
    Anonymous { address: String },
}

impl Identity {
    pub fn from_session(user: Option<User>, client_address: &str) -> Self {
        match user {
            Some(user) => Identity::User(user),
            None => Identity::Anonymous {
                address: client_address.to_string(),
            },
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::User(user) => Some(user),
            Identity::Anonymous { .. } => None,
        }
    }

    pub fn tier(&self) -> Tier {
        self.user().map(|u| u.subscription_tier).unwrap_or(Tier::Free)
    }

    pub fn rate_limit_key(&self) -> String {
        match self {
            Identity::User(user) => format!("user:{}", user.email),
            Identity::Anonymous { address } => format!("ip:{}", address),
        }
    }

    pub fn quota_key(&self) -> String {
        match self {
            Identity::User(user) => format!("user:{}", user.id),
            Identity::Anonymous { address } => format!("ip:{}", address),
        }
    }
}
