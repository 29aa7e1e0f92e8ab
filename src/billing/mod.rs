//! Billing module
//!
//! Signed payment-provider webhooks that move users between subscription tiers.

pub mod handlers;
pub mod signature;
mod webhook;

pub use webhook::{BillingService, WebhookEvent, WebhookOutcome, CHECKOUT_COMPLETED, SUBSCRIPTION_DELETED};
