use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::normalize_email;
use crate::billing::signature::verify_signature;
use crate::config::BillingConfig;
use crate::db::{Store, Tier, UserStore};
use crate::error::BillingError;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    customer: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    customer: String,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    TierChanged { email: String, tier: Tier },
    UnknownCustomer,
    Ignored,
}

pub struct BillingService {
    store: Arc<dyn Store>,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(store: Arc<dyn Store>, config: BillingConfig) -> Self {
        Self { store, config }
    }

    /// Verifies the signature, then applies the event. Nothing is written
    /// unless the signature checks out.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, BillingError> {
        let signature = signature.ok_or(BillingError::MissingSignature)?;
        verify_signature(
            signature,
            payload,
            &self.config.webhook_secret,
            self.config.signature_tolerance_secs,
            Utc::now().timestamp(),
        )?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
        info!(event_id = ?event.id, event_type = %event.event_type, "Webhook event received");

        self.apply(event).await
    }

    async fn apply(&self, event: WebhookEvent) -> Result<WebhookOutcome, BillingError> {
        match event.event_type.as_str() {
            CHECKOUT_COMPLETED => self.checkout_completed(event.data.object).await,
            SUBSCRIPTION_DELETED => self.subscription_deleted(event.data.object).await,
            other => {
                info!(event_type = other, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn checkout_completed(
        &self,
        object: serde_json::Value,
    ) -> Result<WebhookOutcome, BillingError> {
        let session: CheckoutSession = serde_json::from_value(object)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        let email = session
            .metadata
            .get("email")
            .map(|e| normalize_email(e))
            .ok_or_else(|| BillingError::MalformedEvent("metadata.email missing".into()))?;
        let plan = session
            .metadata
            .get("planId")
            .ok_or_else(|| BillingError::MalformedEvent("metadata.planId missing".into()))?;
        // Checkout only ever upgrades; going back to free is a cancellation.
        let tier = plan
            .parse::<Tier>()
            .ok()
            .filter(Tier::is_paid)
            .ok_or_else(|| BillingError::UnknownPlan(plan.clone()))?;

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            warn!("Checkout completed for an unknown user");
            return Ok(WebhookOutcome::UnknownCustomer);
        };

        self.store
            .update_subscription(user.id, tier, session.customer.as_deref())
            .await?;
        info!(user_id = %user.id, %tier, "Subscription activated");

        Ok(WebhookOutcome::TierChanged { email, tier })
    }

    async fn subscription_deleted(
        &self,
        object: serde_json::Value,
    ) -> Result<WebhookOutcome, BillingError> {
        let subscription: Subscription = serde_json::from_value(object)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        let Some(user) = self
            .store
            .get_user_by_customer_id(&subscription.customer)
            .await?
        else {
            warn!(customer = %subscription.customer, "Subscription deleted for an unknown customer");
            return Ok(WebhookOutcome::UnknownCustomer);
        };

        self.store
            .update_subscription(user.id, Tier::Free, None)
            .await?;
        info!(user_id = %user.id, "Subscription cancelled, back to free tier");

        Ok(WebhookOutcome::TierChanged {
            email: user.email,
            tier: Tier::Free,
        })
    }
}
