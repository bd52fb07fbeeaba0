use crate::domain::{Account, CreditPackage, PremiumPlan, Purchase};
use crate::infrastructure::payments::{
    verify_webhook_signature, CheckoutMetadata, PaymentsClient, PaymentsError,
};
use crate::infrastructure::repository::{
    AccountRepository, PurchaseRepository, RepositoryError,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MonetizationError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Payments error: {0}")]
    Payments(#[from] PaymentsError),
    #[error("Webhook signature verification failed")]
    InvalidSignature,
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("Unknown package: {0}")]
    UnknownPackage(String),
    #[error("No provider variant configured for {0}")]
    VariantNotConfigured(String),
}

/// What the user is checking out: a one-time credit package or a recurring
/// premium plan. Both go through the same hosted checkout.
#[derive(Debug, Clone)]
pub enum CheckoutSelection {
    Package(String),
    Plan(PremiumPlan),
}

/// Provider variant ids per sellable item, from configuration. A missing
/// variant fails the checkout instead of falling through to a default.
#[derive(Debug, Clone, Default)]
pub struct VariantMap {
    pub trial: Option<String>,
    pub starter: Option<String>,
    pub family: Option<String>,
    pub premium_monthly: Option<String>,
    pub premium_yearly: Option<String>,
}

impl VariantMap {
    fn for_item(&self, item_id: &str) -> Option<&str> {
        match item_id {
            "trial" => self.trial.as_deref(),
            "starter" => self.starter.as_deref(),
            "family" => self.family.as_deref(),
            "premium_monthly" => self.premium_monthly.as_deref(),
            "premium_yearly" => self.premium_yearly.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event verified, new, and its side effects were applied.
    Applied,
    /// Event verified but not one this service reconciles.
    Ignored,
    /// Event id already registered; no side effects ran.
    Replay,
}

/// Checkout creation and webhook reconciliation. Credits are only ever added
/// from verified webhook events; nothing in the checkout path touches a
/// balance.
pub struct MonetizationService<A: AccountRepository, P: PurchaseRepository> {
    accounts: Arc<A>,
    purchases: Arc<P>,
    payments: PaymentsClient,
    webhook_secret: String,
    variants: VariantMap,
    app_base_url: String,
}

impl<A: AccountRepository, P: PurchaseRepository> MonetizationService<A, P> {
    pub fn new(
        accounts: Arc<A>,
        purchases: Arc<P>,
        payments: PaymentsClient,
        webhook_secret: String,
        variants: VariantMap,
        app_base_url: String,
    ) -> Self {
        Self {
            accounts,
            purchases,
            payments,
            webhook_secret,
            variants,
            app_base_url,
        }
    }

    /// Requests a hosted checkout URL for the account. Metadata carries the
    /// account id and credit amount so the webhook can settle without
    /// trusting anything client-side.
    pub async fn create_checkout(
        &self,
        account: &Account,
        selection: CheckoutSelection,
    ) -> Result<String, MonetizationError> {
        let (item_id, credits) = match &selection {
            CheckoutSelection::Package(package_id) => {
                let package = CreditPackage::find(package_id)
                    .ok_or_else(|| MonetizationError::UnknownPackage(package_id.clone()))?;
                (package.id, package.credits)
            }
            CheckoutSelection::Plan(plan) => (plan.id(), 0),
        };

        let variant = self
            .variants
            .for_item(item_id)
            .ok_or_else(|| MonetizationError::VariantNotConfigured(item_id.to_string()))?;

        let metadata = CheckoutMetadata {
            user_id: account.id.to_string(),
            package_id: item_id.to_string(),
            credits,
        };
        let redirect_url = format!("{}/create?purchase=success", self.app_base_url);

        let url = self
            .payments
            .create_checkout(variant, &account.email, metadata, &redirect_url)
            .await?;

        info!(account_id = %account.id, item = item_id, "Checkout created");
        Ok(url)
    }

    /// Verifies and applies a provider webhook. Signature check runs against
    /// the raw body before any parsing; the event id gate makes redelivery
    /// harmless.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, MonetizationError> {
        if !verify_webhook_signature(&self.webhook_secret, raw_body, signature) {
            return Err(MonetizationError::InvalidSignature);
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| MonetizationError::InvalidPayload(e.to_string()))?;

        let event_name = payload
            .pointer("/meta/event_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MonetizationError::InvalidPayload("Missing event_name".to_string()))?
            .to_string();
        let data_id = payload
            .pointer("/data/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MonetizationError::InvalidPayload("Missing data.id".to_string()))?
            .to_string();

        // Provider ids are only unique per object type, so the event name is
        // part of the dedup key.
        let event_id = format!("{}:{}", event_name, data_id);
        if !self.purchases.register_webhook_event(&event_id).await? {
            info!(event_id, "Skipping replayed webhook event");
            return Ok(WebhookOutcome::Replay);
        }

        match event_name.as_str() {
            "order_created" => self.apply_order(&payload, &data_id).await,
            "subscription_created"
            | "subscription_updated"
            | "subscription_resumed"
            | "subscription_unpaused" => self.apply_subscription(&payload, &data_id, true).await,
            "subscription_cancelled" | "subscription_expired" | "subscription_paused" => {
                self.apply_subscription(&payload, &data_id, false).await
            }
            other => {
                info!(event = other, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn apply_order(
        &self,
        payload: &serde_json::Value,
        order_id: &str,
    ) -> Result<WebhookOutcome, MonetizationError> {
        let account_id = custom_data_account_id(payload)?;
        let package_id = payload
            .pointer("/meta/custom_data/package_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let credits: i32 = payload
            .pointer("/meta/custom_data/credits")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| MonetizationError::InvalidPayload("Missing credits".to_string()))?;
        let amount_cents = payload
            .pointer("/data/attributes/total")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        if credits <= 0 {
            warn!(order_id, credits, "Order carries no credits; nothing to add");
            return Ok(WebhookOutcome::Ignored);
        }

        let new_balance = self.accounts.add_credits(account_id, credits).await?;
        let purchase = Purchase::new(
            account_id,
            order_id.to_string(),
            package_id,
            credits,
            amount_cents,
        );
        self.purchases.record_purchase(&purchase).await?;

        info!(
            %account_id,
            order_id,
            credits,
            new_balance,
            "Order settled"
        );
        Ok(WebhookOutcome::Applied)
    }

    async fn apply_subscription(
        &self,
        payload: &serde_json::Value,
        subscription_id: &str,
        is_premium: bool,
    ) -> Result<WebhookOutcome, MonetizationError> {
        let account_id = custom_data_account_id(payload)?;
        let status = payload
            .pointer("/data/attributes/status")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let ends_at = payload
            .pointer("/data/attributes/ends_at")
            .or_else(|| payload.pointer("/data/attributes/renews_at"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        self.accounts
            .set_subscription(
                account_id,
                is_premium,
                Some(subscription_id.to_string()),
                status,
                ends_at,
            )
            .await?;

        info!(%account_id, subscription_id, is_premium, "Subscription updated");
        Ok(WebhookOutcome::Applied)
    }
}

fn custom_data_account_id(payload: &serde_json::Value) -> Result<Uuid, MonetizationError> {
    payload
        .pointer("/meta/custom_data/user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| MonetizationError::InvalidPayload("Missing or invalid user_id".to_string()))
}
