//! Payment gateway webhook processing.
//!
//! Both providers follow the same contract: verify the signature (reject on
//! mismatch, touching nothing), check idempotency against the payment row's
//! provider transaction id, persist the raw payload for audit, then settle
//! through the payment service. Webhooks are delivered at least once and out
//! of order; the idempotency check is what makes redelivery safe.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{
        order::{self, Entity as OrderEntity},
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    services::payments::PaymentService,
};

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

type HmacSha256 = Hmac<Sha256>;

/// Generic QR-payment provider notification, HMAC-signed over the raw body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPayNotification {
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    /// "success" or "failed".
    pub status: String,
    /// The payment id this notification settles.
    pub reference_id: String,
    pub timestamp: String,
}

/// Card gateway callback; authenticity via the embedded `hash_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardGatewayNotification {
    pub merchant_id: String,
    /// Order number the charge belongs to.
    pub order_id: String,
    pub payment_status: String,
    pub transaction_ref: String,
    /// Amount in minor units, as the gateway formats it.
    pub amount: String,
    pub currency: String,
    pub hash_value: String,
    pub card_number: Option<String>,
    pub card_brand: Option<String>,
}

impl CardGatewayNotification {
    /// Fixed field concatenation the gateway signs.
    pub fn hash_base(&self) -> String {
        format!(
            "{}{}{}{}{}{}",
            self.merchant_id,
            self.order_id,
            self.payment_status,
            self.transaction_ref,
            self.amount,
            self.currency
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self.payment_status.as_str(), "000" | "success")
    }
}

pub fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Outcome reported back to the HTTP handler. `Duplicate` means the event was
/// already fully processed and nothing was reapplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
}

#[derive(Clone)]
pub struct WebhookService {
    db: Arc<DatabaseConnection>,
    payments: Arc<PaymentService>,
    config: AppConfig,
}

impl WebhookService {
    pub fn new(db: Arc<DatabaseConnection>, payments: Arc<PaymentService>, config: AppConfig) -> Self {
        Self { db, payments, config }
    }

    /// Verifies the PromptPay HMAC over the raw body. Failure is a security
    /// event: logged, rejected, nothing touched.
    pub fn verify_promptpay_signature(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        let Some(secret) = self.config.promptpay_webhook_secret.as_deref() else {
            warn!("PromptPay webhook secret not configured; skipping signature verification");
            return Ok(());
        };
        let Some(signature) = signature else {
            warn!("PromptPay webhook rejected: missing signature header");
            return Err(ServiceError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        };
        let expected = hmac_hex(secret, body);
        if !constant_time_eq(&expected, signature) {
            warn!("PromptPay webhook rejected: signature mismatch");
            return Err(ServiceError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
        Ok(())
    }

    /// Verifies the card gateway's embedded hash and merchant id.
    pub fn verify_card_hash(
        &self,
        notification: &CardGatewayNotification,
    ) -> Result<(), ServiceError> {
        if let Some(merchant_id) = self.config.card_merchant_id.as_deref() {
            if merchant_id != notification.merchant_id {
                warn!("Card webhook rejected: unknown merchant id");
                return Err(ServiceError::Unauthorized(
                    "Invalid webhook signature".to_string(),
                ));
            }
        }
        let Some(secret) = self.config.card_gateway_secret.as_deref() else {
            warn!("Card gateway secret not configured; skipping hash verification");
            return Ok(());
        };
        let expected = hmac_hex(secret, notification.hash_base().as_bytes());
        if !constant_time_eq(&expected, &notification.hash_value) {
            warn!("Card webhook rejected: hash mismatch");
            return Err(ServiceError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
        Ok(())
    }

    /// Processes a verified PromptPay notification.
    #[instrument(skip(self, notification), fields(transaction_id = %notification.transaction_id))]
    pub async fn process_promptpay(
        &self,
        notification: PromptPayNotification,
    ) -> Result<WebhookOutcome, ServiceError> {
        // Idempotency: a payment already settled under this transaction id
        // means the provider redelivered the event.
        if let Some(existing) = self
            .payments
            .find_by_transaction_id(&notification.transaction_id)
            .await?
        {
            if existing.status != PaymentStatus::Pending {
                info!(
                    transaction_id = %notification.transaction_id,
                    payment_id = %existing.id,
                    "Webhook already processed; skipping"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let payment = self.resolve_promptpay_target(&notification).await?;

        if payment.amount != notification.amount {
            return Err(ServiceError::InvalidOperation(format!(
                "Webhook amount {} does not match payment amount {}",
                notification.amount, payment.amount
            )));
        }

        let raw = serde_json::to_value(&notification)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        self.payments
            .attach_provider_response(payment.id, Some(&notification.transaction_id), raw)
            .await?;

        if notification.status == "success" {
            self.payments.complete_payment(payment.id).await?;
        } else {
            self.payments
                .fail_payment(
                    payment.id,
                    &format!("Provider reported status '{}'", notification.status),
                )
                .await?;
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn resolve_promptpay_target(
        &self,
        notification: &PromptPayNotification,
    ) -> Result<payment::Model, ServiceError> {
        if let Some(existing) = self
            .payments
            .find_by_transaction_id(&notification.transaction_id)
            .await?
        {
            return Ok(existing);
        }
        let payment_id = Uuid::parse_str(&notification.reference_id).map_err(|_| {
            ServiceError::ValidationError(format!(
                "Webhook referenceId '{}' is not a payment id",
                notification.reference_id
            ))
        })?;
        self.payments.get_payment(payment_id).await
    }

    /// Processes a verified card gateway callback.
    #[instrument(skip(self, notification), fields(transaction_ref = %notification.transaction_ref, order_number = %notification.order_id))]
    pub async fn process_card(
        &self,
        notification: CardGatewayNotification,
    ) -> Result<WebhookOutcome, ServiceError> {
        if let Some(existing) = self
            .payments
            .find_by_transaction_id(&notification.transaction_ref)
            .await?
        {
            if existing.status != PaymentStatus::Pending {
                info!(
                    transaction_ref = %notification.transaction_ref,
                    payment_id = %existing.id,
                    "Webhook already processed; skipping"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let payment = self.resolve_card_target(&notification).await?;

        let mut raw = serde_json::to_value(&notification)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        // Never persist the full PAN; keep only the masked tail.
        if let Some(map) = raw.as_object_mut() {
            map.remove("card_number");
        }
        let updated = self
            .payments
            .attach_provider_response(payment.id, Some(&notification.transaction_ref), raw)
            .await?;

        if notification.card_number.is_some() || notification.card_brand.is_some() {
            let mut active: payment::ActiveModel = updated.into();
            if let Some(number) = &notification.card_number {
                let last4: String = number
                    .chars()
                    .rev()
                    .take(4)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                active.card_last4 = Set(Some(last4));
            }
            if let Some(brand) = &notification.card_brand {
                active.card_brand = Set(Some(brand.clone()));
            }
            active.update(&*self.db).await?;
        }

        if notification.is_success() {
            self.payments.complete_payment(payment.id).await?;
        } else {
            self.payments
                .fail_payment(
                    payment.id,
                    &format!("Gateway declined with status '{}'", notification.payment_status),
                )
                .await?;
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn resolve_card_target(
        &self,
        notification: &CardGatewayNotification,
    ) -> Result<payment::Model, ServiceError> {
        if let Some(existing) = self
            .payments
            .find_by_transaction_id(&notification.transaction_ref)
            .await?
        {
            return Ok(existing);
        }
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(&notification.order_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", notification.order_id))
            })?;
        self.payments
            .find_pending_for_order(order.id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "No pending payment for order {}",
                    notification.order_id
                ))
            })
    }
}
