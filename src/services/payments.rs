//! Payment settlement service.
//!
//! Owns the payment status machine (pending -> completed | failed,
//! completed -> refunded, failed -> pending) and the completion/failure
//! paths the webhook processor and admin tooling share. Order-level effects
//! go through the order service so the order state machine is always
//! consulted.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderPaymentStatus},
        payment::{self, Entity as PaymentEntity, PaymentProvider, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{OrderPaymentEvent, OrderService},
};

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderService>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
        }
    }

    /// Opens a new pending payment attempt for an order. Retries after a
    /// failure create a fresh row; failed rows are kept for audit.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn create_payment(
        &self,
        order_id: Uuid,
        provider: PaymentProvider,
        method: impl Into<String> + std::fmt::Debug,
    ) -> Result<payment::Model, ServiceError> {
        let order = self.orders.find_order(order_id).await?;
        let now = Utc::now();

        let row = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            provider: Set(provider),
            method: Set(method.into()),
            amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            status: Set(PaymentStatus::Pending),
            transaction_id: Set(None),
            card_last4: Set(None),
            card_brand: Set(None),
            provider_response: Set(None),
            failure_reason: Set(None),
            completed_at: Set(None),
            failed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;

        info!(payment_id = %row.id, order_id = %order_id, "Payment created");
        Ok(row)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    pub async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<payment::Model>, ServiceError> {
        Ok(PaymentEntity::find()
            .filter(payment::Column::TransactionId.eq(transaction_id))
            .one(&*self.db)
            .await?)
    }

    /// Latest pending payment attempt for an order, used when a provider
    /// callback references the order rather than a payment.
    pub async fn find_pending_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<payment::Model>, ServiceError> {
        Ok(PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?)
    }

    /// Records the provider's transaction id and raw response for audit.
    /// Done before outcome evaluation so even a failing settlement leaves a
    /// traceable row.
    #[instrument(skip(self, response), fields(payment_id = %payment_id))]
    pub async fn attach_provider_response(
        &self,
        payment_id: Uuid,
        transaction_id: Option<&str>,
        response: serde_json::Value,
    ) -> Result<payment::Model, ServiceError> {
        let current = self.get_payment(payment_id).await?;
        let mut active: payment::ActiveModel = current.into();
        if let Some(txid) = transaction_id {
            active.transaction_id = Set(Some(txid.to_string()));
        }
        active.provider_response = Set(Some(response));
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(&*self.db).await?)
    }

    /// Marks the payment completed and settles the order: payment status
    /// paid, `paid_at`, order transition to processing via the order state
    /// machine, confirmation email queued asynchronously.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn complete_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let current = PaymentEntity::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if !current.status.can_transition_to(PaymentStatus::Completed) {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment {} cannot be completed from its current state",
                payment_id
            )));
        }

        let order_id = current.order_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Completed);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let order_number = order.order_number.clone();
        let email = order.email.clone();
        let mut order_active: order::ActiveModel = order.into();
        order_active.payment_status = Set(OrderPaymentStatus::Paid);
        order_active.paid_at = Set(Some(now));
        order_active.updated_at = Set(Some(now));
        order_active.update(&txn).await?;

        txn.commit().await?;

        info!(payment_id = %payment_id, order_id = %order_id, "Payment completed");

        // Outside the transaction: the order transition consults the state
        // machine, and an event that would violate it is dropped there.
        self.orders
            .handle_payment_event(OrderPaymentEvent::PaymentCompleted { order_id })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentCompleted {
                order_id,
                order_number,
                email,
                amount: updated.amount,
            })
            .await
        {
            warn!(error = %e, payment_id = %payment_id, "Failed to queue payment completed event");
        }

        Ok(updated)
    }

    /// Marks the payment failed. The order's payment status moves to failed,
    /// its lifecycle status is untouched, and the failure is appended to the
    /// order history for audit.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn fail_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<payment::Model, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let current = PaymentEntity::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if !current.status.can_transition_to(PaymentStatus::Failed) {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment {} cannot be failed from its current state",
                payment_id
            )));
        }

        let order_id = current.order_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Failed);
        active.failed_at = Set(Some(now));
        active.failure_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let order_number = order.order_number.clone();
        let email = order.email.clone();
        let mut order_active: order::ActiveModel = order.into();
        order_active.payment_status = Set(OrderPaymentStatus::Failed);
        order_active.updated_at = Set(Some(now));
        order_active.update(&txn).await?;

        txn.commit().await?;

        info!(payment_id = %payment_id, order_id = %order_id, reason, "Payment failed");

        self.orders
            .handle_payment_event(OrderPaymentEvent::PaymentFailed {
                order_id,
                reason: reason.to_string(),
            })
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentFailed {
                order_id,
                order_number,
                email,
                reason: reason.to_string(),
            })
            .await
        {
            warn!(error = %e, payment_id = %payment_id, "Failed to queue payment failed event");
        }

        Ok(updated)
    }

    /// Refunds a completed payment and moves the order to refunded through
    /// the order state machine.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn refund_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let current = PaymentEntity::find_by_id(payment_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if !current.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment {} cannot be refunded: only completed payments are refundable",
                payment_id
            )));
        }

        let order_id = current.order_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Refunded);
        active.updated_at = Set(Some(now));
        let updated = active.update(&txn).await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let mut order_active: order::ActiveModel = order.into();
        order_active.payment_status = Set(OrderPaymentStatus::Refunded);
        order_active.updated_at = Set(Some(now));
        order_active.update(&txn).await?;

        txn.commit().await?;

        info!(payment_id = %payment_id, order_id = %order_id, "Payment refunded");

        self.orders
            .handle_payment_event(OrderPaymentEvent::RefundProcessed { order_id })
            .await?;

        Ok(updated)
    }

    /// Admin override: completes a payment through the normal completion
    /// path, tagging the provider response blob with the verifier identity
    /// for audit. Rejected when the payment is already completed or
    /// refunded.
    #[instrument(skip(self), fields(payment_id = %payment_id, verified_by = %verified_by))]
    pub async fn manually_verify_payment(
        &self,
        payment_id: Uuid,
        verified_by: &str,
        note: Option<String>,
    ) -> Result<payment::Model, ServiceError> {
        let current = self.get_payment(payment_id).await?;
        match current.status {
            PaymentStatus::Completed => {
                return Err(ServiceError::InvalidOperation(
                    "Payment is already completed".to_string(),
                ))
            }
            PaymentStatus::Refunded => {
                return Err(ServiceError::InvalidOperation(
                    "Cannot verify a refunded payment".to_string(),
                ))
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {}
        }

        // A failed payment re-enters pending before completing, per the
        // payment status machine.
        if current.status == PaymentStatus::Failed {
            let mut active: payment::ActiveModel = current.clone().into();
            active.status = Set(PaymentStatus::Pending);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&*self.db).await?;
        }

        let mut audit = current
            .provider_response
            .clone()
            .unwrap_or_else(|| json!({}));
        if let Some(map) = audit.as_object_mut() {
            map.insert("manually_verified_by".into(), json!(verified_by));
            map.insert("manual_verification_note".into(), json!(note));
            map.insert("manually_verified_at".into(), json!(Utc::now().to_rfc3339()));
        }
        self.attach_provider_response(payment_id, None, audit).await?;

        self.complete_payment(payment_id).await
    }
}
