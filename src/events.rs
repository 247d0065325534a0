//! Fire-and-forget domain events.
//!
//! Services publish events after their transaction commits; a detached worker
//! forwards them to the notification collaborator. Delivery is best effort:
//! a send or dispatch failure is logged and never propagates to, or rolls
//! back, the triggering state change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::notifications::Notifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        email: String,
        total_amount: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        email: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentCompleted {
        order_id: Uuid,
        order_number: String,
        email: String,
        amount: i64,
    },
    PaymentFailed {
        order_id: Uuid,
        order_number: String,
        email: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event for the background worker. Callers treat failure as
    /// non-fatal and log it.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a channel plus sender; pair with [`process_events`].
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Background worker draining the event channel into the notifier. Runs until
/// every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    while let Some(event) = rx.recv().await {
        let result = match &event {
            Event::OrderCreated {
                order_number,
                email,
                total_amount,
                ..
            } => {
                info!(order_number = %order_number, "Order created");
                notifier
                    .order_confirmation(order_number, email, *total_amount)
                    .await
            }
            Event::OrderStatusChanged {
                order_number,
                email,
                new_status,
                ..
            } => {
                notifier
                    .order_status_changed(order_number, email, *new_status)
                    .await
            }
            Event::PaymentCompleted {
                order_number,
                email,
                amount,
                ..
            } => {
                notifier
                    .payment_confirmation(order_number, email, *amount)
                    .await
            }
            Event::PaymentFailed {
                order_number,
                email,
                reason,
                ..
            } => notifier.payment_failed(order_number, email, reason).await,
        };

        if let Err(e) = result {
            warn!(error = %e, ?event, "Notification dispatch failed");
        }
    }
}
