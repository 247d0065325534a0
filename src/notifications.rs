//! Outbound email collaborator interface.
//!
//! The engine only depends on this trait; rendering and delivery live in an
//! external service. The default implementation logs what would be sent so
//! development and tests run without a mail backend.

use async_trait::async_trait;
use tracing::info;

use crate::entities::order::OrderStatus;

const STOREFRONT_BASE_URL: &str = "https://shop.example.com";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmation(
        &self,
        order_number: &str,
        email: &str,
        total_amount: i64,
    ) -> anyhow::Result<()>;

    async fn order_status_changed(
        &self,
        order_number: &str,
        email: &str,
        new_status: OrderStatus,
    ) -> anyhow::Result<()>;

    async fn payment_confirmation(
        &self,
        order_number: &str,
        email: &str,
        amount: i64,
    ) -> anyhow::Result<()>;

    async fn payment_failed(
        &self,
        order_number: &str,
        email: &str,
        reason: &str,
    ) -> anyhow::Result<()>;
}

fn order_link(order_number: &str) -> String {
    format!("{}/orders/{}", STOREFRONT_BASE_URL, order_number)
}

/// Logs every notification instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmation(
        &self,
        order_number: &str,
        email: &str,
        total_amount: i64,
    ) -> anyhow::Result<()> {
        info!(
            order_number,
            email,
            total_amount,
            link = %order_link(order_number),
            "email: order confirmation"
        );
        Ok(())
    }

    async fn order_status_changed(
        &self,
        order_number: &str,
        email: &str,
        new_status: OrderStatus,
    ) -> anyhow::Result<()> {
        info!(
            order_number,
            email,
            status = %new_status,
            link = %order_link(order_number),
            "email: order status update"
        );
        Ok(())
    }

    async fn payment_confirmation(
        &self,
        order_number: &str,
        email: &str,
        amount: i64,
    ) -> anyhow::Result<()> {
        info!(
            order_number,
            email,
            amount,
            link = %order_link(order_number),
            "email: payment confirmation"
        );
        Ok(())
    }

    async fn payment_failed(
        &self,
        order_number: &str,
        email: &str,
        reason: &str,
    ) -> anyhow::Result<()> {
        info!(
            order_number,
            email,
            reason,
            link = %order_link(order_number),
            "email: payment failed"
        );
        Ok(())
    }
}
