use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{
    services::{
        discounts::DiscountService, inventory::InventoryService, orders::OrderService,
        payments::PaymentService, pricing::PricingService, webhooks::WebhookService,
    },
    AppState,
};

pub mod orders;
pub mod payment_webhooks;
pub mod payments;

/// Service container shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookService>,
    pub pricing: Arc<PricingService>,
    pub discounts: Arc<DiscountService>,
    pub inventory: Arc<InventoryService>,
}

/// `/api/v1` routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        .route("/orders/:id/next-statuses", get(orders::get_next_statuses))
        .route("/orders/:id/history", get(orders::get_status_history))
        .route("/orders/:id/payments", post(payments::create_payment))
        .route("/payments/:id", get(payments::get_payment))
        .route("/payments/:id/verify", post(payments::manually_verify_payment))
        .route(
            "/payments/webhooks/promptpay",
            post(payment_webhooks::promptpay_webhook),
        )
        .route(
            "/payments/webhooks/card",
            post(payment_webhooks::card_webhook),
        )
}
