//! Storefront order lifecycle & payment settlement engine.
//!
//! Core responsibilities: atomic order assembly from a cart (pricing,
//! inventory reservation, discount and gift application), a strict finite
//! state machine over order status, and reconciliation of at-least-once
//! payment-provider webhooks under idempotency and signature-verification
//! guarantees.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod notifications;
pub mod services;
pub mod state_machine;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::{
    config::AppConfig,
    events::EventSender,
    handlers::AppServices,
    services::{
        discounts::DiscountService, inventory::InventoryService, orders::OrderService,
        payments::PaymentService, pricing::PricingService, webhooks::WebhookService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    /// Wires up the service graph over a connected database.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        event_sender: EventSender,
    ) -> Self {
        let discounts = Arc::new(DiscountService::new(db.clone()));
        let pricing = Arc::new(PricingService::new(db.clone(), discounts.clone()));
        let inventory = Arc::new(InventoryService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            pricing.clone(),
            discounts.clone(),
            inventory.clone(),
            event_sender.clone(),
            config.currency.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            orders.clone(),
            event_sender.clone(),
        ));
        let webhooks = Arc::new(WebhookService::new(
            db.clone(),
            payments.clone(),
            config.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                orders,
                payments,
                webhooks,
                pricing,
                discounts,
                inventory,
            },
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", handlers::api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
