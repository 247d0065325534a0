//! Order domain service.
//!
//! Validates input, prices the cart, drives the single-transaction order
//! assembly (order row, items, inventory reservations, addresses, shipment,
//! gifts, discount usage, initial history entry) and exposes the
//! state-machine-governed status transitions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        order::{
            self, Entity as OrderEntity, FulfillmentStatus, OrderPaymentStatus, OrderStatus,
        },
        order_address::{self, AddressKind, Entity as AddressEntity},
        order_gift,
        order_item::{self, Entity as OrderItemEntity},
        order_status_history::{self, Entity as HistoryEntity},
        discount_code_usage,
        shipment::{self, Entity as ShipmentEntity, ShipmentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        discounts::DiscountService,
        inventory::{self, InventoryService},
        pricing::{OrderLineRequest, PricingService},
    },
    state_machine,
};

pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Address line 1 is required"))]
    pub address_line1: String,
    pub address_line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Province is required"))]
    pub province: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    /// Absent for guest orders.
    pub customer_id: Option<Uuid>,
    /// Emptiness is rejected during price resolution.
    #[validate]
    pub items: Vec<OrderLineRequest>,
    #[validate]
    pub shipping_address: AddressInput,
    #[validate]
    pub billing_address: AddressInput,
    pub discount_code: Option<String>,
    pub shipping_method: Option<String>,
    pub customer_note: Option<String>,
}

/// The assembled order graph returned from creation and lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub shipping_address: Option<order_address::Model>,
    pub billing_address: Option<order_address::Model>,
    pub shipment: Option<shipment::Model>,
    pub gifts: Vec<order_gift::Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Payment outcome mapped onto the order lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderPaymentEvent {
    PaymentCompleted { order_id: Uuid },
    PaymentFailed { order_id: Uuid, reason: String },
    RefundProcessed { order_id: Uuid },
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    pricing: Arc<PricingService>,
    discounts: Arc<DiscountService>,
    inventory: Arc<InventoryService>,
    event_sender: EventSender,
    currency: String,
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        pricing: Arc<PricingService>,
        discounts: Arc<DiscountService>,
        inventory: Arc<InventoryService>,
        event_sender: EventSender,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            pricing,
            discounts,
            inventory,
            event_sender,
            currency: currency.into(),
        }
    }

    /// Creates an order from a cart in one transaction. Any failure,
    /// including an inventory shortfall on a later line, rolls back every
    /// row and every stock decrement.
    #[instrument(skip(self, request), fields(email = %request.email, line_count = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;

        let quote = self
            .pricing
            .quote(
                &request.items,
                request.discount_code.as_deref(),
                request.shipping_method.as_deref(),
                request.customer_id,
            )
            .await?;

        // Pre-check stock so the caller gets available-vs-requested detail;
        // the reservation inside the transaction has the final word.
        for line in &quote.lines {
            if let (Some(variant_id), true) = (line.variant_id, line.inventory_tracking) {
                if let Some(available) = self.inventory.available(variant_id).await? {
                    if available < line.quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Insufficient stock for {}: available {}, requested {}",
                            line.name, available, line.quantity
                        )));
                    }
                }
            }
        }

        let cart_products: HashSet<Uuid> = quote.lines.iter().map(|l| l.product_id).collect();
        let gifts = self
            .discounts
            .eligible_gifts(quote.subtotal, &cart_products)
            .await?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            email: Set(request.email.clone()),
            customer_id: Set(request.customer_id),
            status: Set(state_machine::initial_status()),
            payment_status: Set(OrderPaymentStatus::Pending),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            subtotal: Set(quote.subtotal),
            shipping_cost: Set(quote.shipping_cost),
            tax_amount: Set(quote.tax_amount),
            discount_amount: Set(quote.discount_amount),
            total_amount: Set(quote.total_amount),
            currency: Set(self.currency.clone()),
            customer_note: Set(request.customer_note.clone()),
            paid_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(quote.lines.len());
        for line in &quote.lines {
            if let (Some(variant_id), true) = (line.variant_id, line.inventory_tracking) {
                inventory::reserve(&txn, variant_id, line.product_id, line.quantity).await?;
            } else {
                inventory::record_sale(&txn, line.product_id, line.quantity).await?;
            }

            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                name: Set(line.name.clone()),
                sku: Set(line.sku.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                subtotal: Set(line.subtotal),
                product_snapshot: Set(Some(line.product_snapshot.clone())),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        let shipping_address = self
            .insert_address(&txn, order_id, AddressKind::Shipping, &request.shipping_address)
            .await?;
        let billing_address = self
            .insert_address(&txn, order_id, AddressKind::Billing, &request.billing_address)
            .await?;

        let shipment_row = shipment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            shipping_method: Set(quote.shipping_method.clone()),
            status: Set(ShipmentStatus::Pending),
            carrier: Set(None),
            tracking_number: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        let mut gift_rows = Vec::with_capacity(gifts.len());
        for gift in &gifts {
            let row = order_gift::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                gift_id: Set(gift.id),
                name: Set(gift.name.clone()),
                description: Set(gift.description.clone()),
                image_url: Set(gift.image_url.clone()),
                value: Set(gift.value),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            gift_rows.push(row);
        }

        if let Some(discount) = &quote.discount {
            discount_code_usage::ActiveModel {
                id: Set(Uuid::new_v4()),
                discount_code_id: Set(discount.code_id),
                order_id: Set(order_id),
                customer_id: Set(request.customer_id),
                amount: Set(discount.amount),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        order_status_history::ActiveModel {
            order_id: Set(order_id),
            status: Set(OrderStatus::Pending),
            note: Set(Some("Order created".to_string())),
            changed_by: Set(SYSTEM_ACTOR.to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order_number, total = order_model.total_amount, "Order created");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderCreated {
                order_id,
                order_number: order_model.order_number.clone(),
                email: order_model.email.clone(),
                total_amount: order_model.total_amount,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to queue order created event");
        }

        Ok(OrderDetails {
            order: order_model,
            items,
            shipping_address: Some(shipping_address),
            billing_address: Some(billing_address),
            shipment: Some(shipment_row),
            gifts: gift_rows,
        })
    }

    async fn insert_address(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        order_id: Uuid,
        kind: AddressKind,
        input: &AddressInput,
    ) -> Result<order_address::Model, ServiceError> {
        let row = order_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            kind: Set(kind),
            first_name: Set(input.first_name.clone()),
            last_name: Set(input.last_name.clone()),
            address_line1: Set(input.address_line1.clone()),
            address_line2: Set(input.address_line2.clone()),
            city: Set(input.city.clone()),
            province: Set(input.province.clone()),
            postal_code: Set(input.postal_code.clone()),
            country: Set(input.country.clone()),
            phone: Set(input.phone.clone()),
        }
        .insert(txn)
        .await?;
        Ok(row)
    }

    /// Transitions an order, appending a history row in the same
    /// transaction. Rejections carry the state machine's exact sentence.
    /// Status-change notification is dispatched fire-and-forget after commit.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
        actor: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find_order(order_id).await?;
        let old_status = order.status;

        if let Some(reason) = state_machine::transition_rejection_reason(old_status, new_status) {
            return Err(ServiceError::InvalidStatusTransition(reason));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(now));
        match new_status {
            OrderStatus::Shipped => {
                active.shipped_at = Set(Some(now));
                active.fulfillment_status = Set(FulfillmentStatus::Fulfilled);
            }
            OrderStatus::Delivered => active.delivered_at = Set(Some(now)),
            OrderStatus::Cancelled => active.cancelled_at = Set(Some(now)),
            _ => {}
        }
        let updated = active.update(&txn).await?;

        order_status_history::ActiveModel {
            order_id: Set(order_id),
            status: Set(new_status),
            note: Set(note),
            changed_by: Set(actor.unwrap_or_else(|| SYSTEM_ACTOR.to_string())),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, old_status = %old_status, new_status = %new_status, "Order status updated");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                order_number: updated.order_number.clone(),
                email: updated.email.clone(),
                old_status,
                new_status,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "Failed to queue status change event");
        }

        Ok(updated)
    }

    /// Statuses reachable from the order's current status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_valid_next_statuses(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatus>, ServiceError> {
        let order = self.find_order(order_id).await?;
        Ok(state_machine::valid_next_statuses(order.status).to_vec())
    }

    /// Maps a payment outcome onto the order lifecycle. Events that would
    /// violate the state machine are dropped with a logged warning rather
    /// than forced through or surfaced as errors.
    #[instrument(skip(self))]
    pub async fn handle_payment_event(
        &self,
        event: OrderPaymentEvent,
    ) -> Result<(), ServiceError> {
        match event {
            OrderPaymentEvent::PaymentCompleted { order_id } => {
                let order = self.find_order(order_id).await?;
                if order.status != OrderStatus::Pending {
                    warn!(
                        order_id = %order_id,
                        status = %order.status,
                        "Dropping payment_completed event: order is not pending"
                    );
                    return Ok(());
                }
                self.update_order_status(
                    order_id,
                    OrderStatus::Processing,
                    Some("Payment completed successfully".to_string()),
                    None,
                )
                .await?;
            }
            OrderPaymentEvent::PaymentFailed { order_id, reason } => {
                // No status change; the failure is recorded under the
                // current status for audit.
                let order = self.find_order(order_id).await?;
                order_status_history::ActiveModel {
                    order_id: Set(order_id),
                    status: Set(order.status),
                    note: Set(Some(format!("Payment failed: {}", reason))),
                    changed_by: Set(SYSTEM_ACTOR.to_string()),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
            OrderPaymentEvent::RefundProcessed { order_id } => {
                let order = self.find_order(order_id).await?;
                if state_machine::transition_rejection_reason(order.status, OrderStatus::Refunded)
                    .is_some()
                {
                    warn!(
                        order_id = %order_id,
                        status = %order.status,
                        "Dropping refund_processed event: transition not allowed"
                    );
                    return Ok(());
                }
                self.update_order_status(
                    order_id,
                    OrderStatus::Refunded,
                    Some("Refund processed successfully".to_string()),
                    None,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Loads the full order graph.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = self.find_order(order_id).await?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let addresses = AddressEntity::find()
            .filter(order_address::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let shipping_address = addresses
            .iter()
            .find(|a| a.kind == AddressKind::Shipping)
            .cloned();
        let billing_address = addresses
            .iter()
            .find(|a| a.kind == AddressKind::Billing)
            .cloned();

        let shipment = ShipmentEntity::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;

        let gifts = order_gift::Entity::find()
            .filter(order_gift::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetails {
            order,
            items,
            shipping_address,
            billing_address,
            shipment,
            gifts,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(&self, page: u64, per_page: u64) -> Result<OrderListPage, ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderListPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// History rows, most recent first. Sorted on the auto-increment key so
    /// entries sharing a timestamp still come back in insertion order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        self.find_order(order_id).await?;
        let rows = HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_desc(order_status_history::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    pub async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
