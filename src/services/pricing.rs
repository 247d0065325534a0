//! Pricing calculator.
//!
//! Turns a line-item list plus optional discount code and shipping method
//! into subtotal, shipping, tax, discount and total, all in integer minor
//! currency units. Unit prices always come from the catalog rows; a
//! client-submitted price is never honored (the request carries none).

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        product::{self, Entity as ProductEntity, ProductStatus},
        product_variant::{self, Entity as VariantEntity},
    },
    errors::ServiceError,
    services::discounts::{AppliedDiscount, DiscountService},
};

/// Flat tax rate applied on subtotal + shipping.
pub const TAX_RATE_PERCENT: i64 = 7;

/// Orders at or above this subtotal ship free regardless of method.
pub const FREE_SHIPPING_THRESHOLD: i64 = 100_000;

/// Static shipping method table: (id, flat cost in minor units).
pub const SHIPPING_METHODS: &[(&str, i64)] = &[("standard", 5_000), ("express", 10_000), ("pickup", 0)];

pub const DEFAULT_SHIPPING_METHOD: &str = "standard";

/// One requested order line; prices are resolved server-side.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// A line with its authoritative price and frozen product snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub sku: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub subtotal: i64,
    pub inventory_tracking: bool,
    pub product_snapshot: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingQuote {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub shipping_method: String,
    pub discount: Option<AppliedDiscount>,
}

/// Round-half-up of `value * numerator / denominator` on non-negative
/// integer minor units.
pub fn round_half_up(value: i64, numerator: i64, denominator: i64) -> i64 {
    (value * numerator + denominator / 2) / denominator
}

pub fn tax_for(taxable: i64) -> i64 {
    round_half_up(taxable, TAX_RATE_PERCENT, 100)
}

/// Flat cost for a shipping method id, before the free-shipping rule.
pub fn shipping_method_cost(method: &str) -> Option<i64> {
    SHIPPING_METHODS
        .iter()
        .find(|(id, _)| *id == method)
        .map(|(_, cost)| *cost)
}

/// Shipping actually charged: free at or above the threshold.
pub fn shipping_cost_for(method_cost: i64, subtotal: i64) -> i64 {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        0
    } else {
        method_cost
    }
}

#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    discounts: Arc<DiscountService>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>, discounts: Arc<DiscountService>) -> Self {
        Self { db, discounts }
    }

    /// Resolves every line against the catalog: the product must exist, not
    /// be soft-deleted and be active; a given variant must belong to the
    /// product and be active. Prices come from the variant, falling back to
    /// the product base price.
    #[instrument(skip(self, items), fields(line_count = items.len()))]
    pub async fn resolve_lines(
        &self,
        items: &[OrderLineRequest],
    ) -> Result<Vec<PricedLine>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            item.validate()?;

            let product = ProductEntity::find_by_id(item.product_id)
                .filter(product::Column::IsDeleted.eq(false))
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            if product.status != ProductStatus::Active {
                return Err(ServiceError::ValidationError(format!(
                    "Product '{}' is not available for purchase",
                    product.name
                )));
            }

            let variant = match item.variant_id {
                Some(variant_id) => {
                    let variant = VariantEntity::find_by_id(variant_id)
                        .filter(product_variant::Column::ProductId.eq(item.product_id))
                        .one(&*self.db)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Variant {} not found", variant_id))
                        })?;
                    if !variant.is_active {
                        return Err(ServiceError::ValidationError(format!(
                            "Variant '{}' is not available for purchase",
                            variant.name
                        )));
                    }
                    Some(variant)
                }
                None => None,
            };

            let unit_price = variant.as_ref().map_or(product.base_price, |v| v.price);
            let (name, sku) = match &variant {
                Some(v) => (format!("{} - {}", product.name, v.name), v.sku.clone()),
                None => (product.name.clone(), product.sku.clone()),
            };

            let snapshot = serde_json::json!({
                "product": product,
                "variant": variant,
            });

            lines.push(PricedLine {
                product_id: product.id,
                variant_id: item.variant_id,
                category_id: product.category_id,
                name,
                sku,
                unit_price,
                quantity: item.quantity,
                subtotal: unit_price * item.quantity as i64,
                inventory_tracking: variant.as_ref().is_some_and(|v| v.inventory_tracking),
                product_snapshot: snapshot,
            });
        }
        Ok(lines)
    }

    /// Full quote: resolved lines, shipping, tax, discount and total.
    #[instrument(skip(self, items), fields(line_count = items.len()))]
    pub async fn quote(
        &self,
        items: &[OrderLineRequest],
        discount_code: Option<&str>,
        shipping_method: Option<&str>,
        customer_id: Option<Uuid>,
    ) -> Result<PricingQuote, ServiceError> {
        let lines = self.resolve_lines(items).await?;
        let subtotal: i64 = lines.iter().map(|l| l.subtotal).sum();

        let method = shipping_method.unwrap_or(DEFAULT_SHIPPING_METHOD);
        let method_cost = shipping_method_cost(method).ok_or_else(|| {
            ServiceError::ValidationError(format!("Unknown shipping method: {}", method))
        })?;
        let shipping_cost = shipping_cost_for(method_cost, subtotal);

        let tax_amount = tax_for(subtotal + shipping_cost);

        let discount = match discount_code {
            Some(code) => Some(
                self.discounts
                    .validate_and_price(code, &lines, subtotal, shipping_cost, customer_id)
                    .await?,
            ),
            None => None,
        };
        let discount_amount = discount.as_ref().map_or(0, |d| d.amount);

        let total_amount = (subtotal + shipping_cost + tax_amount - discount_amount).max(0);

        Ok(PricingQuote {
            lines,
            subtotal,
            shipping_cost,
            tax_amount,
            discount_amount,
            total_amount,
            shipping_method: method.to_string(),
            discount,
        })
    }
}
