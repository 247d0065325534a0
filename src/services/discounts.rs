//! Discount code validation and complimentary-gift eligibility.
//!
//! Validation short-circuits on the first failing check, in the documented
//! priority order. Usage limits are enforced against persisted
//! `discount_code_usages` rows, never a cached counter.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        complimentary_gift::{self, Entity as GiftEntity},
        discount_code::{self, DiscountType, Entity as DiscountCodeEntity},
        discount_code_usage::{self, Entity as UsageEntity},
        gift_product::{self, Entity as GiftProductEntity},
    },
    errors::ServiceError,
    services::pricing::{round_half_up, PricedLine},
};

/// Why a discount code was refused. The variant order mirrors the check
/// order; callers surface `code()` and the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountRejection {
    #[error("Invalid discount code")]
    InvalidCode,
    #[error("This discount code is not active yet")]
    NotStarted,
    #[error("This discount code has expired")]
    Expired,
    #[error("Minimum purchase amount for this discount code not met")]
    MinPurchaseNotMet,
    #[error("This discount code has reached its usage limit")]
    UsageLimitReached,
    #[error("You have already used this discount code")]
    AlreadyUsed,
}

impl DiscountRejection {
    pub fn code(&self) -> &'static str {
        match self {
            DiscountRejection::InvalidCode => "INVALID_CODE",
            DiscountRejection::NotStarted => "NOT_STARTED",
            DiscountRejection::Expired => "EXPIRED",
            DiscountRejection::MinPurchaseNotMet => "MIN_PURCHASE_NOT_MET",
            DiscountRejection::UsageLimitReached | DiscountRejection::AlreadyUsed => {
                "USAGE_LIMIT_REACHED"
            }
        }
    }
}

/// A validated discount ready to be recorded against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub code_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub amount: i64,
}

/// Discount amount by type. `applicable_subtotal` is the allow-list filtered
/// subtotal; `shipping_cost` the shipping that would otherwise be charged.
pub fn discount_amount(
    discount_type: DiscountType,
    value: i64,
    max_discount_amount: Option<i64>,
    applicable_subtotal: i64,
    shipping_cost: i64,
) -> i64 {
    match discount_type {
        DiscountType::Percentage => {
            let raw = round_half_up(applicable_subtotal, value, 100);
            match max_discount_amount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        DiscountType::FixedAmount => value.min(applicable_subtotal),
        DiscountType::FreeShipping => shipping_cost,
    }
}

fn uuid_set(value: &Option<serde_json::Value>) -> HashSet<Uuid> {
    value
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Subtotal of the lines the code applies to. Empty allow-lists mean the
/// whole cart.
pub fn applicable_subtotal(
    lines: &[PricedLine],
    product_allow: &HashSet<Uuid>,
    category_allow: &HashSet<Uuid>,
    subtotal: i64,
) -> i64 {
    if product_allow.is_empty() && category_allow.is_empty() {
        return subtotal;
    }
    lines
        .iter()
        .filter(|l| {
            product_allow.contains(&l.product_id)
                || l
                    .category_id
                    .map(|c| category_allow.contains(&c))
                    .unwrap_or(false)
        })
        .map(|l| l.subtotal)
        .sum()
}

/// Whether a gift qualifies for the current cart. Threshold gifts drop out
/// when the subtotal falls below their minimum; product-associated gifts stay
/// eligible as long as the product is in the cart.
pub fn gift_is_eligible(
    gift: &complimentary_gift::Model,
    subtotal: i64,
    cart_product_ids: &HashSet<Uuid>,
    associated_product_ids: &HashSet<Uuid>,
) -> bool {
    if !gift.is_active {
        return false;
    }
    let meets_threshold = gift
        .min_purchase_amount
        .map(|min| subtotal >= min)
        .unwrap_or(false);
    let has_product = !associated_product_ids.is_disjoint(cart_product_ids);
    meets_threshold || has_product
}

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
}

impl DiscountService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validates a code against the current cart and prices the discount.
    #[instrument(skip(self, lines), fields(code = %code))]
    pub async fn validate_and_price(
        &self,
        code: &str,
        lines: &[PricedLine],
        subtotal: i64,
        shipping_cost: i64,
        customer_id: Option<Uuid>,
    ) -> Result<AppliedDiscount, ServiceError> {
        let now = Utc::now();

        let discount = DiscountCodeEntity::find()
            .filter(discount_code::Column::Code.eq(code))
            .filter(discount_code::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or(DiscountRejection::InvalidCode)?;

        if let Some(starts_at) = discount.starts_at {
            if now < starts_at {
                return Err(DiscountRejection::NotStarted.into());
            }
        }
        if let Some(expires_at) = discount.expires_at {
            if now >= expires_at {
                return Err(DiscountRejection::Expired.into());
            }
        }
        if let Some(min) = discount.min_purchase_amount {
            if subtotal < min {
                return Err(DiscountRejection::MinPurchaseNotMet.into());
            }
        }

        if let Some(limit) = discount.usage_limit {
            let used = UsageEntity::find()
                .filter(discount_code_usage::Column::DiscountCodeId.eq(discount.id))
                .count(&*self.db)
                .await?;
            if used >= limit as u64 {
                return Err(DiscountRejection::UsageLimitReached.into());
            }
        }

        if let (Some(limit), Some(customer)) = (discount.usage_limit_per_customer, customer_id) {
            let used = UsageEntity::find()
                .filter(discount_code_usage::Column::DiscountCodeId.eq(discount.id))
                .filter(discount_code_usage::Column::CustomerId.eq(customer))
                .count(&*self.db)
                .await?;
            if used >= limit as u64 {
                return Err(DiscountRejection::AlreadyUsed.into());
            }
        }

        let product_allow = uuid_set(&discount.product_ids);
        let category_allow = uuid_set(&discount.category_ids);
        let applicable = applicable_subtotal(lines, &product_allow, &category_allow, subtotal);

        let amount = discount_amount(
            discount.discount_type,
            discount.value,
            discount.max_discount_amount,
            applicable,
            shipping_cost,
        );

        Ok(AppliedDiscount {
            code_id: discount.id,
            code: discount.code,
            discount_type: discount.discount_type,
            amount,
        })
    }

    /// Every active gift eligible at this subtotal / cart composition.
    /// Recomputed from the inputs on every call; nothing is cached.
    #[instrument(skip(self, cart_product_ids))]
    pub async fn eligible_gifts(
        &self,
        subtotal: i64,
        cart_product_ids: &HashSet<Uuid>,
    ) -> Result<Vec<complimentary_gift::Model>, ServiceError> {
        let gifts = GiftEntity::find()
            .filter(complimentary_gift::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?;
        if gifts.is_empty() {
            return Ok(vec![]);
        }

        let gift_ids: Vec<Uuid> = gifts.iter().map(|g| g.id).collect();
        let associations = GiftProductEntity::find()
            .filter(gift_product::Column::GiftId.is_in(gift_ids))
            .all(&*self.db)
            .await?;

        Ok(gifts
            .into_iter()
            .filter(|gift| {
                let associated: HashSet<Uuid> = associations
                    .iter()
                    .filter(|a| a.gift_id == gift.id)
                    .map(|a| a.product_id)
                    .collect();
                gift_is_eligible(gift, subtotal, cart_product_ids, &associated)
            })
            .collect())
    }
}
