//! Inventory ledger.
//!
//! Owns the "is there enough stock" invariant. The only mutation is a
//! conditional decrement executed on the caller's transaction; the
//! `WHERE stock_quantity >= qty` predicate is the concurrency guard, so no
//! application-level lock is needed. Zero rows affected means the reservation
//! lost a stock race and the caller must roll back its whole transaction.

use std::sync::Arc;

use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        product::{self, Entity as ProductEntity},
        product_variant::{self, Entity as VariantEntity},
    },
    errors::ServiceError,
};

/// Decrements variant stock if and only if enough remains, and bumps the
/// owning product's sold count in the same step. Runs on `conn`, which is the
/// order-assembly transaction; on `InsufficientStock` the caller rolls back
/// and no partial decrement survives.
#[instrument(skip(conn))]
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = VariantEntity::update_many()
        .col_expr(
            product_variant::Column::StockQuantity,
            Expr::col(product_variant::Column::StockQuantity).sub(quantity),
        )
        .filter(product_variant::Column::Id.eq(variant_id))
        .filter(product_variant::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Variant {} has insufficient stock for quantity {}",
            variant_id, quantity
        )));
    }

    record_sale(conn, product_id, quantity).await
}

/// Increments the product's sold count. Monotonic: never decremented, even
/// when an order is later cancelled or refunded.
#[instrument(skip(conn))]
pub async fn record_sale<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ProductEntity::update_many()
        .col_expr(
            product::Column::SoldCount,
            Expr::col(product::Column::SoldCount).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Read side used for pre-validation messages (available vs requested).
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current stock for a variant; `None` when the variant does not track
    /// inventory.
    #[instrument(skip(self))]
    pub async fn available(&self, variant_id: Uuid) -> Result<Option<i32>, ServiceError> {
        let variant = VariantEntity::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        if !variant.inventory_tracking {
            return Ok(None);
        }
        Ok(Some(variant.stock_quantity))
    }
}
