use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Complimentary gift catalog entry. A gift is eligible for an order when the
/// subtotal meets `min_purchase_amount` or one of its associated products
/// (see [`super::gift_product`]) is in the cart.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "complimentary_gifts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub image_url: Option<String>,
    pub value: i64,
    #[sea_orm(nullable)]
    pub min_purchase_amount: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::gift_product::Entity")]
    GiftProducts,
}

impl Related<super::gift_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GiftProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
