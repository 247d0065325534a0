use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Association between a complimentary gift and a product whose presence in
/// the cart makes the gift eligible regardless of subtotal.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gift_products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub gift_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::complimentary_gift::Entity",
        from = "Column::GiftId",
        to = "super::complimentary_gift::Column::Id"
    )]
    Gift,
}

impl Related<super::complimentary_gift::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Gift.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
