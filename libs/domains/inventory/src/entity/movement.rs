use crate::models::{Movement, MovementKind};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub quantity: i32,
    pub stock_after: i32,
    pub occurred_at: DateTimeWithTimeZone,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub recipient: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Movement {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            kind: model.kind,
            quantity: model.quantity,
            stock_after: model.stock_after,
            occurred_at: model.occurred_at.into(),
            actor_id: model.actor_id,
            actor_name: model.actor_name,
            recipient: model.recipient,
            reason: model.reason,
        }
    }
}

impl From<&Movement> for ActiveModel {
    fn from(movement: &Movement) -> Self {
        ActiveModel {
            id: Set(movement.id),
            product_id: Set(movement.product_id),
            kind: Set(movement.kind),
            quantity: Set(movement.quantity),
            stock_after: Set(movement.stock_after),
            occurred_at: Set(movement.occurred_at.into()),
            actor_id: Set(movement.actor_id),
            actor_name: Set(movement.actor_name.clone()),
            recipient: Set(movement.recipient.clone()),
            reason: Set(movement.reason.clone()),
        }
    }
}
