use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(MovementKind::Enum)
                    .values([MovementKind::Inbound, MovementKind::Outbound])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(pk_uuid(StockMovements::Id))
                    .col(uuid(StockMovements::ProductId))
                    .col(
                        ColumnDef::new(StockMovements::Kind)
                            .enumeration(
                                MovementKind::Enum,
                                [MovementKind::Inbound, MovementKind::Outbound],
                            )
                            .not_null(),
                    )
                    .col(integer(StockMovements::Quantity))
                    .col(integer(StockMovements::StockAfter))
                    .col(
                        timestamp_with_time_zone(StockMovements::OccurredAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(uuid_null(StockMovements::ActorId))
                    .col(string_len_null(StockMovements::ActorName, 150))
                    .col(string_len_null(StockMovements::Recipient, 100))
                    .col(text_null(StockMovements::Reason))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stock_movements_product_id")
                            .from(StockMovements::Table, StockMovements::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE stock_movements
                    ADD CONSTRAINT stock_movements_quantity_positive CHECK (quantity > 0),
                    ADD CONSTRAINT stock_movements_stock_after_non_negative CHECK (stock_after >= 0),
                    ADD CONSTRAINT stock_movements_recipient_outbound_only
                        CHECK (recipient IS NULL OR kind = 'outbound')
                "#,
            )
            .await?;

        // Per-product history, newest first, and per-day dashboard counts
        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_product_occurred_at")
                    .table(StockMovements::Table)
                    .col(StockMovements::ProductId)
                    .col(StockMovements::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_occurred_at")
                    .table(StockMovements::Table)
                    .col(StockMovements::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(MovementKind::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    Id,
    ProductId,
    Kind,
    Quantity,
    StockAfter,
    OccurredAt,
    ActorId,
    ActorName,
    Recipient,
    Reason,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum MovementKind {
    #[sea_orm(iden = "movement_kind")]
    Enum,
    #[sea_orm(iden = "inbound")]
    Inbound,
    #[sea_orm(iden = "outbound")]
    Outbound,
}
