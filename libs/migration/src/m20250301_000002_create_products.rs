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
                    .as_enum(UnitOfMeasure::Enum)
                    .values([UnitOfMeasure::Unit, UnitOfMeasure::Kg, UnitOfMeasure::Pair])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(ProductStatus::Enum)
                    .values([ProductStatus::Available, ProductStatus::Unavailable])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(pk_uuid(Products::Id))
                    .col(string_len_uniq(Products::Name, 200))
                    .col(text_null(Products::Description))
                    .col(uuid(Products::CategoryId))
                    .col(
                        ColumnDef::new(Products::Unit)
                            .enumeration(
                                UnitOfMeasure::Enum,
                                [UnitOfMeasure::Unit, UnitOfMeasure::Kg, UnitOfMeasure::Pair],
                            )
                            .not_null()
                            .default("unit"),
                    )
                    .col(integer(Products::Stock).default(0))
                    .col(
                        ColumnDef::new(Products::Status)
                            .enumeration(
                                ProductStatus::Enum,
                                [ProductStatus::Available, ProductStatus::Unavailable],
                            )
                            .not_null()
                            .default("unavailable"),
                    )
                    .col(
                        timestamp_with_time_zone(Products::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Products::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_category_id")
                            .from(Products::Table, Products::CategoryId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // The registry invariants are enforced by the database as well
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE products
                    ADD CONSTRAINT products_stock_non_negative CHECK (stock >= 0),
                    ADD CONSTRAINT products_status_matches_stock
                        CHECK ((stock > 0) = (status = 'available'))
                "#,
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_category_id")
                    .table(Products::Table)
                    .col(Products::CategoryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_stock")
                    .table(Products::Table)
                    .col(Products::Stock)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER products_touch_updated_at
                    BEFORE UPDATE ON products
                    FOR EACH ROW
                    EXECUTE FUNCTION util.touch_updated_at()
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS products_touch_updated_at ON products")
            .await?;

        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ProductStatus::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(UnitOfMeasure::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Description,
    CategoryId,
    Unit,
    Stock,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum UnitOfMeasure {
    #[sea_orm(iden = "unit_of_measure")]
    Enum,
    #[sea_orm(iden = "unit")]
    Unit,
    #[sea_orm(iden = "kg")]
    Kg,
    #[sea_orm(iden = "pair")]
    Pair,
}

#[derive(DeriveIden)]
enum ProductStatus {
    #[sea_orm(iden = "product_status")]
    Enum,
    #[sea_orm(iden = "available")]
    Available,
    #[sea_orm(iden = "unavailable")]
    Unavailable,
}
