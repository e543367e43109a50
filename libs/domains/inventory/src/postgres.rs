use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sea_orm::ActiveValue::{Set, Unchanged};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr, Statement, TransactionTrait, Value,
};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::MIN_LOCK_TIMEOUT,
    entity::{category, movement, product},
    error::{InventoryError, InventoryResult},
    models::{
        Category, CreateCategory, CreateProduct, DailyTotal, DateRange, Movement, MovementKind,
        MovementQuery, Product, ProductFilter, ProductOrdering, RecentMovement, SYSTEM_ACTOR,
        StockCounts,
        StockMutation, UpdateProduct,
    },
    repository::InventoryRepository,
};

/// Postgres-backed registry and ledger.
///
/// Stock mutations run in one transaction holding `SELECT ... FOR UPDATE` on
/// the product row, bounded by `SET LOCAL lock_timeout`.
#[derive(Clone)]
pub struct PgInventoryRepository {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl PgInventoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout.max(MIN_LOCK_TIMEOUT);
        self
    }

    /// Everything between taking the row lock and appending the ledger entry
    async fn apply_in_txn(
        &self,
        txn: &DatabaseTransaction,
        mutation: &StockMutation,
    ) -> InventoryResult<(Product, Movement)> {
        let product_id = mutation.product_id;

        txn.execute_unprepared(&set_lock_timeout(self.lock_timeout))
            .await?;

        let locked = product::Entity::find_by_id(product_id)
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(|e| lock_error(e, product_id))?
            .ok_or(InventoryError::ProductNotFound(product_id))?;

        let mut current: Product = locked.into();
        let stock_after = current.apply_movement(mutation.kind, mutation.quantity)?;

        let stock_update = product::ActiveModel {
            id: Unchanged(product_id),
            stock: Set(current.stock),
            status: Set(current.status),
            updated_at: Set(current.updated_at.into()),
            ..Default::default()
        };
        let updated = stock_update.update(txn).await?;

        let entry = Movement::record(mutation, stock_after, Utc::now());
        let inserted = movement::ActiveModel::from(&entry).insert(txn).await?;

        Ok((updated.into(), inserted.into()))
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn is_foreign_key_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
}

/// `lock_timeout = 0` disables the timeout in Postgres, so the bound never drops below 1ms
fn set_lock_timeout(lock_timeout: Duration) -> String {
    format!(
        "SET LOCAL lock_timeout = '{}ms'",
        lock_timeout.max(MIN_LOCK_TIMEOUT).as_millis()
    )
}

/// SQLSTATE 55P03, raised once `lock_timeout` elapses
fn lock_error(err: DbErr, product_id: Uuid) -> InventoryError {
    let message = err.to_string();
    if message.contains("lock timeout") || message.contains("55P03") {
        InventoryError::LockTimeout(product_id)
    } else {
        err.into()
    }
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Debug, FromQueryResult)]
struct DailyTotalRow {
    day: NaiveDate,
    total: i64,
}

#[derive(Debug, FromQueryResult)]
struct StockCountsRow {
    total_products: i64,
    in_stock: i64,
    low_stock: i64,
}

#[derive(Debug, FromQueryResult)]
struct RecentMovementRow {
    id: Uuid,
    kind: String,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    occurred_at: DateTime<Utc>,
    actor_name: Option<String>,
}

impl TryFrom<RecentMovementRow> for RecentMovement {
    type Error = InventoryError;

    fn try_from(row: RecentMovementRow) -> Result<Self, Self::Error> {
        let kind: MovementKind = row
            .kind
            .parse()
            .map_err(|_| InventoryError::Internal(format!("unknown movement kind {}", row.kind)))?;

        Ok(Self {
            id: row.id,
            kind,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            occurred_at: row.occurred_at,
            actor: row.actor_name.unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
        })
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn create_category(&self, input: CreateCategory) -> InventoryResult<Category> {
        let name = input.name.clone();
        let active_model: category::ActiveModel = input.into();

        let model = active_model.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                InventoryError::DuplicateCategory(name)
            } else {
                e.into()
            }
        })?;

        tracing::info!(category_id = %model.id, "Created category");
        Ok(model.into())
    }

    async fn get_category(&self, id: Uuid) -> InventoryResult<Option<Category>> {
        let model = category::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list_categories(&self) -> InventoryResult<Vec<Category>> {
        let models = category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn delete_category(&self, id: Uuid) -> InventoryResult<bool> {
        let result = category::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    InventoryError::CategoryInUse(id)
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected > 0 {
            tracing::info!(category_id = %id, "Deleted category");
        }
        Ok(result.rows_affected > 0)
    }

    async fn exists_category_name(&self, name: &str) -> InventoryResult<bool> {
        let count = category::Entity::find()
            .filter(category::Column::Name.eq(name))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn create_product(&self, input: CreateProduct) -> InventoryResult<Product> {
        let name = input.name.clone();
        let category_id = input.category_id;
        let new_product = Product::new(input);

        let model = product::ActiveModel::from(&new_product)
            .insert(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    InventoryError::DuplicateName(name)
                } else if is_foreign_key_violation(&e) {
                    InventoryError::CategoryNotFound(category_id)
                } else {
                    e.into()
                }
            })?;

        tracing::info!(product_id = %model.id, stock = model.stock, "Created product");
        Ok(model.into())
    }

    async fn get_product(&self, id: Uuid) -> InventoryResult<Option<Product>> {
        let model = product::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list_products(&self, filter: ProductFilter) -> InventoryResult<Vec<Product>> {
        use sea_orm::sea_query::extension::postgres::PgExpr;

        let mut query = product::Entity::find();

        if let Some(needle) = &filter.search {
            let pattern = like_pattern(needle);
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::col((product::Entity, product::Column::Name))
                            .ilike(pattern.clone()),
                    )
                    .add(
                        Expr::col((product::Entity, product::Column::Description))
                            .ilike(pattern),
                    ),
            );
        }

        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }

        if let Some(status) = filter.status {
            query = query.filter(product::Column::Status.eq(status));
        }

        query = match filter.ordering {
            ProductOrdering::Name => query,
            ProductOrdering::Stock => query.order_by_asc(product::Column::Stock),
            ProductOrdering::StockDesc => query.order_by_desc(product::Column::Stock),
            ProductOrdering::CreatedAt => query.order_by_asc(product::Column::CreatedAt),
            ProductOrdering::CreatedAtDesc => query.order_by_desc(product::Column::CreatedAt),
        };

        let models = query
            .order_by_asc(product::Column::Name)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn update_product(&self, id: Uuid, input: UpdateProduct) -> InventoryResult<Product> {
        let existing = product::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))?;

        // Only the columns set here are written, so a concurrent stock change survives
        let mut active_model = product::ActiveModel {
            id: Unchanged(existing.id),
            ..Default::default()
        };
        if let Some(name) = input.name.clone() {
            active_model.name = Set(name);
        }
        if let Some(description) = input.description {
            active_model.description = Set(description);
        }
        if let Some(category_id) = input.category_id {
            active_model.category_id = Set(category_id);
        }
        if let Some(unit) = input.unit {
            active_model.unit = Set(unit);
        }
        active_model.updated_at = Set(Utc::now().into());

        let model = active_model.update(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                InventoryError::DuplicateName(input.name.clone().unwrap_or_default())
            } else if is_foreign_key_violation(&e) {
                InventoryError::CategoryNotFound(input.category_id.unwrap_or_default())
            } else {
                e.into()
            }
        })?;

        tracing::info!(product_id = %id, "Updated product");
        Ok(model.into())
    }

    async fn delete_product(&self, id: Uuid) -> InventoryResult<bool> {
        let result = product::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    InventoryError::ProductInUse(id)
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected > 0 {
            tracing::info!(product_id = %id, "Deleted product");
        }
        Ok(result.rows_affected > 0)
    }

    async fn exists_by_name(&self, name: &str) -> InventoryResult<bool> {
        let count = product::Entity::find()
            .filter(product::Column::Name.eq(name))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    async fn apply_movement(
        &self,
        mutation: StockMutation,
    ) -> InventoryResult<(Product, Movement)> {
        let txn = self.db.begin().await?;
        let outcome = self.apply_in_txn(&txn, &mutation).await;

        match outcome {
            Ok((product, movement)) => {
                txn.commit().await?;
                tracing::info!(
                    product_id = %product.id,
                    movement_id = %movement.id,
                    kind = %movement.kind,
                    quantity = movement.quantity,
                    stock_after = movement.stock_after,
                    "Committed stock movement"
                );
                Ok((product, movement))
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(
                        product_id = %mutation.product_id,
                        error = %rollback_err,
                        "Rollback after rejected movement failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn list_movements(&self, query: MovementQuery) -> InventoryResult<Vec<Movement>> {
        let mut select = movement::Entity::find();

        if let Some(product_id) = query.product_id {
            select = select.filter(movement::Column::ProductId.eq(product_id));
        }
        if let Some(kind) = query.kind {
            select = select.filter(movement::Column::Kind.eq(kind));
        }
        if let Some(from) = query.range.from {
            select = select.filter(movement::Column::OccurredAt.gte(from));
        }
        if let Some(to) = query.range.to {
            select = select.filter(movement::Column::OccurredAt.lt(to));
        }

        select = select
            .order_by_desc(movement::Column::OccurredAt)
            .order_by_desc(movement::Column::Id);
        if query.offset > 0 {
            select = select.offset(query.offset);
        }
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let models = select.all(&self.db).await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count_movements(&self, range: DateRange) -> InventoryResult<u64> {
        let mut select = movement::Entity::find();
        if let Some(from) = range.from {
            select = select.filter(movement::Column::OccurredAt.gte(from));
        }
        if let Some(to) = range.to {
            select = select.filter(movement::Column::OccurredAt.lt(to));
        }

        Ok(select.count(&self.db).await?)
    }

    async fn daily_totals(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        tz: Tz,
    ) -> InventoryResult<Vec<DailyTotal>> {
        let mut sql = String::from(
            r#"
            SELECT (occurred_at AT TIME ZONE $2)::date AS day,
                   SUM(quantity)::bigint AS total
            FROM stock_movements
            WHERE product_id = $1
            "#,
        );
        let mut values: Vec<Value> = vec![product_id.into(), tz.name().into()];
        if let Some(kind) = kind {
            sql.push_str(" AND kind::text = $3");
            values.push(kind.to_string().into());
        }
        sql.push_str(" GROUP BY day ORDER BY day");

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        let rows = DailyTotalRow::find_by_statement(stmt).all(&self.db).await?;

        Ok(rows
            .into_iter()
            .map(|row| DailyTotal {
                day: row.day,
                total: row.total,
            })
            .collect())
    }

    async fn stock_counts(&self, low_stock_threshold: i32) -> InventoryResult<StockCounts> {
        let sql = r#"
            SELECT COUNT(*)::bigint AS total_products,
                   COUNT(*) FILTER (WHERE stock > 0)::bigint AS in_stock,
                   COUNT(*) FILTER (WHERE stock <= $1)::bigint AS low_stock
            FROM products
        "#;

        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, sql, [low_stock_threshold.into()]);
        let row = StockCountsRow::find_by_statement(stmt)
            .one(&self.db)
            .await?
            .ok_or_else(|| InventoryError::Internal("stock count returned no row".to_string()))?;

        Ok(StockCounts {
            total_products: row.total_products as u64,
            in_stock: row.in_stock as u64,
            low_stock: row.low_stock as u64,
        })
    }

    async fn recent_movements(&self, limit: u64) -> InventoryResult<Vec<RecentMovement>> {
        let sql = r#"
            SELECT m.id, m.kind::text AS kind, m.product_id, p.name AS product_name,
                   m.quantity, m.occurred_at, m.actor_name
            FROM stock_movements m
            JOIN products p ON p.id = m.product_id
            ORDER BY m.occurred_at DESC, m.id DESC
            LIMIT $1
        "#;

        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, sql, [(limit as i64).into()]);
        let rows = RecentMovementRow::find_by_statement(stmt)
            .all(&self.db)
            .await?;

        rows.into_iter().map(RecentMovement::try_from).collect()
    }
}
