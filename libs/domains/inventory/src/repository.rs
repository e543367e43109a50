use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::MIN_LOCK_TIMEOUT;
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    Category, CreateCategory, CreateProduct, DailyTotal, DateRange, Movement, MovementKind,
    MovementQuery, Product, ProductFilter, RecentMovement, SYSTEM_ACTOR, StockCounts,
    StockMutation, UpdateProduct, local_day,
};

/// Persistence for the product registry and the movement ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn create_category(&self, input: CreateCategory) -> InventoryResult<Category>;

    async fn get_category(&self, id: Uuid) -> InventoryResult<Option<Category>>;

    /// All categories ordered by name
    async fn list_categories(&self) -> InventoryResult<Vec<Category>>;

    /// Fails with `CategoryInUse` while products reference the category
    async fn delete_category(&self, id: Uuid) -> InventoryResult<bool>;

    async fn exists_category_name(&self, name: &str) -> InventoryResult<bool>;

    async fn create_product(&self, input: CreateProduct) -> InventoryResult<Product>;

    async fn get_product(&self, id: Uuid) -> InventoryResult<Option<Product>>;

    async fn list_products(&self, filter: ProductFilter) -> InventoryResult<Vec<Product>>;

    /// Descriptive update; must not overwrite a concurrently committed stock change
    async fn update_product(&self, id: Uuid, input: UpdateProduct) -> InventoryResult<Product>;

    /// Fails with `ProductInUse` while movements reference the product
    async fn delete_product(&self, id: Uuid) -> InventoryResult<bool>;

    /// Exact, case-sensitive name match
    async fn exists_by_name(&self, name: &str) -> InventoryResult<bool>;

    /// Apply one stock movement atomically.
    ///
    /// Takes the product's exclusive lock (bounded by the lock timeout),
    /// re-reads the stock under it, checks availability, then writes the new
    /// stock and status together with the ledger entry. Nothing is persisted
    /// unless all of it is.
    async fn apply_movement(&self, mutation: StockMutation)
    -> InventoryResult<(Product, Movement)>;

    /// Movements matching the query, newest first
    async fn list_movements(&self, query: MovementQuery) -> InventoryResult<Vec<Movement>>;

    async fn count_movements(&self, range: DateRange) -> InventoryResult<u64>;

    /// Quantity sums per calendar day in `tz` for a product, oldest day first
    async fn daily_totals(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        tz: Tz,
    ) -> InventoryResult<Vec<DailyTotal>>;

    async fn stock_counts(&self, low_stock_threshold: i32) -> InventoryResult<StockCounts>;

    /// Latest movements joined with their product names, newest first
    async fn recent_movements(&self, limit: u64) -> InventoryResult<Vec<RecentMovement>>;
}

#[derive(Debug, Default)]
struct Store {
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    movements: Vec<Movement>,
}

/// In-memory implementation of InventoryRepository (for development/testing)
///
/// Stock mutations serialize on a per-product mutex, mirroring the row lock
/// the Postgres implementation takes, and commit the product and the ledger
/// entry under one write of the store.
#[derive(Clone)]
pub struct InMemoryInventoryRepository {
    store: Arc<RwLock<Store>>,
    row_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
    append_fault: Arc<AtomicBool>,
}

impl Default for InMemoryInventoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            row_locks: Arc::new(DashMap::new()),
            lock_timeout: Duration::from_secs(5),
            append_fault: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout.max(MIN_LOCK_TIMEOUT);
        self
    }

    /// Lock entry for a product; callers check the product exists first
    fn row_lock(&self, product_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(&self.row_locks.entry(product_id).or_default())
    }

    /// Make the next ledger append fail after the new stock has been computed
    #[cfg(test)]
    pub(crate) fn fail_next_append(&self) {
        self.append_fault.store(true, Ordering::SeqCst);
    }

    fn sorted_newest_first(mut movements: Vec<Movement>) -> Vec<Movement> {
        movements.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        movements
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn create_category(&self, input: CreateCategory) -> InventoryResult<Category> {
        let mut store = self.store.write().await;

        if store.categories.values().any(|c| c.name == input.name) {
            return Err(InventoryError::DuplicateCategory(input.name));
        }

        let category = Category {
            id: Uuid::now_v7(),
            name: input.name,
            description: input.description,
            created_at: Utc::now(),
        };
        store.categories.insert(category.id, category.clone());

        Ok(category)
    }

    async fn get_category(&self, id: Uuid) -> InventoryResult<Option<Category>> {
        let store = self.store.read().await;
        Ok(store.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> InventoryResult<Vec<Category>> {
        let store = self.store.read().await;
        let mut categories: Vec<Category> = store.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn delete_category(&self, id: Uuid) -> InventoryResult<bool> {
        let mut store = self.store.write().await;

        if store.products.values().any(|p| p.category_id == id) {
            return Err(InventoryError::CategoryInUse(id));
        }

        Ok(store.categories.remove(&id).is_some())
    }

    async fn exists_category_name(&self, name: &str) -> InventoryResult<bool> {
        let store = self.store.read().await;
        Ok(store.categories.values().any(|c| c.name == name))
    }

    async fn create_product(&self, input: CreateProduct) -> InventoryResult<Product> {
        let mut store = self.store.write().await;

        if store.products.values().any(|p| p.name == input.name) {
            return Err(InventoryError::DuplicateName(input.name));
        }
        if !store.categories.contains_key(&input.category_id) {
            return Err(InventoryError::CategoryNotFound(input.category_id));
        }

        let product = Product::new(input);
        store.products.insert(product.id, product.clone());

        Ok(product)
    }

    async fn get_product(&self, id: Uuid) -> InventoryResult<Option<Product>> {
        let store = self.store.read().await;
        Ok(store.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: ProductFilter) -> InventoryResult<Vec<Product>> {
        let store = self.store.read().await;

        let mut products: Vec<Product> = store
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| filter.compare(a, b));

        Ok(products
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update_product(&self, id: Uuid, input: UpdateProduct) -> InventoryResult<Product> {
        let mut store = self.store.write().await;

        if let Some(name) = &input.name {
            if store.products.values().any(|p| p.id != id && &p.name == name) {
                return Err(InventoryError::DuplicateName(name.clone()));
            }
        }
        if let Some(category_id) = input.category_id {
            if !store.categories.contains_key(&category_id) {
                return Err(InventoryError::CategoryNotFound(category_id));
            }
        }

        let product = store
            .products
            .get_mut(&id)
            .ok_or(InventoryError::ProductNotFound(id))?;
        product.apply_update(input);

        Ok(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> InventoryResult<bool> {
        let mut store = self.store.write().await;

        if store.movements.iter().any(|m| m.product_id == id) {
            return Err(InventoryError::ProductInUse(id));
        }

        let removed = store.products.remove(&id).is_some();
        self.row_locks.remove(&id);
        Ok(removed)
    }

    async fn exists_by_name(&self, name: &str) -> InventoryResult<bool> {
        let store = self.store.read().await;
        Ok(store.products.values().any(|p| p.name == name))
    }

    async fn apply_movement(
        &self,
        mutation: StockMutation,
    ) -> InventoryResult<(Product, Movement)> {
        let product_id = mutation.product_id;

        if !self.store.read().await.products.contains_key(&product_id) {
            return Err(InventoryError::ProductNotFound(product_id));
        }

        let row_lock = self.row_lock(product_id);
        let _guard = tokio::time::timeout(self.lock_timeout, row_lock.lock_owned())
            .await
            .map_err(|_| InventoryError::LockTimeout(product_id))?;

        // Stock is read under the row lock, never from an earlier snapshot
        let mut product = self
            .store
            .read()
            .await
            .products
            .get(&product_id)
            .cloned()
            .ok_or(InventoryError::ProductNotFound(product_id))?;

        let stock_after = product.apply_movement(mutation.kind, mutation.quantity)?;
        let movement = Movement::record(&mutation, stock_after, Utc::now());

        if self.append_fault.swap(false, Ordering::SeqCst) {
            return Err(InventoryError::Database(
                "ledger append failed".to_string(),
            ));
        }

        let mut store = self.store.write().await;
        let updated = {
            let stored = store
                .products
                .get_mut(&product_id)
                .ok_or(InventoryError::ProductNotFound(product_id))?;
            stored.stock = product.stock;
            stored.status = product.status;
            stored.updated_at = product.updated_at;
            stored.clone()
        };
        store.movements.push(movement.clone());

        Ok((updated, movement))
    }

    async fn list_movements(&self, query: MovementQuery) -> InventoryResult<Vec<Movement>> {
        let store = self.store.read().await;

        let matching: Vec<Movement> = store
            .movements
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();

        let page = Self::sorted_newest_first(matching)
            .into_iter()
            .skip(query.offset as usize);

        Ok(match query.limit {
            Some(limit) => page.take(limit as usize).collect(),
            None => page.collect(),
        })
    }

    async fn count_movements(&self, range: DateRange) -> InventoryResult<u64> {
        let store = self.store.read().await;
        Ok(store
            .movements
            .iter()
            .filter(|m| range.contains(m.occurred_at))
            .count() as u64)
    }

    async fn daily_totals(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        tz: Tz,
    ) -> InventoryResult<Vec<DailyTotal>> {
        let store = self.store.read().await;

        let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for movement in store
            .movements
            .iter()
            .filter(|m| m.product_id == product_id && kind.is_none_or(|k| k == m.kind))
        {
            *totals.entry(local_day(movement.occurred_at, &tz)).or_default() +=
                i64::from(movement.quantity);
        }

        Ok(totals
            .into_iter()
            .map(|(day, total)| DailyTotal { day, total })
            .collect())
    }

    async fn stock_counts(&self, low_stock_threshold: i32) -> InventoryResult<StockCounts> {
        let store = self.store.read().await;

        Ok(store
            .products
            .values()
            .fold(StockCounts::default(), |mut counts, p| {
                counts.total_products += 1;
                if p.stock > 0 {
                    counts.in_stock += 1;
                }
                if p.stock <= low_stock_threshold {
                    counts.low_stock += 1;
                }
                counts
            }))
    }

    async fn recent_movements(&self, limit: u64) -> InventoryResult<Vec<RecentMovement>> {
        let store = self.store.read().await;

        Ok(Self::sorted_newest_first(store.movements.clone())
            .into_iter()
            .take(limit as usize)
            .map(|m| RecentMovement {
                id: m.id,
                kind: m.kind,
                product_id: m.product_id,
                product_name: store
                    .products
                    .get(&m.product_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                quantity: m.quantity,
                occurred_at: m.occurred_at,
                actor: m.actor_name.unwrap_or_else(|| SYSTEM_ACTOR.to_string()),
            })
            .collect())
    }
}
