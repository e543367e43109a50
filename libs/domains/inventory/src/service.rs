use async_stream::try_stream;
use chrono::NaiveDate;
use futures::Stream;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::config::InventoryConfig;
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    Actor, Category, CreateCategory, CreateProduct, DailyTotal, DateRange, Movement, MovementKind,
    MovementQuery, Product, ProductFilter, StockMutation, UpdateProduct,
};
use crate::repository::InventoryRepository;

/// Registry, stock mutation and ledger queries over one repository
#[derive(Clone)]
pub struct InventoryService<R: InventoryRepository> {
    pub(crate) repository: Arc<R>,
    pub(crate) config: InventoryConfig,
}

impl<R: InventoryRepository> InventoryService<R> {
    pub fn new(repository: R) -> Self {
        Self::with_config(repository, InventoryConfig::default())
    }

    pub fn with_config(repository: R, config: InventoryConfig) -> Self {
        Self {
            repository: Arc::new(repository),
            config,
        }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(&self, input: CreateCategory) -> InventoryResult<Category> {
        input.validate()?;

        if self.repository.exists_category_name(&input.name).await? {
            return Err(InventoryError::DuplicateCategory(input.name));
        }

        self.repository.create_category(input).await
    }

    pub async fn get_category(&self, id: Uuid) -> InventoryResult<Category> {
        self.repository
            .get_category(id)
            .await?
            .ok_or(InventoryError::CategoryNotFound(id))
    }

    pub async fn list_categories(&self) -> InventoryResult<Vec<Category>> {
        self.repository.list_categories().await
    }

    /// Refused while any product belongs to the category
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Uuid) -> InventoryResult<()> {
        if !self.repository.delete_category(id).await? {
            return Err(InventoryError::CategoryNotFound(id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    /// Register a product; its status follows from the initial stock
    #[instrument(skip(self, input), fields(name = %input.name, category_id = %input.category_id))]
    pub async fn create_product(&self, input: CreateProduct) -> InventoryResult<Product> {
        if input.initial_stock < 0 {
            return Err(InventoryError::InvalidStock(input.initial_stock));
        }
        input.validate()?;

        self.get_category(input.category_id).await?;

        if self.repository.exists_by_name(&input.name).await? {
            return Err(InventoryError::DuplicateName(input.name));
        }

        self.repository.create_product(input).await
    }

    pub async fn get_product(&self, id: Uuid) -> InventoryResult<Product> {
        self.repository
            .get_product(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    /// Last committed stock of a product
    pub async fn get_product_stock(&self, id: Uuid) -> InventoryResult<i32> {
        Ok(self.get_product(id).await?.stock)
    }

    pub async fn list_products(&self, filter: ProductFilter) -> InventoryResult<Vec<Product>> {
        self.repository.list_products(filter).await
    }

    /// Change descriptive fields. Stock only moves through [`Self::apply_movement`].
    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: Uuid, input: UpdateProduct) -> InventoryResult<Product> {
        input.validate()?;

        let current = self.get_product(id).await?;

        if let Some(name) = &input.name {
            if name != &current.name && self.repository.exists_by_name(name).await? {
                return Err(InventoryError::DuplicateName(name.clone()));
            }
        }
        if let Some(category_id) = input.category_id {
            if category_id != current.category_id {
                self.get_category(category_id).await?;
            }
        }

        self.repository.update_product(id, input).await
    }

    /// Refused once the product has ledger history
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> InventoryResult<()> {
        if !self.repository.delete_product(id).await? {
            return Err(InventoryError::ProductNotFound(id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stock mutation
    // ------------------------------------------------------------------

    /// Apply one movement: validate, then lock, check, write and append atomically.
    ///
    /// Input errors are raised before any lock is taken. A `LockTimeout` is
    /// returned to the caller as is; resending is up to them.
    #[instrument(
        skip(self, mutation),
        fields(
            product_id = %mutation.product_id,
            kind = %mutation.kind,
            quantity = mutation.quantity,
            actor = %mutation.actor.username
        )
    )]
    pub async fn apply_movement(
        &self,
        mutation: StockMutation,
    ) -> InventoryResult<(Product, Movement)> {
        mutation.validate()?;

        match self.repository.apply_movement(mutation).await {
            Ok((product, movement)) => {
                tracing::info!(
                    movement_id = %movement.id,
                    stock_after = product.stock,
                    status = %product.status,
                    "Stock movement applied"
                );
                Ok((product, movement))
            }
            Err(err) => {
                tracing::warn!(error = %err, class = ?err.class(), "Stock movement rejected");
                Err(err)
            }
        }
    }

    pub async fn register_inbound(
        &self,
        product_id: Uuid,
        quantity: i32,
        actor: Actor,
        reason: Option<String>,
    ) -> InventoryResult<(Product, Movement)> {
        let mut mutation = StockMutation::inbound(product_id, quantity, actor);
        mutation.reason = reason;
        self.apply_movement(mutation).await
    }

    pub async fn register_outbound(
        &self,
        product_id: Uuid,
        quantity: i32,
        actor: Actor,
        recipient: Option<String>,
        reason: Option<String>,
    ) -> InventoryResult<(Product, Movement)> {
        let mut mutation = StockMutation::outbound(product_id, quantity, actor);
        mutation.recipient = recipient;
        mutation.reason = reason;
        self.apply_movement(mutation).await
    }

    // ------------------------------------------------------------------
    // Ledger queries
    // ------------------------------------------------------------------

    /// Movements of one product, newest first
    pub async fn list_movements(
        &self,
        product_id: Uuid,
        range: Option<DateRange>,
    ) -> InventoryResult<Vec<Movement>> {
        self.get_product(product_id).await?;

        self.repository
            .list_movements(MovementQuery {
                product_id: Some(product_id),
                range: range.unwrap_or_default(),
                ..Default::default()
            })
            .await
    }

    pub async fn query_movements(&self, query: MovementQuery) -> InventoryResult<Vec<Movement>> {
        self.repository.list_movements(query).await
    }

    /// Movements of every product on one calendar day of the configured zone, newest first
    pub async fn movements_on(
        &self,
        date: NaiveDate,
        kind: Option<MovementKind>,
    ) -> InventoryResult<Vec<Movement>> {
        self.repository
            .list_movements(MovementQuery {
                kind,
                range: DateRange::day(date, &self.config.timezone),
                ..Default::default()
            })
            .await
    }

    /// Totals per calendar day of the configured zone for one product, oldest first
    pub async fn daily_totals(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
    ) -> InventoryResult<Vec<DailyTotal>> {
        self.get_product(product_id).await?;
        self.repository
            .daily_totals(product_id, kind, self.config.timezone)
            .await
    }

    /// Lazily page through the ledger, `page_size` rows per repository call.
    ///
    /// Pages are offset-based, so movements committed while the stream is
    /// being consumed may shift rows between pages.
    pub fn movement_stream(
        &self,
        query: MovementQuery,
        page_size: u64,
    ) -> impl Stream<Item = InventoryResult<Movement>> + Send + 'static
    where
        R: 'static,
    {
        let repository = Arc::clone(&self.repository);
        let page_size = page_size.max(1);

        try_stream! {
            let mut offset = query.offset;
            let mut remaining = query.limit;

            loop {
                let take = match remaining {
                    Some(0) => break,
                    Some(left) => left.min(page_size),
                    None => page_size,
                };

                let page = repository
                    .list_movements(MovementQuery {
                        limit: Some(take),
                        offset,
                        ..query.clone()
                    })
                    .await?;
                let fetched = page.len() as u64;

                for movement in page {
                    yield movement;
                }

                if fetched < take {
                    break;
                }
                offset += fetched;
                if let Some(left) = remaining.as_mut() {
                    *left -= fetched;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryInventoryRepository, MockInventoryRepository};
    use futures::{StreamExt, TryStreamExt};
    use mockall::predicate::eq;

    fn actor() -> Actor {
        Actor::new(Uuid::now_v7(), "maria")
    }

    fn product(stock: i32) -> Product {
        Product::new(CreateProduct::new("Cement", Uuid::now_v7()).with_initial_stock(stock))
    }

    fn category(id: Uuid) -> Category {
        Category {
            id,
            name: "Building".to_string(),
            description: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_non_positive_quantity_never_reaches_repository() {
        // No expectations: any repository call panics
        let service = InventoryService::new(MockInventoryRepository::new());

        let err = service
            .register_outbound(Uuid::now_v7(), 0, actor(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(0)));

        let err = service
            .register_inbound(Uuid::now_v7(), -5, actor(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidQuantity(-5)));
    }

    #[tokio::test]
    async fn test_inbound_with_recipient_is_rejected() {
        let service = InventoryService::new(MockInventoryRepository::new());

        let mut mutation = StockMutation::inbound(Uuid::now_v7(), 3, actor());
        mutation.recipient = Some("Site B".to_string());

        let err = service.apply_movement(mutation).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_outbound_passes_recipient_to_repository() {
        let mut mock_repo = MockInventoryRepository::new();
        let target = product(10);
        let target_id = target.id;

        mock_repo
            .expect_apply_movement()
            .withf(move |m| {
                m.product_id == target_id
                    && m.kind == MovementKind::Outbound
                    && m.recipient.as_deref() == Some("Site B")
            })
            .times(1)
            .returning(move |m| {
                let mut p = target.clone();
                let stock_after = p.apply_movement(m.kind, m.quantity)?;
                let movement = Movement::record(&m, stock_after, chrono::Utc::now());
                Ok((p, movement))
            });

        let service = InventoryService::new(mock_repo);
        let (p, movement) = service
            .register_outbound(target_id, 4, actor(), Some("Site B".to_string()), None)
            .await
            .unwrap();

        assert_eq!(p.stock, 6);
        assert_eq!(movement.stock_after, 6);
    }

    #[tokio::test]
    async fn test_negative_initial_stock_rejected_before_repository() {
        let service = InventoryService::new(MockInventoryRepository::new());

        let err = service
            .create_product(CreateProduct::new("Sand", Uuid::now_v7()).with_initial_stock(-1))
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidStock(-1)));
    }

    #[tokio::test]
    async fn test_create_product_duplicate_name() {
        let mut mock_repo = MockInventoryRepository::new();
        let category_id = Uuid::now_v7();

        mock_repo
            .expect_get_category()
            .with(eq(category_id))
            .returning(|id| Ok(Some(category(id))));
        mock_repo
            .expect_exists_by_name()
            .with(eq("Cement"))
            .returning(|_| Ok(true));
        mock_repo.expect_create_product().times(0);

        let service = InventoryService::new(mock_repo);
        let err = service
            .create_product(CreateProduct::new("Cement", category_id))
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::DuplicateName(name) if name == "Cement"));
    }

    #[tokio::test]
    async fn test_create_product_unknown_category() {
        let mut mock_repo = MockInventoryRepository::new();
        mock_repo.expect_get_category().returning(|_| Ok(None));

        let service = InventoryService::new(mock_repo);
        let missing = Uuid::now_v7();
        let err = service
            .create_product(CreateProduct::new("Cement", missing))
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::CategoryNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_create_product_name_too_long() {
        let service = InventoryService::new(MockInventoryRepository::new());

        let err = service
            .create_product(CreateProduct::new("x".repeat(201), Uuid::now_v7()))
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_product_is_not_found() {
        let mut mock_repo = MockInventoryRepository::new();
        mock_repo.expect_delete_product().returning(|_| Ok(false));

        let service = InventoryService::new(mock_repo);
        let err = service.delete_product(Uuid::now_v7()).await.unwrap_err();

        assert!(matches!(err, InventoryError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_product_stock() {
        let mut mock_repo = MockInventoryRepository::new();
        let p = product(17);
        let id = p.id;
        mock_repo
            .expect_get_product()
            .with(eq(id))
            .returning(move |_| Ok(Some(p.clone())));

        let service = InventoryService::new(mock_repo);
        assert_eq!(service.get_product_stock(id).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_lock_timeout_surfaces_unchanged() {
        let mut mock_repo = MockInventoryRepository::new();
        mock_repo
            .expect_apply_movement()
            .times(1)
            .returning(|m| Err(InventoryError::LockTimeout(m.product_id)));

        let service = InventoryService::new(mock_repo);
        let err = service
            .register_inbound(Uuid::now_v7(), 1, actor(), None)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    async fn stocked_service() -> (InventoryService<InMemoryInventoryRepository>, Product) {
        let service = InventoryService::new(InMemoryInventoryRepository::new());
        let building = service
            .create_category(CreateCategory::new("Building"))
            .await
            .unwrap();
        let sand = service
            .create_product(CreateProduct::new("Sand", building.id))
            .await
            .unwrap();
        (service, sand)
    }

    #[tokio::test]
    async fn test_list_movements_unknown_product() {
        let (service, _) = stocked_service().await;

        let err = service
            .list_movements(Uuid::now_v7(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_movement_stream_walks_every_page() {
        let (service, sand) = stocked_service().await;
        for quantity in 1..=7 {
            service
                .register_inbound(sand.id, quantity, actor(), None)
                .await
                .unwrap();
        }

        let all: Vec<Movement> = service
            .movement_stream(MovementQuery::for_product(sand.id), 3)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 7);

        let limited: Vec<Movement> = service
            .movement_stream(
                MovementQuery {
                    product_id: Some(sand.id),
                    limit: Some(4),
                    ..Default::default()
                },
                3,
            )
            .try_collect()
            .await
            .unwrap();
        assert_eq!(limited.len(), 4);
    }

    #[tokio::test]
    async fn test_movement_stream_is_lazy() {
        let (service, sand) = stocked_service().await;
        service
            .register_inbound(sand.id, 2, actor(), None)
            .await
            .unwrap();

        let stream = service.movement_stream(MovementQuery::default(), 10);
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.quantity, 2);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_update_product_rename_conflict() {
        let (service, sand) = stocked_service().await;
        service
            .create_product(CreateProduct::new("Gravel", sand.category_id))
            .await
            .unwrap();

        let err = service
            .update_product(
                sand.id,
                UpdateProduct {
                    name: Some("Gravel".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, InventoryError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_daily_totals_use_configured_timezone() {
        let mut mock_repo = MockInventoryRepository::new();
        let p = product(5);
        let id = p.id;
        mock_repo
            .expect_get_product()
            .returning(move |_| Ok(Some(p.clone())));
        mock_repo
            .expect_daily_totals()
            .with(eq(id), eq(Some(MovementKind::Outbound)), eq(chrono_tz::Tz::UTC))
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let config = InventoryConfig {
            timezone: chrono_tz::Tz::UTC,
            ..InventoryConfig::default()
        };
        let service = InventoryService::with_config(mock_repo, config);

        assert!(
            service
                .daily_totals(id, Some(MovementKind::Outbound))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_movements_on_uses_local_day() {
        let service = InventoryService::new(InMemoryInventoryRepository::new());
        let building = service
            .create_category(CreateCategory::new("Building"))
            .await
            .unwrap();
        let sand = service
            .create_product(CreateProduct::new("Sand", building.id).with_initial_stock(10))
            .await
            .unwrap();

        // 21:00 in Lima on March 1st
        let evening = chrono::DateTime::parse_from_rfc3339("2025-03-02T02:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        service
            .apply_movement(StockMutation::outbound(sand.id, 3, actor()).at(evening))
            .await
            .unwrap();

        let mar1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mar2 = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(service.movements_on(mar1, None).await.unwrap().len(), 1);
        assert!(service.movements_on(mar2, None).await.unwrap().is_empty());
    }
}
