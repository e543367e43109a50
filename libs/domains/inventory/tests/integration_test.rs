//! Integration tests for the Inventory domain
//!
//! These tests use real PostgreSQL via testcontainers to ensure:
//! - Row locks serialize concurrent stock mutations
//! - A failed ledger append rolls the stock change back
//! - Foreign keys and CHECK constraints are enforced
//! - Per-day listings and aggregates follow the configured zone's calendar

use chrono::{NaiveDate, TimeZone, Utc};
use domain_inventory::*;
use sea_orm::{EntityTrait, QuerySelect, TransactionTrait};
use std::time::Duration;
use test_utils::{TestDataBuilder, TestDatabase, assertions::*};
use uuid::Uuid;

struct Fixture {
    db: TestDatabase,
    service: InventoryService<PgInventoryRepository>,
    repo: PgInventoryRepository,
    builder: TestDataBuilder,
    category: Category,
}

impl Fixture {
    async fn new(test_name: &str) -> Self {
        let db = TestDatabase::new().await;
        let repo = PgInventoryRepository::new(db.connection());
        let service = InventoryService::new(repo.clone());
        let builder = TestDataBuilder::from_test_name(test_name);

        let category = service
            .create_category(CreateCategory::new(builder.name("category", "building")))
            .await
            .unwrap();

        Self {
            db,
            service,
            repo,
            builder,
            category,
        }
    }

    fn actor(&self) -> Actor {
        Actor::new(self.builder.actor_id(), self.builder.actor_name())
    }

    async fn product(&self, suffix: &str, stock: i32) -> Product {
        self.service
            .create_product(
                CreateProduct::new(self.builder.name("product", suffix), self.category.id)
                    .with_initial_stock(stock),
            )
            .await
            .unwrap()
    }

    async fn ledger_sum(&self, product_id: Uuid) -> i64 {
        self.service
            .list_movements(product_id, None)
            .await
            .unwrap()
            .iter()
            .map(Movement::signed_quantity)
            .sum()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_create_and_get_product() {
    let fx = Fixture::new("create_and_get_product").await;

    let created = fx
        .service
        .create_product(
            CreateProduct::new(fx.builder.name("product", "gloves"), fx.category.id)
                .with_unit(UnitOfMeasure::Pair)
                .with_initial_stock(12),
        )
        .await
        .unwrap();

    assert_eq!(created.status, ProductStatus::Available);
    assert_eq!(created.unit, UnitOfMeasure::Pair);

    let fetched = fx.repo.get_product(created.id).await.unwrap();
    let fetched = assert_some(fetched, "product should exist");
    assert_uuid_eq(fetched.id, created.id, "product id");
    assert_uuid_eq(fetched.category_id, fx.category.id, "category id");
    assert_eq!(fetched.stock, 12);
}

#[tokio::test]
async fn test_duplicate_product_name_constraint() {
    let fx = Fixture::new("duplicate_product_name").await;
    let name = fx.builder.name("product", "cement");

    fx.repo
        .create_product(CreateProduct::new(name.clone(), fx.category.id))
        .await
        .unwrap();

    // Bypass the service pre-check so the unique index answers
    let err = fx
        .repo
        .create_product(CreateProduct::new(name.clone(), fx.category.id))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::DuplicateName(n) if n == name));
}

#[tokio::test]
async fn test_list_products_filters() {
    let fx = Fixture::new("list_products_filters").await;
    fx.product("Cement-Grey", 0).await;
    fx.product("cement-white", 4).await;
    fx.product("Gravel", 9).await;

    let found = fx
        .service
        .list_products(ProductFilter {
            search: Some("CEMENT".to_string()),
            category_id: Some(fx.category.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 2);

    let by_stock = fx
        .service
        .list_products(ProductFilter {
            category_id: Some(fx.category.id),
            ordering: ProductOrdering::StockDesc,
            ..Default::default()
        })
        .await
        .unwrap();
    let stocks: Vec<i32> = by_stock.iter().map(|p| p.stock).collect();
    assert_eq!(stocks, vec![9, 4, 0]);

    let available = fx
        .service
        .list_products(ProductFilter {
            category_id: Some(fx.category.id),
            status: Some(ProductStatus::Available),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(available.len(), 2);
    assert!(available.iter().all(|p| p.stock > 0));
}

#[tokio::test]
async fn test_search_matches_description() {
    let fx = Fixture::new("search_matches_description").await;
    fx.service
        .create_product(CreateProduct {
            description: Some("Portland 42.5% grey".to_string()),
            ..CreateProduct::new(fx.builder.name("product", "bag"), fx.category.id)
        })
        .await
        .unwrap();
    fx.product("gravel", 1).await;

    let found = fx
        .service
        .list_products(ProductFilter {
            search: Some("portland".to_string()),
            category_id: Some(fx.category.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    // Wildcards in the needle match literally
    let found = fx
        .service
        .list_products(ProductFilter {
            search: Some("42.5%".to_string()),
            category_id: Some(fx.category.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_update_product_keeps_stock() {
    let fx = Fixture::new("update_product_keeps_stock").await;
    let bolts = fx.product("bolts", 3).await;

    let updated = fx
        .service
        .update_product(
            bolts.id,
            UpdateProduct {
                description: Some(Some("M8 hex bolts".to_string())),
                unit: Some(UnitOfMeasure::Kg),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.description.as_deref(), Some("M8 hex bolts"));
    assert_eq!(updated.unit, UnitOfMeasure::Kg);
    assert_eq!(updated.name, bolts.name);
    assert_eq!(updated.stock, 3);
    assert_eq!(updated.status, ProductStatus::Available);

    let cleared = fx
        .service
        .update_product(
            bolts.id,
            UpdateProduct {
                description: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.unit, UnitOfMeasure::Kg);
}

#[tokio::test]
async fn test_delete_protection() {
    let fx = Fixture::new("delete_protection").await;
    let used = fx.product("used", 0).await;
    let unused = fx.product("unused", 0).await;

    fx.service
        .register_inbound(used.id, 5, fx.actor(), None)
        .await
        .unwrap();

    let err = fx.service.delete_product(used.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::ProductInUse(id) if id == used.id));

    let err = fx.service.delete_category(fx.category.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::CategoryInUse(_)));

    fx.service.delete_product(unused.id).await.unwrap();
    assert!(fx.repo.get_product(unused.id).await.unwrap().is_none());
}

// ============================================================================
// Stock mutation
// ============================================================================

#[tokio::test]
async fn test_inbound_then_outbound_to_zero() {
    let fx = Fixture::new("inbound_then_outbound").await;
    let cement = fx.product("cement", 0).await;

    let (after_in, movement) = fx
        .service
        .register_inbound(cement.id, 20, fx.actor(), Some("supplier delivery".to_string()))
        .await
        .unwrap();
    assert_eq!(after_in.stock, 20);
    assert_eq!(after_in.status, ProductStatus::Available);
    assert_eq!(movement.actor_name, Some(fx.builder.actor_name()));

    let (after_out, movement) = fx
        .service
        .register_outbound(cement.id, 20, fx.actor(), Some("Site B".to_string()), None)
        .await
        .unwrap();
    assert_eq!(after_out.stock, 0);
    assert_eq!(after_out.status, ProductStatus::Unavailable);
    assert_eq!(movement.recipient.as_deref(), Some("Site B"));
    assert_eq!(movement.stock_after, 0);

    let ledger = fx.service.list_movements(cement.id, None).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].kind, MovementKind::Outbound);
    assert_eq!(fx.ledger_sum(cement.id).await, 0);
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let fx = Fixture::new("insufficient_stock").await;
    let gloves = fx.product("gloves", 5).await;

    let err = fx
        .service
        .register_outbound(gloves.id, 6, fx.actor(), None, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InventoryError::InsufficientStock {
            available: 5,
            requested: 6,
            ..
        }
    ));
    assert_eq!(fx.service.get_product_stock(gloves.id).await.unwrap(), 5);
    assert!(fx.service.list_movements(gloves.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let fx = Fixture::new("unknown_product").await;
    let missing = Uuid::now_v7();

    let err = fx
        .service
        .register_inbound(missing, 1, fx.actor(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, InventoryError::ProductNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_failed_ledger_append_rolls_back_stock() {
    let fx = Fixture::new("failed_append_rollback").await;
    let sand = fx.product("sand", 10).await;

    // The stock update succeeds, then the ledger CHECK rejects a recipient on an inbound row
    let mut mutation = StockMutation::inbound(sand.id, 5, fx.actor());
    mutation.recipient = Some("nobody".to_string());

    let err = fx.repo.apply_movement(mutation).await.unwrap_err();
    assert!(matches!(err, InventoryError::Database(_)));

    assert_eq!(fx.service.get_product_stock(sand.id).await.unwrap(), 10);
    assert!(fx.service.list_movements(sand.id, None).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outbounds_never_oversell() {
    let fx = Fixture::new("concurrent_outbounds").await;
    let cement = fx.product("cement", 10).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = fx.service.clone();
            let actor = fx.actor();
            let id = cement.id;
            tokio::spawn(async move { service.register_outbound(id, 3, actor, None, None).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(InventoryError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 3);
    let stock = fx.service.get_product_stock(cement.id).await.unwrap();
    assert_eq!(stock, 1);
    assert_eq!(10 + fx.ledger_sum(cement.id).await, i64::from(stock));
}

#[tokio::test]
async fn test_lock_timeout_when_row_is_held() {
    let fx = Fixture::new("lock_timeout").await;
    let bolts = fx.product("bolts", 10).await;
    let impatient = fx
        .repo
        .clone()
        .with_lock_timeout(Duration::from_millis(100));

    let holder = fx.db.connection.begin().await.unwrap();
    entity::product::Entity::find_by_id(bolts.id)
        .lock_exclusive()
        .one(&holder)
        .await
        .unwrap();

    let err = impatient
        .apply_movement(StockMutation::outbound(bolts.id, 1, fx.actor()))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::LockTimeout(id) if id == bolts.id));
    assert!(err.is_retryable());

    holder.rollback().await.unwrap();

    let (product, _) = impatient
        .apply_movement(StockMutation::outbound(bolts.id, 1, fx.actor()))
        .await
        .unwrap();
    assert_eq!(product.stock, 9);
}

// ============================================================================
// Ledger queries and reporting
// ============================================================================

#[tokio::test]
async fn test_movements_on_day_and_outbound_series() {
    let fx = Fixture::new("movements_on_day").await;
    let sand = fx.product("sand", 100).await;
    let mar1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let mar2 = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();

    // Lima (UTC-5) wall clock: 09:00 and 23:59 on March 1st, midnight on March 2nd
    let day1 = Utc.with_ymd_and_hms(2025, 3, 1, 14, 0, 0).unwrap();
    let day1_late = Utc.with_ymd_and_hms(2025, 3, 2, 4, 59, 0).unwrap();
    let day2 = Utc.with_ymd_and_hms(2025, 3, 2, 5, 0, 0).unwrap();

    for (at, quantity) in [(day1, 5), (day1_late, 7), (day2, 3)] {
        fx.service
            .apply_movement(StockMutation::outbound(sand.id, quantity, fx.actor()).at(at))
            .await
            .unwrap();
    }
    fx.service
        .apply_movement(StockMutation::inbound(sand.id, 30, fx.actor()).at(day2))
        .await
        .unwrap();

    let on_day1 = fx
        .service
        .movements_on(mar1, Some(MovementKind::Outbound))
        .await
        .unwrap();
    assert_eq!(on_day1.len(), 2);
    assert_eq!(on_day1[0].quantity, 7);

    let series = fx.service.outbound_chart(sand.id).await.unwrap();
    assert_eq!(series.dates, vec![mar1, mar2]);
    assert_eq!(series.quantities, vec![12, 3]);

    let all_kinds = fx.service.daily_totals(sand.id, None).await.unwrap();
    assert_eq!(all_kinds.len(), 2);
    assert_eq!(all_kinds[1].total, 33);

    // The same ledger read on UTC days puts the late entry on March 2nd
    let utc_service = InventoryService::with_config(
        fx.repo.clone(),
        InventoryConfig {
            timezone: chrono_tz::Tz::UTC,
            ..InventoryConfig::default()
        },
    );
    let utc_series = utc_service.outbound_chart(sand.id).await.unwrap();
    assert_eq!(utc_series.quantities, vec![5, 10]);
}

#[tokio::test]
async fn test_list_movements_is_repeatable() {
    let fx = Fixture::new("list_movements_repeatable").await;
    let sand = fx.product("sand", 20).await;
    let mar1 = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
    let mar2 = Utc.with_ymd_and_hms(2025, 3, 2, 15, 0, 0).unwrap();

    for (at, quantity) in [(mar1, 4), (mar1, 2), (mar2, 5)] {
        fx.service
            .apply_movement(StockMutation::outbound(sand.id, quantity, fx.actor()).at(at))
            .await
            .unwrap();
    }

    let march1 = DateRange::day(
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        &fx.service.config().timezone,
    );
    for range in [None, Some(march1)] {
        let first = fx.service.list_movements(sand.id, range).await.unwrap();
        let second = fx.service.list_movements(sand.id, range).await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    let ranged = fx.service.list_movements(sand.id, Some(march1)).await.unwrap();
    assert_eq!(ranged.len(), 2);
    assert_eq!(fx.service.get_product_stock(sand.id).await.unwrap(), 9);
}

#[tokio::test]
async fn test_dashboard_summary() {
    let fx = Fixture::new("dashboard_summary").await;
    let cement = fx.product("cement", 0).await;
    fx.product("gloves", 10).await;
    fx.product("bolts", 11).await;

    let now = Utc::now();
    fx.service
        .register_inbound(cement.id, 4, fx.actor(), None)
        .await
        .unwrap();
    fx.service
        .register_outbound(cement.id, 1, fx.actor(), None, None)
        .await
        .unwrap();

    let summary = fx.service.dashboard_summary_at(now).await.unwrap();
    assert_eq!(summary.total_products, 3);
    assert_eq!(summary.in_stock, 3);
    assert_eq!(summary.low_stock, 2);
    assert_eq!(summary.movements_today, 2);
    assert_eq!(summary.recent_movements.len(), 2);
    assert_eq!(summary.recent_movements[0].kind, MovementKind::Outbound);
    assert_eq!(summary.recent_movements[0].product_name, cement.name);
    assert_eq!(summary.recent_movements[0].actor, fx.builder.actor_name());
}

#[tokio::test]
async fn test_movement_stream_pages_through_ledger() {
    use futures::TryStreamExt;

    let fx = Fixture::new("movement_stream").await;
    let sand = fx.product("sand", 0).await;
    for quantity in 1..=5 {
        fx.service
            .register_inbound(sand.id, quantity, fx.actor(), None)
            .await
            .unwrap();
    }

    let streamed: Vec<Movement> = fx
        .service
        .movement_stream(MovementQuery::for_product(sand.id), 2)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(streamed.len(), 5);
    assert_eq!(
        streamed.iter().map(|m| m.quantity).sum::<i32>(),
        15,
        "every movement streamed exactly once"
    );
}
