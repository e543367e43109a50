//! Inventory Domain
//!
//! Product registry, stock movement ledger and the reports built on them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Reporting  │  ← Dashboard counts, daily outbound series
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Validation, stock mutation, ledger queries
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Row lock + stock write + ledger append in one unit
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Products, categories, movements
//! └─────────────┘
//! ```
//!
//! Stock only changes through [`InventoryService::apply_movement`]; every
//! accepted change leaves exactly one [`Movement`] in the ledger.
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_inventory::{
//!     Actor, CreateCategory, CreateProduct, InMemoryInventoryRepository, InventoryService,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> domain_inventory::InventoryResult<()> {
//! let service = InventoryService::new(InMemoryInventoryRepository::new());
//!
//! let building = service.create_category(CreateCategory::new("Building")).await?;
//! let cement = service
//!     .create_product(CreateProduct::new("Cement 25kg", building.id))
//!     .await?;
//!
//! let actor = Actor::new(Uuid::now_v7(), "maria");
//! service.register_inbound(cement.id, 20, actor.clone(), None).await?;
//! service
//!     .register_outbound(cement.id, 5, actor, Some("Site B".to_string()), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod reporting;
pub mod repository;
pub mod service;

pub use config::InventoryConfig;
pub use error::{ErrorClass, InventoryError, InventoryResult};
pub use models::{
    Actor, Category, CreateCategory, CreateProduct, DailyTotal, DashboardSummary, DateRange,
    Movement, MovementKind, MovementQuery, Product, ProductFilter, ProductOrdering, ProductStatus,
    RecentMovement, StockCounts, StockMutation, TimeSeries, UnitOfMeasure, UpdateProduct,
    local_day,
};
pub use postgres::PgInventoryRepository;
pub use repository::{InMemoryInventoryRepository, InventoryRepository};
pub use service::InventoryService;
