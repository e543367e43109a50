//! Command implementations; every command prints JSON to stdout

use database::postgres::{DatabaseConnection, check_health_detailed, run_migrations};
use domain_inventory::{
    Actor, CreateCategory, CreateProduct, InventoryConfig, InventoryService, MovementQuery,
    PgInventoryRepository, ProductFilter, UnitOfMeasure, UpdateProduct,
};
use eyre::{Result, eyre};
use futures::TryStreamExt;
use migration::Migrator;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub struct Ledger {
    db: DatabaseConnection,
    service: InventoryService<PgInventoryRepository>,
    actor: Option<Actor>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Ledger {
    pub fn new(db: DatabaseConnection, config: InventoryConfig, actor: Option<Actor>) -> Self {
        let repository =
            PgInventoryRepository::new(db.clone()).with_lock_timeout(config.lock_timeout);
        Self {
            db,
            service: InventoryService::with_config(repository, config),
            actor,
        }
    }

    fn actor(&self) -> Result<Actor> {
        self.actor.clone().ok_or_else(|| {
            eyre!("no actor: pass --actor-id and --actor or set ALMACEN_ACTOR_ID/ALMACEN_ACTOR_NAME")
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        run_migrations::<Migrator>(&self.db, "almacen-stock").await?;
        print_json(&json!({ "migrated": true }))
    }

    pub async fn health(&self) -> Result<()> {
        let status = check_health_detailed(&self.db).await;
        print_json(&json!({
            "healthy": status.healthy,
            "message": status.message,
            "response_time_ms": status.response_time_ms,
        }))
    }

    pub async fn add_category(&self, name: String, description: Option<String>) -> Result<()> {
        let category = self
            .service
            .create_category(CreateCategory { name, description })
            .await?;
        print_json(&category)
    }

    pub async fn list_categories(&self) -> Result<()> {
        print_json(&self.service.list_categories().await?)
    }

    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        self.service.delete_category(id).await?;
        print_json(&json!({ "deleted": id }))
    }

    pub async fn add_product(
        &self,
        name: String,
        category_id: Uuid,
        unit: UnitOfMeasure,
        initial_stock: i32,
        description: Option<String>,
    ) -> Result<()> {
        let product = self
            .service
            .create_product(CreateProduct {
                name,
                description,
                category_id,
                unit,
                initial_stock,
            })
            .await?;
        print_json(&product)
    }

    pub async fn list_products(&self, filter: ProductFilter) -> Result<()> {
        print_json(&self.service.list_products(filter).await?)
    }

    pub async fn show_product(&self, id: Uuid) -> Result<()> {
        print_json(&self.service.get_product(id).await?)
    }

    pub async fn update_product(&self, id: Uuid, input: UpdateProduct) -> Result<()> {
        print_json(&self.service.update_product(id, input).await?)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        self.service.delete_product(id).await?;
        print_json(&json!({ "deleted": id }))
    }

    pub async fn inbound(&self, product_id: Uuid, quantity: i32, reason: Option<String>) -> Result<()> {
        let (product, movement) = self
            .service
            .register_inbound(product_id, quantity, self.actor()?, reason)
            .await?;
        print_json(&json!({ "product": product, "movement": movement }))
    }

    pub async fn outbound(
        &self,
        product_id: Uuid,
        quantity: i32,
        recipient: Option<String>,
        reason: Option<String>,
    ) -> Result<()> {
        let (product, movement) = self
            .service
            .register_outbound(product_id, quantity, self.actor()?, recipient, reason)
            .await?;
        print_json(&json!({ "product": product, "movement": movement }))
    }

    /// Streams the ledger so large histories never sit in memory at once
    pub async fn movements(&self, query: MovementQuery, page_size: u64) -> Result<()> {
        if let Some(product_id) = query.product_id {
            self.service.get_product(product_id).await?;
        }

        let mut stream = Box::pin(self.service.movement_stream(query, page_size));
        let mut printed = 0u64;
        while let Some(movement) = stream.try_next().await? {
            println!("{}", serde_json::to_string(&movement)?);
            printed += 1;
        }

        info!(count = printed, "Listed movements");
        Ok(())
    }

    pub async fn dashboard(&self) -> Result<()> {
        print_json(&self.service.dashboard_summary().await?)
    }

    pub async fn series(&self, product_id: Uuid) -> Result<()> {
        print_json(&self.service.outbound_chart(product_id).await?)
    }
}
