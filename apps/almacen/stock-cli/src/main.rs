//! Almacen stock CLI
//!
//! Operates the warehouse stock ledger: categories and products, inbound and
//! outbound movements, movement history, the dashboard and the daily outbound
//! series. Output is JSON on stdout; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_inventory::{MovementKind, ProductOrdering, ProductStatus, UnitOfMeasure};
use eyre::Result;
use tracing::info;
use uuid::Uuid;

mod commands;
mod config;

use commands::Ledger;
use config::Config;

#[derive(Parser)]
#[command(name = "almacen-stock")]
#[command(about = "Warehouse stock ledger")]
struct Cli {
    /// Id of the user credited with movements (overrides ALMACEN_ACTOR_ID)
    #[arg(long, global = true, requires = "actor")]
    actor_id: Option<Uuid>,

    /// Username credited with movements (overrides ALMACEN_ACTOR_NAME)
    #[arg(long, global = true, requires = "actor_id")]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Report database reachability and latency
    Health,

    /// Manage product categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),

    /// Receive stock into the warehouse
    Inbound {
        product_id: Uuid,
        quantity: i32,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Hand stock out of the warehouse
    Outbound {
        product_id: Uuid,
        quantity: i32,
        /// Who received the goods
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Print movements newest first, one JSON object per line
    Movements(MovementArgs),

    /// Product counts and the latest movements
    Dashboard,

    /// Outbound quantity per day for a product
    Series { product_id: Uuid },
}

#[derive(Subcommand)]
enum CategoryCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum ProductCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: Uuid,
        /// unit, kg or pair
        #[arg(long, default_value = "unit")]
        unit: UnitOfMeasure,
        #[arg(long, default_value_t = 0)]
        stock: i32,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        /// Case-insensitive fragment of the name or description
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<Uuid>,
        /// available or unavailable
        #[arg(long)]
        status: Option<ProductStatus>,
        /// name, stock, stock_desc, created_at or created_at_desc
        #[arg(long, default_value = "name")]
        ordering: ProductOrdering,
        #[arg(long, default_value_t = 50)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    Show {
        id: Uuid,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the current description
        #[arg(long)]
        clear_description: bool,
        #[arg(long)]
        category: Option<Uuid>,
        #[arg(long)]
        unit: Option<UnitOfMeasure>,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Args)]
struct MovementArgs {
    #[arg(long)]
    product: Option<Uuid>,
    /// Only movements on this day (YYYY-MM-DD) in INVENTORY_TIMEZONE
    #[arg(long)]
    date: Option<chrono::NaiveDate>,
    /// inbound or outbound
    #[arg(long)]
    kind: Option<MovementKind>,
    #[arg(long)]
    limit: Option<u64>,
    /// Rows fetched per database round trip
    #[arg(long, default_value_t = 100)]
    page_size: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    info!("Connecting to database...");
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;

    let actor = match (cli.actor_id, cli.actor) {
        (Some(id), Some(username)) => Some(domain_inventory::Actor::new(id, username)),
        _ => config.actor.clone(),
    };
    let ledger = Ledger::new(db, config.inventory.clone(), actor);

    match cli.command {
        Commands::Migrate => ledger.migrate().await?,
        Commands::Health => ledger.health().await?,

        Commands::Category(CategoryCommand::Add { name, description }) => {
            ledger.add_category(name, description).await?
        }
        Commands::Category(CategoryCommand::List) => ledger.list_categories().await?,
        Commands::Category(CategoryCommand::Delete { id }) => ledger.delete_category(id).await?,

        Commands::Product(ProductCommand::Add {
            name,
            category,
            unit,
            stock,
            description,
        }) => {
            ledger
                .add_product(name, category, unit, stock, description)
                .await?
        }
        Commands::Product(ProductCommand::List {
            search,
            category,
            status,
            ordering,
            limit,
            offset,
        }) => {
            ledger
                .list_products(domain_inventory::ProductFilter {
                    search,
                    category_id: category,
                    status,
                    ordering,
                    limit,
                    offset,
                })
                .await?
        }
        Commands::Product(ProductCommand::Show { id }) => ledger.show_product(id).await?,
        Commands::Product(ProductCommand::Update {
            id,
            name,
            description,
            clear_description,
            category,
            unit,
        }) => {
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            ledger
                .update_product(
                    id,
                    domain_inventory::UpdateProduct {
                        name,
                        description,
                        category_id: category,
                        unit,
                    },
                )
                .await?
        }
        Commands::Product(ProductCommand::Delete { id }) => ledger.delete_product(id).await?,

        Commands::Inbound {
            product_id,
            quantity,
            reason,
        } => ledger.inbound(product_id, quantity, reason).await?,
        Commands::Outbound {
            product_id,
            quantity,
            recipient,
            reason,
        } => {
            ledger
                .outbound(product_id, quantity, recipient, reason)
                .await?
        }

        Commands::Movements(args) => {
            let timezone = config.inventory.timezone;
            ledger
                .movements(
                    domain_inventory::MovementQuery {
                        product_id: args.product,
                        kind: args.kind,
                        range: args
                            .date
                            .map(|date| domain_inventory::DateRange::day(date, &timezone))
                            .unwrap_or_default(),
                        limit: args.limit,
                        offset: 0,
                    },
                    args.page_size,
                )
                .await?
        }
        Commands::Dashboard => ledger.dashboard().await?,
        Commands::Series { product_id } => ledger.series(product_id).await?,
    }

    Ok(())
}
