//! Database plumbing for the almacen workspace
//!
//! PostgreSQL is the only store: the product registry and the stock
//! movement ledger live in the same database so that a stock mutation and
//! its ledger row commit in one transaction.
//!
//! # Features
//!
//! - `config` - `core_config::FromEnv` for [`postgres::PostgresConfig`]
//!
//! # Example
//!
//! ```ignore
//! use database::postgres;
//! use migration::Migrator;
//!
//! let db = postgres::connect_from_config_with_retry(config, None).await?;
//! postgres::run_migrations::<Migrator>(&db, "almacen").await?;
//! ```

pub mod common;
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult, RetryConfig};
