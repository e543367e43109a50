//! Configuration for the stock CLI

use core_config::{ConfigError, FromEnv, env_or_default};
use database::postgres::PostgresConfig;
use domain_inventory::{Actor, InventoryConfig};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: PostgresConfig,
    pub inventory: InventoryConfig,
    /// Default actor credited with movements when none is passed on the command line
    pub actor: Option<Actor>,
}

/// - `DATABASE_URL` and the `DB_*` pool settings
/// - `INVENTORY_*` ledger settings
/// - `ALMACEN_ACTOR_ID` / `ALMACEN_ACTOR_NAME` (optional, set together)
impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: PostgresConfig::from_env()?,
            inventory: InventoryConfig::from_env()?,
            actor: actor_from_env()?,
        })
    }
}

fn actor_from_env() -> Result<Option<Actor>, ConfigError> {
    let id = env_or_default("ALMACEN_ACTOR_ID", "");
    let name = env_or_default("ALMACEN_ACTOR_NAME", "");

    match (id.is_empty(), name.is_empty()) {
        (true, true) => Ok(None),
        (false, false) => {
            let id = id.parse::<Uuid>().map_err(|e| ConfigError::ParseError {
                key: "ALMACEN_ACTOR_ID".to_string(),
                details: e.to_string(),
            })?;
            Ok(Some(Actor::new(id, name)))
        }
        (true, false) => Err(ConfigError::MissingEnvVar("ALMACEN_ACTOR_ID".to_string())),
        (false, true) => Err(ConfigError::MissingEnvVar("ALMACEN_ACTOR_NAME".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_is_optional() {
        temp_env::with_vars(
            [
                ("ALMACEN_ACTOR_ID", None::<&str>),
                ("ALMACEN_ACTOR_NAME", None::<&str>),
            ],
            || {
                assert!(actor_from_env().unwrap().is_none());
            },
        );
    }

    #[test]
    fn test_actor_from_env() {
        temp_env::with_vars(
            [
                (
                    "ALMACEN_ACTOR_ID",
                    Some("0190f2a0-7c4e-7d2a-9b1e-3f5a6c7d8e9f"),
                ),
                ("ALMACEN_ACTOR_NAME", Some("maria")),
            ],
            || {
                let actor = actor_from_env().unwrap().unwrap();
                assert_eq!(actor.username, "maria");
            },
        );
    }

    #[test]
    fn test_actor_needs_both_variables() {
        temp_env::with_vars(
            [
                ("ALMACEN_ACTOR_ID", None::<&str>),
                ("ALMACEN_ACTOR_NAME", Some("maria")),
            ],
            || {
                assert!(matches!(
                    actor_from_env(),
                    Err(ConfigError::MissingEnvVar(key)) if key == "ALMACEN_ACTOR_ID"
                ));
            },
        );
    }

    #[test]
    fn test_config_requires_database_url() {
        temp_env::with_var("DATABASE_URL", None::<&str>, || {
            assert!(Config::from_env().is_err());
        });
    }
}
