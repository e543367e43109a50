use chrono_tz::Tz;
use core_config::{ConfigError, FromEnv, env_parse};
use std::time::Duration;

/// Shortest lock wait a repository accepts; Postgres reads `lock_timeout = 0` as "wait forever"
pub const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// Tunables of the stock ledger
#[derive(Clone, Debug)]
pub struct InventoryConfig {
    /// Products with `stock <= low_stock_threshold` count as low on the dashboard
    pub low_stock_threshold: i32,

    /// How many of the latest movements the dashboard lists
    pub recent_movements: u64,

    /// Longest a stock mutation waits for the product row lock
    pub lock_timeout: Duration,

    /// Zone whose calendar days define "today" and every per-day report
    pub timezone: Tz,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 10,
            recent_movements: 5,
            lock_timeout: Duration::from_secs(5),
            timezone: chrono_tz::America::Lima,
        }
    }
}

/// Environment variables:
/// - `INVENTORY_LOW_STOCK_THRESHOLD` (default: 10)
/// - `INVENTORY_RECENT_MOVEMENTS` (default: 5)
/// - `INVENTORY_LOCK_TIMEOUT_MS` (default: 5000, must be at least 1)
/// - `INVENTORY_TIMEZONE` (default: America/Lima)
impl FromEnv for InventoryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let lock_timeout_ms: u64 = env_parse("INVENTORY_LOCK_TIMEOUT_MS", "5000")?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::ParseError {
                key: "INVENTORY_LOCK_TIMEOUT_MS".to_string(),
                details: "lock timeout must be at least 1ms".to_string(),
            });
        }

        Ok(Self {
            low_stock_threshold: env_parse("INVENTORY_LOW_STOCK_THRESHOLD", "10")?,
            recent_movements: env_parse("INVENTORY_RECENT_MOVEMENTS", "5")?,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            timezone: env_parse("INVENTORY_TIMEZONE", "America/Lima")?,
        })
    }
}
