//! # Engine Configuration
//!
//! Settings for the database, the reservation ledger and the waste sweeper.
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! 1. Defaults
//! 2. engine.toml in the platform config dir (or an explicit path)
//! 3. MISE_* environment variables
//! 4. validate()
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use mise_core::DEFAULT_WASTE_EXPIRY_HOURS;
use mise_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `mise.db` in the platform data dir.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for SQLite's write lock (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "mise", "pos")
        .map(|dirs| dirs.data_dir().join("mise.db"))
        .unwrap_or_else(|| PathBuf::from("mise.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Ledger Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Upper bound on one ledger call, lock wait included (milliseconds).
    /// Exceeding it rolls the call back and returns `LedgerTimeout`.
    #[serde(default = "default_ledger_timeout")]
    pub timeout_ms: u64,
}

fn default_ledger_timeout() -> u64 {
    5_000
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            timeout_ms: default_ledger_timeout(),
        }
    }
}

// =============================================================================
// Waste Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteSettings {
    /// Pending decisions older than this resolve as waste.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,

    /// Interval between sweeps (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum rows resolved per sweep.
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: i64,
}

fn default_expiry_hours() -> i64 {
    DEFAULT_WASTE_EXPIRY_HOURS
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_sweep_batch() -> i64 {
    200
}

impl Default for WasteSettings {
    fn default() -> Self {
        WasteSettings {
            expiry_hours: default_expiry_hours(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [database]
/// path = "/var/lib/mise/mise.db"
/// max_connections = 5
///
/// [ledger]
/// timeout_ms = 5000
///
/// [waste]
/// expiry_hours = 24
/// sweep_interval_secs = 300
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub waste: WasteSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.ledger.timeout_ms == 0 {
            return Err(EngineError::Config(
                "ledger.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.waste.expiry_hours <= 0 {
            return Err(EngineError::Config(
                "waste.expiry_hours must be greater than 0".into(),
            ));
        }

        if self.waste.sweep_interval_secs == 0 || self.waste.sweep_batch_size <= 0 {
            return Err(EngineError::Config(
                "waste sweep interval and batch size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MISE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("MISE_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MISE_MAX_CONNECTIONS"),
            }
        }

        if let Ok(value) = std::env::var("MISE_LEDGER_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.ledger.timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid MISE_LEDGER_TIMEOUT_MS"),
            }
        }

        if let Ok(value) = std::env::var("MISE_WASTE_EXPIRY_HOURS") {
            match value.parse::<i64>() {
                Ok(h) => self.waste.expiry_hours = h,
                Err(_) => warn!(value = %value, "Ignoring invalid MISE_WASTE_EXPIRY_HOURS"),
            }
        }

        if let Ok(value) = std::env::var("MISE_SWEEP_INTERVAL_SECS") {
            match value.parse::<u64>() {
                Ok(s) => self.waste.sweep_interval_secs = s,
                Err(_) => warn!(value = %value, "Ignoring invalid MISE_SWEEP_INTERVAL_SECS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mise", "pos")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.timeout_ms)
    }

    pub fn waste_expiry(&self) -> chrono::Duration {
        chrono::Duration::hours(self.waste.expiry_hours)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.waste.sweep_interval_secs)
    }

    /// Pool settings for [`mise_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.ledger.timeout_ms, 5_000);
        assert_eq!(config.waste.expiry_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.ledger.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.waste.expiry_hours = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [ledger]
            timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger_timeout(), Duration::from_millis(250));
        assert_eq!(config.waste.expiry_hours, 24);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let path = std::env::temp_dir().join(format!("mise-engine-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[waste]\nexpiry_hours = 48\n").unwrap();

        let config = EngineConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.waste_expiry(), chrono::Duration::hours(48));

        std::fs::remove_file(path).unwrap();
    }
}
