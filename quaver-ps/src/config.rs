//! Configuration management for the playback session daemon
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, port, initial catalog endpoint
//!    (static, read once at startup)
//! 2. **Database runtime**: runtime settings from the `settings` table,
//!    initialized with built-in defaults that are written back so the
//!    table always shows the effective values
//!
//! Priority: command-line arguments, then environment variables, then the
//! TOML file, then the settings table, then built-in defaults.

use crate::db::{schema, settings};
use crate::error::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The daemon must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Catalog endpoint seed
    ///
    /// Written to the settings table on first boot; thereafter the table
    /// owns the value.
    #[serde(default)]
    pub catalog_base_url: Option<String>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            catalog_base_url: None,
        }
    }
}

fn default_port() -> u16 {
    5750
}

fn default_database_path() -> PathBuf {
    quaver_common::config::default_data_folder().join("quaver.db")
}

/// Runtime settings loaded from database
///
/// All values have built-in defaults. Missing database values are
/// initialized with defaults and written back for consistency.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Catalog endpoint, None when no catalog is configured
    pub catalog_base_url: Option<String>,
    /// Tracks per catalog home-page request
    pub catalog_page_size: u32,
    /// Progress event cadence while playing
    pub progress_interval_ms: u32,
}

impl RuntimeSettings {
    /// Load runtime settings from database, writing back defaults
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let loaded = Self {
            catalog_base_url: settings::get_catalog_base_url(pool).await?,
            catalog_page_size: settings::get_catalog_page_size(pool).await?,
            progress_interval_ms: settings::get_progress_interval_ms(pool).await?,
        };

        info!("Loaded runtime settings from database");
        Ok(loaded)
    }

    /// Progress event cadence as a Duration
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms as u64)
    }
}

/// Complete daemon configuration
///
/// Combines bootstrap (TOML) and runtime (database) configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file path
    pub database_path: PathBuf,

    /// HTTP server port
    pub port: u16,

    /// Database connection pool
    pub db_pool: SqlitePool,

    /// Runtime settings from database
    pub runtime: RuntimeSettings,
}

impl Config {
    /// Load complete configuration from TOML and database
    ///
    /// `toml_path` of None runs on built-in defaults (fresh install with
    /// no config file). Ensures the schema before reading runtime
    /// settings, so a fresh database file works end to end.
    pub async fn load(toml_path: Option<&Path>, cli_overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => {
                let toml_str = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                let parsed: TomlConfig = toml::from_str(&toml_str)
                    .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
                info!("Loaded TOML configuration from {:?}", path);
                parsed
            }
            None => {
                info!("No config file, using built-in defaults");
                TomlConfig::default()
            }
        };

        // Apply CLI overrides
        let database_path = cli_overrides
            .database_path
            .unwrap_or(toml_config.database_path);
        let port = cli_overrides.port.unwrap_or(toml_config.port);

        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Connect to database
        let db_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let db_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(60)))
            .connect(&db_url)
            .await?;

        info!("Connected to database: {:?}", database_path);

        schema::ensure_schema(&db_pool).await?;

        if let Some(url) = &toml_config.catalog_base_url {
            if settings::set_if_missing(&db_pool, "catalog_base_url", url).await? {
                info!("Seeded catalog endpoint from TOML: {}", url);
            }
        }

        let runtime = RuntimeSettings::load(&db_pool).await?;

        Ok(Config {
            database_path,
            port,
            db_pool,
            runtime,
        })
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
}
