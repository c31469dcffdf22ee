//! Settings table access
//!
//! Typed read/write helpers over the key-value settings table.
//! Settings are daemon-wide; there is no per-user scoping.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Get progress event interval in milliseconds
///
/// Writes the default back to the database when the key is missing, so the
/// settings table always shows the effective configuration.
pub async fn get_progress_interval_ms(db: &Pool<Sqlite>) -> Result<u32> {
    match get_setting::<u32>(db, "progress_interval_ms").await? {
        // Clamp to a sane tick range
        Some(interval) => Ok(interval.clamp(100, 10_000)),
        None => {
            set_setting(db, "progress_interval_ms", 1000).await?;
            Ok(1000)
        }
    }
}

/// Get catalog page size for home-page fetches
pub async fn get_catalog_page_size(db: &Pool<Sqlite>) -> Result<u32> {
    match get_setting::<u32>(db, "catalog_page_size").await? {
        Some(size) => Ok(size.clamp(1, 100)),
        None => {
            set_setting(db, "catalog_page_size", 10).await?;
            Ok(10)
        }
    }
}

/// Get the catalog base URL, None when not configured
pub async fn get_catalog_base_url(db: &Pool<Sqlite>) -> Result<Option<String>> {
    let url = get_setting::<String>(db, "catalog_base_url").await?;
    Ok(url.filter(|u| !u.is_empty()))
}

/// Set the catalog base URL
pub async fn set_catalog_base_url(db: &Pool<Sqlite>, url: &str) -> Result<()> {
    set_setting(db, "catalog_base_url", url.trim_end_matches('/').to_string()).await
}

/// Typed setting getter
///
/// Absent keys come back as None. A stored value that fails to parse
/// surfaces as a config error rather than a silent default.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Typed setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}

/// Seed a setting only when absent, preserving any operator-set value
pub async fn set_if_missing<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value.to_string())
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}
