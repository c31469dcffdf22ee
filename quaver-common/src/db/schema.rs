//! Schema introspection and maintenance primitives

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Check if a table exists in the database
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name = ?
        )
        "#,
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Column names of a table in database order
///
/// Empty for a nonexistent table (PRAGMA table_info returns no rows).
pub async fn column_names(pool: &SqlitePool, table_name: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info({})", table_name);
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    let mut columns: Vec<(i32, String)> = rows
        .iter()
        .map(|row| (row.get("cid"), row.get("name")))
        .collect();
    columns.sort_by_key(|(cid, _)| *cid);

    Ok(columns.into_iter().map(|(_, name)| name).collect())
}

/// Check if a column exists on a table
pub async fn column_exists(pool: &SqlitePool, table_name: &str, column_name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?",
        table_name
    ))
    .bind(column_name)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Append a column via ALTER TABLE, tolerating a concurrent addition
///
/// `decl` is the type plus any inline constraints SQLite accepts in ADD
/// COLUMN (e.g. `"TEXT"`, `"INTEGER DEFAULT 0"`). Returns true when this
/// call added the column, false when it already existed.
pub async fn add_column(
    pool: &SqlitePool,
    table_name: &str,
    column_name: &str,
    decl: &str,
) -> Result<bool> {
    if column_exists(pool, table_name, column_name).await? {
        return Ok(false);
    }

    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table_name, column_name, decl
    );

    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => {
            info!("Added column {}.{} ({})", table_name, column_name, decl);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            // Another connection beat us to it
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Run PRAGMA integrity_check and report whether the file is healthy
pub async fn integrity_ok(pool: &SqlitePool) -> Result<bool> {
    let result: String = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_one(pool)
        .await?;

    Ok(result == "ok")
}

/// Current schema version, 0 when untracked
///
/// Returns 0 if the schema_version table doesn't exist or has no rows.
pub async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Record that a schema version has been reached
///
/// Creates the tracking table on first use; versions accumulate so the
/// ladder of applied upgrades stays visible.
pub async fn record_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}
