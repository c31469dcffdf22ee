//! Database schema: DDL, versioned migration, self-healing
//!
//! Three-phase open sequence, run by [`ensure_schema`]:
//! 1. CREATE TABLE IF NOT EXISTS for every relation and index
//! 2. Versioned migrations (with a drop-and-rebuild fallback when an
//!    upgrade step errors, which loses data and is logged accordingly)
//! 3. Missing-table repair plus an integrity check
//!
//! Migration guidelines: never modify an existing migration, always add a
//! new one, prefer ALTER TABLE over DROP/CREATE to preserve data.

use crate::error::Result;
use quaver_common::db as dbutil;
use sqlx::{Pool, Sqlite};
use tracing::{debug, error, info, warn};

/// Current schema version
///
/// Increment when adding a new migration.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Relations that must exist for the session to operate
pub const REQUIRED_TABLES: &[&str] = &["tracks", "liked", "playlist", "settings"];

fn table_ddl(table: &str) -> Option<&'static str> {
    match table {
        "tracks" => Some(
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                author TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                cover_url TEXT,
                lyric_url TEXT,
                duration_ms INTEGER DEFAULT 0,
                file_size INTEGER DEFAULT 0,
                created_at INTEGER DEFAULT (strftime('%s','now'))
            )
            "#,
        ),
        "liked" => Some(
            r#"
            CREATE TABLE IF NOT EXISTS liked (
                track_id INTEGER PRIMARY KEY,
                liked INTEGER NOT NULL DEFAULT 0 CHECK (liked IN (0, 1)),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
                FOREIGN KEY (track_id) REFERENCES tracks(id) ON DELETE CASCADE
            )
            "#,
        ),
        "playlist" => Some(
            r#"
            CREATE TABLE IF NOT EXISTS playlist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                added_at INTEGER NOT NULL DEFAULT (strftime('%s','now')),
                UNIQUE (track_id, seq),
                FOREIGN KEY (track_id) REFERENCES tracks(id) ON DELETE CASCADE
            )
            "#,
        ),
        "settings" => Some(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        ),
        _ => None,
    }
}

fn index_ddl(table: &str) -> &'static [&'static str] {
    match table {
        "tracks" => &[
            "CREATE INDEX IF NOT EXISTS idx_tracks_name ON tracks(name)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_author ON tracks(author)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_url ON tracks(url)",
        ],
        "liked" => &["CREATE INDEX IF NOT EXISTS idx_liked_updated_at ON liked(updated_at)"],
        "playlist" => &["CREATE INDEX IF NOT EXISTS idx_playlist_seq ON playlist(seq)"],
        _ => &[],
    }
}

/// Bring the database to the current schema
///
/// Safe to call on every open: creates what is missing, upgrades what is
/// old, repairs what was dropped, and verifies file integrity. A failed
/// upgrade or a failed integrity check falls back to a full rebuild.
pub async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<()> {
    create_all(pool).await?;

    if let Err(e) = run_migrations(pool).await {
        error!("Schema upgrade failed ({}), rebuilding from scratch", e);
        rebuild_schema(pool).await?;
    }

    let repaired = repair_missing_tables(pool).await?;
    if !repaired.is_empty() {
        warn!("Recreated missing tables: {:?}", repaired);
    }

    if !dbutil::integrity_ok(pool).await? {
        error!("Database failed integrity check, rebuilding (existing data is lost)");
        rebuild_schema(pool).await?;
    }

    Ok(())
}

/// Create every table and index that does not yet exist
async fn create_all(pool: &Pool<Sqlite>) -> Result<()> {
    for table in REQUIRED_TABLES {
        if let Some(ddl) = table_ddl(table) {
            sqlx::query(ddl).execute(pool).await?;
        }
        for index in index_ddl(table) {
            sqlx::query(index).execute(pool).await?;
        }
    }
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    let current = dbutil::schema_version(pool).await?;

    if current == CURRENT_SCHEMA_VERSION {
        debug!("Database schema is up to date (v{})", current);
        return Ok(());
    }

    if current > CURRENT_SCHEMA_VERSION {
        // Likely an older binary against a newer database. Leave the
        // schema alone and hope the shapes are compatible.
        warn!(
            "Database schema version ({}) is newer than code version ({}), leaving schema untouched",
            current, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current, CURRENT_SCHEMA_VERSION
    );

    if current < 1 {
        // v1 is the original schema; a fresh database is created at the
        // current shape, so there is nothing to do beyond recording it.
        dbutil::record_schema_version(pool, 1).await?;
    }

    if current < 2 {
        migrate_v2(pool).await?;
        dbutil::record_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v2: track metadata columns and the liked relation
///
/// The original track table carried only name, author and url. v2 appends
/// the catalog metadata columns and introduces the liked table. Column
/// additions go through the tolerant helper so a concurrent open cannot
/// fail the upgrade.
async fn migrate_v2(pool: &Pool<Sqlite>) -> Result<()> {
    // ALTER TABLE ADD COLUMN only accepts constant defaults, so created_at
    // stays NULL for pre-v2 rows.
    let columns: &[(&str, &str)] = &[
        ("cover_url", "TEXT"),
        ("lyric_url", "TEXT"),
        ("duration_ms", "INTEGER DEFAULT 0"),
        ("file_size", "INTEGER DEFAULT 0"),
        ("created_at", "INTEGER"),
    ];

    for (name, decl) in columns {
        dbutil::add_column(pool, "tracks", name, decl).await?;
    }

    if let Some(ddl) = table_ddl("liked") {
        sqlx::query(ddl).execute(pool).await?;
    }
    for table in REQUIRED_TABLES {
        for index in index_ddl(table) {
            sqlx::query(index).execute(pool).await?;
        }
    }

    Ok(())
}

/// Recreate any required table that has gone missing
///
/// Only the missing relations (and their indexes) are recreated, inside
/// one transaction; intact tables keep their data. Returns the names of
/// the recreated tables.
pub async fn repair_missing_tables(pool: &Pool<Sqlite>) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        if !dbutil::table_exists(pool, table).await? {
            missing.push(table.to_string());
        }
    }

    if missing.is_empty() {
        return Ok(missing);
    }

    warn!("Required tables missing: {:?}, recreating", missing);

    let mut tx = pool.begin().await?;
    for table in &missing {
        if let Some(ddl) = table_ddl(table) {
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
        for index in index_ddl(table) {
            sqlx::query(index).execute(&mut *tx).await?;
        }
    }
    tx.commit().await?;

    Ok(missing)
}

/// Drop everything and rebuild from the current definition
///
/// Last resort for a failed upgrade or a corrupt file. All session data
/// is lost.
pub async fn rebuild_schema(pool: &Pool<Sqlite>) -> Result<()> {
    error!("Rebuilding database schema, all stored session data is discarded");

    // Children before parents so foreign keys cannot block the drops
    for table in ["playlist", "liked", "tracks", "settings", "schema_version"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }

    create_all(pool).await?;
    dbutil::record_schema_version(pool, 1).await?;
    dbutil::record_schema_version(pool, CURRENT_SCHEMA_VERSION).await?;

    info!("Schema rebuilt at v{}", CURRENT_SCHEMA_VERSION);
    Ok(())
}
