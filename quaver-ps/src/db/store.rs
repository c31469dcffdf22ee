//! Track store: durable track metadata, liked flags, playlist ordering
//!
//! Owns the connection pool; nothing else writes the track relations. All
//! multi-statement work runs in explicit transactions that commit only on
//! full success, so a failed call leaves the prior durable state intact.

use crate::db::schema;
use crate::error::Result;
use quaver_common::db as dbutil;
use quaver_common::Track;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

const TRACK_COLUMNS: &str = "t.id, t.name, t.author, t.url, t.cover_url, t.lyric_url, \
     t.duration_ms, t.file_size, t.created_at, COALESCE(l.liked, 0) AS liked";

/// Durable storage for the playback session
pub struct TrackStore {
    pool: Pool<Sqlite>,
}

impl TrackStore {
    /// Wrap an already-initialized pool; the schema must have been ensured.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Ensure the schema, then wrap the pool.
    pub async fn open(pool: Pool<Sqlite>) -> Result<Self> {
        schema::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Insert a track or update its mutable metadata, keyed by content URL.
    ///
    /// Returns the row id either way, so callers can adopt store identity
    /// for catalog-fresh tracks. Idempotent.
    pub async fn upsert_track(&self, track: &Track) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tracks (name, author, url, cover_url, lyric_url, duration_ms, file_size)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                author = excluded.author,
                cover_url = excluded.cover_url,
                lyric_url = excluded.lyric_url,
                duration_ms = excluded.duration_ms,
                file_size = excluded.file_size
            RETURNING id
            "#,
        )
        .bind(&track.name)
        .bind(&track.author)
        .bind(&track.url)
        .bind(&track.cover_url)
        .bind(&track.lyric_url)
        .bind(track.duration_ms as i64)
        .bind(track.file_size as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Fetch a track by id, liked flag joined in
    pub async fn get_track(&self, id: i64) -> Result<Option<Track>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tracks t LEFT JOIN liked l ON l.track_id = t.id WHERE t.id = ?",
            TRACK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_track(&r)))
    }

    /// Set the liked flag for a track
    ///
    /// Updates the existing row when present, inserts otherwise, and
    /// timestamps the change.
    pub async fn set_liked(&self, track_id: i64, liked: bool) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE liked SET liked = ?, updated_at = strftime('%s','now') WHERE track_id = ?",
        )
        .bind(liked as i64)
        .bind(track_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO liked (track_id, liked) VALUES (?, ?)")
                .bind(track_id)
                .bind(liked as i64)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Liked flag for a track, false when never marked
    pub async fn is_liked(&self, track_id: i64) -> Result<bool> {
        let liked: Option<i64> = sqlx::query_scalar("SELECT liked FROM liked WHERE track_id = ?")
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(liked.unwrap_or(0) != 0)
    }

    /// Replace the persisted playlist ordering atomically
    ///
    /// One transaction: clear all ordering rows, upsert each track, insert
    /// its `(track_id, seq)` row. Returns the ordered ids so the in-memory
    /// playlist can learn store identity.
    pub async fn save_playlist(&self, tracks: &[Track]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM playlist").execute(&mut *tx).await?;

        let mut ids = Vec::with_capacity(tracks.len());
        for (seq, track) in tracks.iter().enumerate() {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO tracks (name, author, url, cover_url, lyric_url, duration_ms, file_size)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    name = excluded.name,
                    author = excluded.author,
                    cover_url = excluded.cover_url,
                    lyric_url = excluded.lyric_url,
                    duration_ms = excluded.duration_ms,
                    file_size = excluded.file_size
                RETURNING id
                "#,
            )
            .bind(&track.name)
            .bind(&track.author)
            .bind(&track.url)
            .bind(&track.cover_url)
            .bind(&track.lyric_url)
            .bind(track.duration_ms as i64)
            .bind(track.file_size as i64)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO playlist (track_id, seq) VALUES (?, ?)")
                .bind(id)
                .bind(seq as i64)
                .execute(&mut *tx)
                .await?;

            ids.push(id);
        }

        tx.commit().await?;
        debug!("Persisted playlist of {} tracks", ids.len());
        Ok(ids)
    }

    /// Load the persisted playlist in sequence order
    pub async fn load_playlist(&self) -> Result<Vec<Track>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM playlist p \
             JOIN tracks t ON t.id = p.track_id \
             LEFT JOIN liked l ON l.track_id = t.id \
             ORDER BY p.seq ASC",
            TRACK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_track).collect())
    }

    /// Delete a track, cascading to liked and playlist rows
    ///
    /// Returns true iff a track row was actually deleted. The playlist
    /// sequence is renumbered contiguous afterwards, in the same
    /// transaction.
    pub async fn delete_track(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = result.rows_affected() > 0;

        if deleted {
            // Close the gaps the cascade left in the ordering. Ascending
            // order keeps the (track_id, seq) pairs unique at every step.
            let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM playlist ORDER BY seq ASC")
                .fetch_all(&mut *tx)
                .await?;
            for (seq, (row_id,)) in rows.iter().enumerate() {
                sqlx::query("UPDATE playlist SET seq = ? WHERE id = ?")
                    .bind(seq as i64)
                    .bind(row_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(deleted)
    }

    /// Case-insensitive substring search over name and author
    pub async fn search(&self, keyword: &str) -> Result<Vec<Track>> {
        let escaped = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let rows = sqlx::query(&format!(
            "SELECT {} FROM tracks t LEFT JOIN liked l ON l.track_id = t.id \
             WHERE t.name LIKE ? ESCAPE '\\' OR t.author LIKE ? ESCAPE '\\' \
             ORDER BY t.name ASC",
            TRACK_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_track).collect())
    }

    /// PRAGMA integrity_check, true when the file is healthy
    pub async fn integrity_check(&self) -> Result<bool> {
        Ok(dbutil::integrity_ok(&self.pool).await?)
    }

    /// Recreate required relations that have gone missing
    pub async fn repair_missing_tables(&self) -> Result<Vec<String>> {
        schema::repair_missing_tables(&self.pool).await
    }
}

fn row_to_track(row: &SqliteRow) -> Track {
    Track {
        id: Some(row.get("id")),
        name: row.get("name"),
        author: row.get("author"),
        url: row.get("url"),
        cover_url: row.get("cover_url"),
        lyric_url: row.get("lyric_url"),
        duration_ms: row.get::<Option<i64>, _>("duration_ms").unwrap_or(0) as u64,
        file_size: row.get::<Option<i64>, _>("file_size").unwrap_or(0) as u64,
        play_count: 0,
        liked: row.get::<i64, _>("liked") != 0,
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> TrackStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        TrackStore::open(pool).await.unwrap()
    }

    fn track(name: &str, author: &str, url: &str) -> Track {
        Track::new(name, author, url)
    }

    #[tokio::test]
    async fn upsert_assigns_id_and_is_idempotent() {
        let store = setup_store().await;
        let t = track("Song", "Artist", "https://cdn.example/song.mp3");

        let id1 = store.upsert_track(&t).await.unwrap();
        let id2 = store.upsert_track(&t).await.unwrap();
        assert_eq!(id1, id2);

        // Metadata updates land on the same row
        let mut renamed = t.clone();
        renamed.name = "Song (Remaster)".to_string();
        renamed.duration_ms = 215_000;
        let id3 = store.upsert_track(&renamed).await.unwrap();
        assert_eq!(id1, id3);

        let stored = store.get_track(id1).await.unwrap().unwrap();
        assert_eq!(stored.name, "Song (Remaster)");
        assert_eq!(stored.duration_ms, 215_000);
        assert!(stored.created_at.is_some());
    }

    #[tokio::test]
    async fn liked_update_then_insert() {
        let store = setup_store().await;
        let id = store
            .upsert_track(&track("Song", "Artist", "https://cdn.example/song.mp3"))
            .await
            .unwrap();

        assert!(!store.is_liked(id).await.unwrap());

        // First call takes the INSERT path, second the UPDATE path
        store.set_liked(id, true).await.unwrap();
        assert!(store.is_liked(id).await.unwrap());

        store.set_liked(id, false).await.unwrap();
        assert!(!store.is_liked(id).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM liked")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn playlist_round_trips_order_and_liked_flags() {
        let store = setup_store().await;
        let tracks = vec![
            track("C side", "Artist", "https://cdn.example/c.mp3"),
            track("A side", "Artist", "https://cdn.example/a.mp3"),
            track("B side", "Artist", "https://cdn.example/b.mp3"),
        ];

        let ids = store.save_playlist(&tracks).await.unwrap();
        assert_eq!(ids.len(), 3);
        store.set_liked(ids[1], true).await.unwrap();

        let loaded = store.load_playlist().await.unwrap();
        let names: Vec<&str> = loaded.iter().map(|t| t.name.as_str()).collect();
        // Insertion order, not alphabetical
        assert_eq!(names, vec!["C side", "A side", "B side"]);
        assert!(!loaded[0].liked);
        assert!(loaded[1].liked);
        assert_eq!(loaded[1].id, Some(ids[1]));
    }

    #[tokio::test]
    async fn save_playlist_replaces_previous_ordering() {
        let store = setup_store().await;
        let first = vec![
            track("One", "Artist", "https://cdn.example/1.mp3"),
            track("Two", "Artist", "https://cdn.example/2.mp3"),
        ];
        store.save_playlist(&first).await.unwrap();

        let second = vec![track("Three", "Artist", "https://cdn.example/3.mp3")];
        store.save_playlist(&second).await.unwrap();

        let loaded = store.load_playlist().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Three");

        // Replaced tracks stay in the library, only the ordering is gone
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn delete_cascades_and_renumbers() {
        let store = setup_store().await;
        let tracks = vec![
            track("A", "Artist", "https://cdn.example/a.mp3"),
            track("B", "Artist", "https://cdn.example/b.mp3"),
            track("C", "Artist", "https://cdn.example/c.mp3"),
        ];
        let ids = store.save_playlist(&tracks).await.unwrap();
        store.set_liked(ids[1], true).await.unwrap();

        assert!(store.delete_track(ids[1]).await.unwrap());
        // Second delete finds nothing
        assert!(!store.delete_track(ids[1]).await.unwrap());

        assert_eq!(store.get_track(ids[1]).await.unwrap(), None);
        let liked_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM liked")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(liked_rows, 0);

        // Ordering renumbered contiguous from zero
        let seqs: Vec<(i64,)> = sqlx::query_as("SELECT seq FROM playlist ORDER BY seq ASC")
            .fetch_all(&store.pool)
            .await
            .unwrap();
        assert_eq!(seqs, vec![(0,), (1,)]);

        let loaded = store.load_playlist().await.unwrap();
        let names: Vec<&str> = loaded.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_escapes_wildcards() {
        let store = setup_store().await;
        store
            .upsert_track(&track("Night Drive", "Neon Artist", "https://cdn.example/nd.mp3"))
            .await
            .unwrap();
        store
            .upsert_track(&track("Morning 100% Mix", "Other", "https://cdn.example/mm.mp3"))
            .await
            .unwrap();

        let by_name = store.search("night").await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Night Drive");

        let by_author = store.search("NEON").await.unwrap();
        assert_eq!(by_author.len(), 1);

        // A literal percent must not act as a wildcard
        let literal = store.search("100%").await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].name, "Morning 100% Mix");

        let nothing = store.search("zzz").await.unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn integrity_and_repair() {
        let store = setup_store().await;
        assert!(store.integrity_check().await.unwrap());

        sqlx::query("DROP TABLE liked")
            .execute(&store.pool)
            .await
            .unwrap();
        let repaired = store.repair_missing_tables().await.unwrap();
        assert_eq!(repaired, vec!["liked".to_string()]);

        // No-op when everything is present
        assert!(store.repair_missing_tables().await.unwrap().is_empty());
    }
}
