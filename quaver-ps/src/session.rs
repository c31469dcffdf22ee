//! The playback session: one object owning every coordinator component
//!
//! Constructed explicitly (in `main` or a test) and shared behind `Arc`;
//! there is no process-global instance. The session wires the track store,
//! playlist manager, shared state, and playback engine together, restores
//! the persisted playlist, and starts the engine's background tasks.

use crate::catalog::CatalogClient;
use crate::config::RuntimeSettings;
use crate::db::TrackStore;
use crate::error::{Error, Result};
use crate::playback::sink::{AudioSink, SilenceSink, SinkEvent};
use crate::playback::PlaybackEngine;
use crate::playlist::PlaylistManager;
use crate::state::SharedState;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub struct Session {
    store: Arc<TrackStore>,
    playlist: Arc<PlaylistManager>,
    engine: Arc<PlaybackEngine>,
    state: Arc<SharedState>,
    runtime: RuntimeSettings,
}

impl Session {
    /// Assemble a session over an already-migrated pool, using the built-in
    /// silence sink.
    pub async fn new(pool: Pool<Sqlite>, runtime: RuntimeSettings) -> Result<Arc<Self>> {
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn AudioSink> = Arc::new(SilenceSink::new(sink_tx));
        Self::with_sink(pool, sink, sink_rx, runtime).await
    }

    /// Assemble a session around a caller-supplied sink. Tests use this to
    /// script sink behavior.
    pub async fn with_sink(
        pool: Pool<Sqlite>,
        sink: Arc<dyn AudioSink>,
        sink_events: mpsc::UnboundedReceiver<SinkEvent>,
        runtime: RuntimeSettings,
    ) -> Result<Arc<Self>> {
        let store = Arc::new(TrackStore::new(pool));
        let state = Arc::new(SharedState::new());
        let playlist = Arc::new(PlaylistManager::new(store.clone(), state.clone()));
        playlist.load().await?;
        info!("Restored playlist: {} tracks", playlist.len().await);

        let engine = Arc::new(PlaybackEngine::new(sink, playlist.clone(), state.clone()));
        engine.start(sink_events, runtime.progress_interval());

        Ok(Arc::new(Self {
            store,
            playlist,
            engine,
            state,
            runtime,
        }))
    }

    pub fn store(&self) -> &Arc<TrackStore> {
        &self.store
    }

    pub fn playlist(&self) -> &Arc<PlaylistManager> {
        &self.playlist
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Build a catalog client from the configured endpoint.
    pub fn catalog_client(&self, page_size_override: Option<u32>) -> Result<CatalogClient> {
        let base = self
            .runtime
            .catalog_base_url
            .as_deref()
            .ok_or_else(|| Error::Config("no catalog base URL configured".to_string()))?;
        let page_size = page_size_override.unwrap_or(self.runtime.catalog_page_size);
        CatalogClient::new(base, page_size)
    }

    /// Stop the engine's background tasks and release the sink.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use quaver_common::Track;
    use sqlx::sqlite::SqlitePoolOptions;

    fn runtime() -> RuntimeSettings {
        RuntimeSettings {
            catalog_base_url: None,
            catalog_page_size: 10,
            progress_interval_ms: 1000,
        }
    }

    #[tokio::test]
    async fn session_restores_the_persisted_playlist() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();

        // Persist an ordering, then boot a session over the same pool
        let seed = TrackStore::new(pool.clone());
        seed.save_playlist(&[
            Track::new("A", "Artist", "https://cdn.example/a.mp3"),
            Track::new("B", "Artist", "https://cdn.example/b.mp3"),
        ])
        .await
        .unwrap();

        let session = Session::new(pool, runtime()).await.unwrap();
        let (tracks, position) = session.playlist().snapshot().await;
        assert_eq!(tracks.len(), 2);
        assert_eq!(position, 0);
        assert_eq!(tracks[0].name, "A");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn catalog_client_requires_a_configured_endpoint() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ensure_schema(&pool).await.unwrap();

        let session = Session::new(pool, runtime()).await.unwrap();
        assert!(session.catalog_client(None).is_err());

        session.shutdown().await;
    }
}
