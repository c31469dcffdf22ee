//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::session::Session;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// Clone is cheap (one Arc); axum's blanket `FromRef` impl covers custom
/// extractors.
#[derive(Clone)]
pub struct AppContext {
    pub session: Arc<Session>,
}

/// Build the full router. Shared with the integration test server so tests
/// exercise the production routes.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Playback control
        .route("/playback/state", get(super::handlers::get_playback_state))
        .route("/playback/position", get(super::handlers::get_position))
        .route("/playback/play", post(super::handlers::play))
        .route("/playback/pause", post(super::handlers::pause))
        .route("/playback/stop", post(super::handlers::stop))
        .route("/playback/next", post(super::handlers::play_next))
        .route("/playback/previous", post(super::handlers::play_previous))
        .route("/playback/play_at", post(super::handlers::play_at))
        .route("/playback/seek", post(super::handlers::seek))
        .route("/playback/mode", get(super::handlers::get_play_mode))
        .route("/playback/mode", post(super::handlers::set_play_mode))
        // Playlist management
        .route("/playlist", get(super::handlers::get_playlist))
        .route("/playlist", put(super::handlers::replace_playlist))
        .route("/playlist/tracks", post(super::handlers::add_track))
        .route(
            "/playlist/tracks/:index",
            delete(super::handlers::remove_track_at),
        )
        .route("/playlist/play_now", post(super::handlers::play_now))
        .route("/playlist/position", post(super::handlers::set_position))
        .route("/playlist/clear", post(super::handlers::clear_playlist))
        // Track store
        .route("/tracks/search", get(super::handlers::search_tracks))
        .route("/tracks/:id", get(super::handlers::get_track))
        .route("/tracks/:id", delete(super::handlers::delete_track))
        .route("/tracks/:id/liked", get(super::handlers::get_liked))
        .route("/tracks/:id/liked", post(super::handlers::set_liked))
        // Catalog ingestion
        .route("/catalog/load", post(super::handlers::load_catalog))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        // Attach application context
        .with_state(ctx)
        // Enable CORS for local clients
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until the shutdown future resolves.
pub async fn run(
    port: u16,
    session: Arc<Session>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(AppContext { session });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
