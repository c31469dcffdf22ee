//! HTTP request handlers
//!
//! REST endpoints for playback, playlist, track store, and catalog control.

use crate::api::server::AppContext;
use crate::catalog::collect_tracks;
use crate::error::Error;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use quaver_common::{PlayMode, PlaylistSnapshot, StateSnapshot, Track};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    position_ms: u64,
    duration_ms: u64,
    state: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayAtRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeBody {
    mode: PlayMode,
}

#[derive(Debug, Serialize)]
pub struct AddTrackResponse {
    status: String,
    added: bool,
}

#[derive(Debug, Deserialize)]
pub struct PositionRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    keyword: String,
}

#[derive(Debug, Serialize)]
pub struct TracksResponse {
    tracks: Vec<Track>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikedBody {
    liked: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogLoadRequest {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CatalogLoadResponse {
    status: String,
    tracks: usize,
    last_page: bool,
}

type ErrorReply = (StatusCode, Json<StatusResponse>);

/// Map a domain error to its HTTP reply. Bad indices are client errors,
/// missing rows are 404, the rest is on us.
fn error_reply(e: Error) -> ErrorReply {
    let code = match &e {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "playback_session".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// GET /playback/state - Full state snapshot (the attach validation call)
pub async fn get_playback_state(State(ctx): State<AppContext>) -> Json<StateSnapshot> {
    let session = &ctx.session;
    let state = session.state().get_playback_state().await;
    let mode = session.state().get_play_mode().await;
    let (tracks, position) = session.playlist().snapshot().await;

    Json(StateSnapshot {
        playing: state.is_playing(),
        state,
        mode,
        position,
        playlist_length: tracks.len(),
    })
}

/// GET /playback/position - Progress of the current track
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionResponse> {
    let progress = ctx.session.state().get_progress().await;
    let state = ctx.session.state().get_playback_state().await;

    Json(PositionResponse {
        position_ms: progress.position_ms,
        duration_ms: progress.duration_ms,
        state: state.to_string(),
    })
}

/// POST /playback/play - Resume a prepared source
pub async fn play(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    match ctx.session.engine().play().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Play command failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/pause - Halt a playing source
pub async fn pause(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    match ctx.session.engine().pause().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Pause command failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/stop - Halt playback and drop the prepared source
pub async fn stop(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ErrorReply> {
    match ctx.session.engine().stop().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Stop command failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/next - Manual skip forward
pub async fn play_next(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Skip next request");
    match ctx.session.engine().play_next().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Skip next failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/previous - Manual skip backward
pub async fn play_previous(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Skip previous request");
    match ctx.session.engine().play_previous().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Skip previous failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/play_at - Jump to a playlist position
pub async fn play_at(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayAtRequest>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Play at request: index {}", req.index);
    match ctx.session.engine().play_at(req.index).await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Play at {} failed: {}", req.index, e);
            Err(error_reply(e))
        }
    }
}

/// POST /playback/seek - Jump to an absolute position
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    match ctx.session.engine().seek_to(req.position_ms).await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Seek failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// GET /playback/mode - Current play mode
pub async fn get_play_mode(State(ctx): State<AppContext>) -> Json<ModeBody> {
    Json(ModeBody {
        mode: ctx.session.engine().play_mode().await,
    })
}

/// POST /playback/mode - Set the play mode
pub async fn set_play_mode(
    State(ctx): State<AppContext>,
    Json(req): Json<ModeBody>,
) -> Result<Json<ModeBody>, ErrorReply> {
    match ctx.session.engine().set_play_mode(req.mode).await {
        Ok(()) => Ok(Json(ModeBody { mode: req.mode })),
        Err(e) => {
            error!("Set play mode failed: {}", e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Playlist Endpoints
// ============================================================================

/// GET /playlist - Snapshot of contents and cursor
pub async fn get_playlist(State(ctx): State<AppContext>) -> Json<PlaylistSnapshot> {
    let (tracks, position) = ctx.session.playlist().snapshot().await;
    Json(PlaylistSnapshot { tracks, position })
}

/// PUT /playlist - Replace the playlist (the attach push)
pub async fn replace_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<PlaylistSnapshot>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!(
        "Replace playlist request: {} tracks, cursor {}",
        req.tracks.len(),
        req.position
    );
    match ctx
        .session
        .playlist()
        .set_playlist(req.tracks, req.position)
        .await
    {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Replace playlist failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playlist/tracks - Append a track unless already present
pub async fn add_track(
    State(ctx): State<AppContext>,
    Json(track): Json<Track>,
) -> Result<Json<AddTrackResponse>, ErrorReply> {
    info!("Add track request: {}", track.url);
    match ctx.session.playlist().add_to_end(track).await {
        Ok(added) => Ok(Json(AddTrackResponse {
            status: "ok".to_string(),
            added,
        })),
        Err(e) => {
            error!("Add track failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// DELETE /playlist/tracks/:index - Remove the entry at an index
pub async fn remove_track_at(
    State(ctx): State<AppContext>,
    Path(index): Path<usize>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Remove playlist entry request: index {}", index);
    match ctx.session.playlist().remove_at(index).await {
        Ok(true) => Ok(ok()),
        Ok(false) => Err(error_reply(Error::BadRequest(format!(
            "playlist index {} out of range",
            index
        )))),
        Err(e) => {
            error!("Remove playlist entry failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playlist/play_now - Put a track at the front and play it
pub async fn play_now(
    State(ctx): State<AppContext>,
    Json(track): Json<Track>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Play now request: {}", track.url);
    let session = &ctx.session;
    if let Err(e) = session.playlist().add_and_move_to_front(track).await {
        error!("Play now insert failed: {}", e);
        return Err(error_reply(e));
    }
    match session.engine().play_at(0).await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Play now start failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /playlist/position - Move the cursor without starting playback
pub async fn set_position(
    State(ctx): State<AppContext>,
    Json(req): Json<PositionRequest>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    if ctx.session.playlist().set_position(req.index).await {
        Ok(ok())
    } else {
        Err(error_reply(Error::BadRequest(format!(
            "playlist index {} out of range",
            req.index
        ))))
    }
}

/// POST /playlist/clear - Empty the playlist
pub async fn clear_playlist(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Clear playlist request");
    match ctx.session.playlist().clear().await {
        Ok(()) => Ok(ok()),
        Err(e) => {
            error!("Clear playlist failed: {}", e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Track Store Endpoints
// ============================================================================

/// GET /tracks/search?keyword= - Case-insensitive name/author search
pub async fn search_tracks(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TracksResponse>, ErrorReply> {
    match ctx.session.store().search(&params.keyword).await {
        Ok(tracks) => Ok(Json(TracksResponse { tracks })),
        Err(e) => {
            error!("Search failed: {}", e);
            Err(error_reply(e))
        }
    }
}

/// GET /tracks/:id - One stored track with its liked flag
pub async fn get_track(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<Track>, ErrorReply> {
    match ctx.session.store().get_track(id).await {
        Ok(Some(track)) => Ok(Json(track)),
        Ok(None) => Err(error_reply(Error::NotFound(format!("track {}", id)))),
        Err(e) => {
            error!("Get track {} failed: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// DELETE /tracks/:id - Drop a track from the store and the playlist
pub async fn delete_track(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    info!("Delete track request: {}", id);
    let session = &ctx.session;

    let track = match session.store().get_track(id).await {
        Ok(Some(track)) => track,
        Ok(None) => return Err(error_reply(Error::NotFound(format!("track {}", id)))),
        Err(e) => {
            error!("Delete track {} lookup failed: {}", id, e);
            return Err(error_reply(e));
        }
    };

    // Keep the in-memory playlist in step before the row goes away
    if let Err(e) = session.playlist().remove_track(&track).await {
        error!("Delete track {} playlist removal failed: {}", id, e);
        return Err(error_reply(e));
    }

    match session.store().delete_track(id).await {
        Ok(_) => Ok(ok()),
        Err(e) => {
            error!("Delete track {} failed: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// GET /tracks/:id/liked - Liked flag for one track
pub async fn get_liked(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<LikedBody>, ErrorReply> {
    match ctx.session.store().is_liked(id).await {
        Ok(liked) => Ok(Json(LikedBody { liked })),
        Err(e) => {
            error!("Get liked {} failed: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /tracks/:id/liked - Set the liked flag
pub async fn set_liked(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<LikedBody>,
) -> Result<Json<LikedBody>, ErrorReply> {
    info!("Set liked request: track {} -> {}", id, req.liked);
    let store = ctx.session.store();

    match store.get_track(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(error_reply(Error::NotFound(format!("track {}", id)))),
        Err(e) => {
            error!("Set liked {} lookup failed: {}", id, e);
            return Err(error_reply(e));
        }
    }

    match store.set_liked(id, req.liked).await {
        Ok(()) => Ok(Json(LikedBody { liked: req.liked })),
        Err(e) => {
            error!("Set liked {} failed: {}", id, e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Catalog Endpoint
// ============================================================================

/// POST /catalog/load - Fetch one catalog feed page and replace the playlist
pub async fn load_catalog(
    State(ctx): State<AppContext>,
    body: Option<Json<CatalogLoadRequest>>,
) -> Result<Json<CatalogLoadResponse>, ErrorReply> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let page = req.page.unwrap_or(1);
    info!("Catalog load request: page {}", page);

    let client = match ctx.session.catalog_client(req.size) {
        Ok(client) => client,
        Err(e) => {
            error!("Catalog load refused: {}", e);
            return Err(error_reply(e));
        }
    };

    let data = match client.fetch_page(page).await {
        Ok(data) => data,
        Err(e) => {
            error!("Catalog fetch failed: {}", e);
            return Err(error_reply(e));
        }
    };
    let last_page = data.is_last_page();

    let modules = data
        .records
        .into_iter()
        .filter_map(crate::catalog::CatalogModule::classify)
        .collect();
    let tracks = collect_tracks(modules);
    let count = tracks.len();

    match ctx.session.playlist().set_playlist(tracks, 0).await {
        Ok(()) => {
            info!("Catalog page {} loaded: {} tracks", page, count);
            Ok(Json(CatalogLoadResponse {
                status: "ok".to_string(),
                tracks: count,
                last_page,
            }))
        }
        Err(e) => {
            error!("Catalog playlist replace failed: {}", e);
            Err(error_reply(e))
        }
    }
}
