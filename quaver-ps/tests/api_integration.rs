//! Integration tests for the quaver-ps API
//!
//! Tests the complete API surface including:
//! - Health checks
//! - Playback control and state snapshots
//! - Playlist management (replace, append, remove, cursor rules)
//! - Track store (search, liked flags, deletion)

mod helpers;

use axum::http::StatusCode;
use serde_json::json;
use std::time::Duration;

use helpers::{test_track, TestServer};

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await.unwrap();

    let (status, body) = server.request("GET", "/health", None).await.unwrap();

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "playback_session");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_initial_state_snapshot() {
    let server = TestServer::start().await.unwrap();

    let state = server.get_state().await.unwrap();
    assert_eq!(state["playing"], false);
    assert_eq!(state["state"], "idle");
    assert_eq!(state["mode"], "sequential");
    assert_eq!(state["position"], 0);
    assert_eq!(state["playlist_length"], 0);
}

#[tokio::test]
async fn test_playlist_replace_and_fetch() {
    let server = TestServer::start().await.unwrap();

    let tracks = vec![
        test_track("Alpha", "http://cdn.test/a.mp3"),
        test_track("Beta", "http://cdn.test/b.mp3"),
        test_track("Gamma", "http://cdn.test/c.mp3"),
    ];
    server.put_playlist(&tracks, 1).await.unwrap();

    let (fetched, position) = server.get_playlist().await.unwrap();
    assert_eq!(fetched.len(), 3);
    assert_eq!(position, 1);
    assert_eq!(fetched[0].name, "Alpha");
    assert_eq!(fetched[2].name, "Gamma");
    // The store assigns row ids during persistence
    assert!(fetched.iter().all(|t| t.id.is_some()));
}

#[tokio::test]
async fn test_replace_clamps_out_of_range_cursor() {
    let server = TestServer::start().await.unwrap();

    let tracks = vec![
        test_track("Alpha", "http://cdn.test/a.mp3"),
        test_track("Beta", "http://cdn.test/b.mp3"),
    ];
    server.put_playlist(&tracks, 9).await.unwrap();

    let (_, position) = server.get_playlist().await.unwrap();
    assert_eq!(position, 1);
}

#[tokio::test]
async fn test_add_track_dedups_by_url() {
    let server = TestServer::start().await.unwrap();

    let track = serde_json::to_value(test_track("Alpha", "http://cdn.test/a.mp3")).unwrap();

    let (status, body) = server
        .request("POST", "/playlist/tracks", Some(track.clone()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["added"], true);

    let (status, body) = server
        .request("POST", "/playlist/tracks", Some(track))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["added"], false);

    let (tracks, _) = server.get_playlist().await.unwrap();
    assert_eq!(tracks.len(), 1);
}

#[tokio::test]
async fn test_play_at_starts_playback() {
    let server = TestServer::start().await.unwrap();
    let tracks = vec![
        test_track("Alpha", "http://cdn.test/a.mp3"),
        test_track("Beta", "http://cdn.test/b.mp3"),
    ];
    server.put_playlist(&tracks, 0).await.unwrap();

    let mut events = server.subscribe_events();

    let (status, _) = server
        .request("POST", "/playback/play_at", Some(json!({ "index": 1 })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let song = events
        .wait_for("SongChanged", Duration::from_secs(2))
        .await
        .expect("SongChanged not observed");
    match song {
        quaver_common::QuaverEvent::SongChanged { position, track, .. } => {
            assert_eq!(position, 1);
            assert_eq!(track.unwrap().name, "Beta");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    events
        .wait_for("PlaybackStateChanged", Duration::from_secs(2))
        .await
        .expect("PlaybackStateChanged not observed");

    let state = server.get_state().await.unwrap();
    assert_eq!(state["state"], "playing");
    assert_eq!(state["playing"], true);
    assert_eq!(state["position"], 1);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(&[test_track("Alpha", "http://cdn.test/a.mp3")], 0)
        .await
        .unwrap();

    let mut events = server.subscribe_events();
    server
        .request("POST", "/playback/play_at", Some(json!({ "index": 0 })))
        .await
        .unwrap();
    events
        .wait_for("PlaybackStateChanged", Duration::from_secs(2))
        .await
        .expect("playback never started");

    let (status, _) = server.request("POST", "/playback/pause", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let state = server.get_state().await.unwrap();
    assert_eq!(state["state"], "paused");
    assert_eq!(state["playing"], false);

    let (status, _) = server.request("POST", "/playback/play", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let state = server.get_state().await.unwrap();
    assert_eq!(state["state"], "playing");
}

#[tokio::test]
async fn test_play_at_rejects_invalid_index() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            0,
        )
        .await
        .unwrap();

    let (status, body) = server
        .request("POST", "/playback/play_at", Some(json!({ "index": 9 })))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let status_text = body.unwrap()["status"].as_str().unwrap().to_string();
    assert!(status_text.starts_with("error"));

    // The session is untouched
    let state = server.get_state().await.unwrap();
    assert_eq!(state["state"], "idle");
}

#[tokio::test]
async fn test_play_mode_round_trip() {
    let server = TestServer::start().await.unwrap();

    let (status, body) = server.request("GET", "/playback/mode", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["mode"], "sequential");

    let mut events = server.subscribe_events();

    let (status, body) = server
        .request("POST", "/playback/mode", Some(json!({ "mode": "repeat_one" })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["mode"], "repeat_one");

    events
        .wait_for("PlayModeChanged", Duration::from_secs(2))
        .await
        .expect("PlayModeChanged not observed");

    let (_, body) = server.request("GET", "/playback/mode", None).await.unwrap();
    assert_eq!(body.unwrap()["mode"], "repeat_one");
}

#[tokio::test]
async fn test_remove_before_cursor_keeps_current_track() {
    let server = TestServer::start().await.unwrap();
    let tracks = vec![
        test_track("Alpha", "http://cdn.test/a.mp3"),
        test_track("Beta", "http://cdn.test/b.mp3"),
        test_track("Gamma", "http://cdn.test/c.mp3"),
    ];
    server.put_playlist(&tracks, 2).await.unwrap();

    let (status, _) = server
        .request("DELETE", "/playlist/tracks/1", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (remaining, position) = server.get_playlist().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(position, 1);
    assert_eq!(remaining[position].name, "Gamma");
}

#[tokio::test]
async fn test_remove_rejects_invalid_index() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(&[test_track("Alpha", "http://cdn.test/a.mp3")], 0)
        .await
        .unwrap();

    let (status, _) = server
        .request("DELETE", "/playlist/tracks/9", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (tracks, _) = server.get_playlist().await.unwrap();
    assert_eq!(tracks.len(), 1);
}

#[tokio::test]
async fn test_set_position_moves_cursor_without_playing() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            0,
        )
        .await
        .unwrap();

    let (status, _) = server
        .request("POST", "/playlist/position", Some(json!({ "index": 1 })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let state = server.get_state().await.unwrap();
    assert_eq!(state["position"], 1);
    assert_eq!(state["state"], "idle");

    let (status, _) = server
        .request("POST", "/playlist/position", Some(json!({ "index": 5 })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_playlist() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            1,
        )
        .await
        .unwrap();

    let (status, _) = server.request("POST", "/playlist/clear", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    let (tracks, position) = server.get_playlist().await.unwrap();
    assert!(tracks.is_empty());
    assert_eq!(position, 0);
}

#[tokio::test]
async fn test_play_now_inserts_at_front_and_starts() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            1,
        )
        .await
        .unwrap();

    let mut events = server.subscribe_events();

    let gamma = serde_json::to_value(test_track("Gamma", "http://cdn.test/c.mp3")).unwrap();
    let (status, _) = server
        .request("POST", "/playlist/play_now", Some(gamma))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    events
        .wait_for("PlaybackStateChanged", Duration::from_secs(2))
        .await
        .expect("playback never started");

    let (tracks, position) = server.get_playlist().await.unwrap();
    assert_eq!(tracks.len(), 3);
    assert_eq!(position, 0);
    assert_eq!(tracks[0].name, "Gamma");

    let state = server.get_state().await.unwrap();
    assert_eq!(state["state"], "playing");
}

#[tokio::test]
async fn test_play_now_moves_existing_entry_instead_of_duplicating() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            0,
        )
        .await
        .unwrap();

    let beta = serde_json::to_value(test_track("Beta", "http://cdn.test/b.mp3")).unwrap();
    let (status, _) = server
        .request("POST", "/playlist/play_now", Some(beta))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (tracks, position) = server.get_playlist().await.unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(position, 0);
    assert_eq!(tracks[0].name, "Beta");
    assert_eq!(tracks[1].name, "Alpha");
}

#[tokio::test]
async fn test_liked_flag_round_trip() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(&[test_track("Alpha", "http://cdn.test/a.mp3")], 0)
        .await
        .unwrap();

    let (tracks, _) = server.get_playlist().await.unwrap();
    let id = tracks[0].id.unwrap();

    let (status, body) = server
        .request("GET", &format!("/tracks/{}/liked", id), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["liked"], false);

    let (status, body) = server
        .request(
            "POST",
            &format!("/tracks/{}/liked", id),
            Some(json!({ "liked": true })),
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["liked"], true);

    // The flag is joined into the stored track
    let (status, body) = server
        .request("GET", &format!("/tracks/{}", id), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["liked"], true);
}

#[tokio::test]
async fn test_liked_on_missing_track_is_not_found() {
    let server = TestServer::start().await.unwrap();

    let (status, _) = server
        .request("POST", "/tracks/999/liked", Some(json!({ "liked": true })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.request("GET", "/tracks/999", None).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_matches_name_and_author() {
    let server = TestServer::start().await.unwrap();
    let mut blue = test_track("Blue Monday", "http://cdn.test/a.mp3");
    blue.author = "New Order".to_string();
    let mut hurt = test_track("Hurt", "http://cdn.test/b.mp3");
    hurt.author = "Johnny Cash".to_string();
    server.put_playlist(&[blue, hurt], 0).await.unwrap();

    let (status, body) = server
        .request("GET", "/tracks/search?keyword=monday", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    let found = body.unwrap()["tracks"].as_array().unwrap().len();
    assert_eq!(found, 1);

    let (_, body) = server
        .request("GET", "/tracks/search?keyword=cash", None)
        .await
        .unwrap();
    let body = body.unwrap();
    let tracks = body["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0]["name"], "Hurt");
}

#[tokio::test]
async fn test_delete_track_removes_playlist_entry_too() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
                test_track("Gamma", "http://cdn.test/c.mp3"),
            ],
            0,
        )
        .await
        .unwrap();

    let (tracks, _) = server.get_playlist().await.unwrap();
    let beta_id = tracks[1].id.unwrap();

    let (status, _) = server
        .request("DELETE", &format!("/tracks/{}", beta_id), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (remaining, _) = server.get_playlist().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|t| t.name != "Beta"));

    let (status, _) = server
        .request("GET", &format!("/tracks/{}", beta_id), None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_position_endpoint_reports_progress() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(&[test_track("Alpha", "http://cdn.test/a.mp3")], 0)
        .await
        .unwrap();

    let mut events = server.subscribe_events();
    server
        .request("POST", "/playback/play_at", Some(json!({ "index": 0 })))
        .await
        .unwrap();
    events
        .wait_for("PlaybackStateChanged", Duration::from_secs(2))
        .await
        .expect("playback never started");

    tokio::time::sleep(Duration::from_millis(60)).await;

    let (status, body) = server
        .request("GET", "/playback/position", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["position_ms"].as_u64().unwrap() > 0);
    assert_eq!(body["state"], "playing");
}

#[tokio::test]
async fn test_seek_through_api() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(&[test_track("Alpha", "http://cdn.test/a.mp3")], 0)
        .await
        .unwrap();

    let mut events = server.subscribe_events();
    server
        .request("POST", "/playback/play_at", Some(json!({ "index": 0 })))
        .await
        .unwrap();
    events
        .wait_for("PlaybackStateChanged", Duration::from_secs(2))
        .await
        .expect("playback never started");

    let (status, _) = server
        .request("POST", "/playback/seek", Some(json!({ "position_ms": 5000 })))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    let (_, body) = server.request("GET", "/playback/position", None).await.unwrap();
    assert!(body.unwrap()["position_ms"].as_u64().unwrap() >= 5000);
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let server = TestServer::start().await.unwrap();

    let (status, _) = server.request("GET", "/nonexistent", None).await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.request("GET", "/playback/play", None).await.unwrap();
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_playlist_survives_restart() {
    let server = TestServer::start().await.unwrap();
    server
        .put_playlist(
            &[
                test_track("Alpha", "http://cdn.test/a.mp3"),
                test_track("Beta", "http://cdn.test/b.mp3"),
            ],
            1,
        )
        .await
        .unwrap();

    // A second session over the same database restores the playlist
    let session = server.session().clone();
    session.shutdown().await;

    let runtime = session.runtime().clone();
    let revived = quaver_ps::Session::new(server.db_pool().clone(), runtime)
        .await
        .unwrap();
    let (tracks, position) = revived.playlist().snapshot().await;
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[1].name, "Beta");
    // The cursor is session state, not persisted; a fresh session starts at 0
    assert_eq!(position, 0);
}
