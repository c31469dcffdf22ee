//! Test server wrapper for integration tests
//!
//! Provides a programmatically controllable quaver-ps instance with an
//! in-memory database, the silence sink, and event monitoring capabilities.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tokio::sync::broadcast;

use quaver_common::{QuaverEvent, Track};
use quaver_ps::api::{build_router, AppContext};
use quaver_ps::config::RuntimeSettings;
use quaver_ps::db::schema;
use quaver_ps::Session;

/// Build a catalog track for tests. URLs double as identity, so keep
/// them unique per track.
pub fn test_track(name: &str, url: &str) -> Track {
    Track::new(name, "Test Artist", url)
}

/// Test server instance with the full API surface and a live session
pub struct TestServer {
    router: Router,
    session: Arc<Session>,
    db_pool: Pool<Sqlite>,
}

impl TestServer {
    /// Start a new test server with an in-memory database and a fast
    /// progress tick
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with_runtime(RuntimeSettings {
            catalog_base_url: None,
            catalog_page_size: 30,
            progress_interval_ms: 25,
        })
        .await
    }

    /// Start with explicit runtime settings (catalog tests point the
    /// endpoint at a local fake)
    pub async fn start_with_runtime(
        runtime: RuntimeSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // One connection so every handle sees the same in-memory database
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        schema::ensure_schema(&db_pool).await?;

        let session = Session::new(db_pool.clone(), runtime).await?;

        let router = build_router(AppContext {
            session: session.clone(),
        });

        Ok(TestServer {
            router,
            session,
            db_pool,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn db_pool(&self) -> &Pool<Sqlite> {
        &self.db_pool
    }

    /// Serve the router on a real socket for tests that need transport
    /// (SessionClient attach, SSE framing). Returns the base URL.
    pub async fn serve(&self) -> Result<String, Box<dyn std::error::Error>> {
        let (base_url, _) = self.serve_abortable().await?;
        Ok(base_url)
    }

    /// Serve on a real socket, returning the task handle so tests can kill
    /// the host and observe client-side staleness handling.
    ///
    /// Connections are served from a `JoinSet` owned by the returned task
    /// rather than through `axum::serve`, which detaches one task per
    /// connection; aborting the handle must sever established connections
    /// (keep-alive pools, SSE streams), not just the accept loop.
    pub async fn serve_abortable(
        &self,
    ) -> Result<(String, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
        use tower::Service;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let router = self.router.clone();
        let handle = tokio::spawn(async move {
            let mut connections = tokio::task::JoinSet::new();
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let router = router.clone();
                        connections.spawn(async move {
                            let service = hyper::service::service_fn(
                                move |request: http::Request<hyper::body::Incoming>| {
                                    router.clone().call(request)
                                },
                            );
                            let _ = hyper::server::conn::http1::Builder::new()
                                .serve_connection(hyper_util::rt::TokioIo::new(stream), service)
                                .await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });
        Ok((format!("http://{}", addr), handle))
    }

    /// Subscribe to the session event bus
    pub fn subscribe_events(&self) -> EventStream {
        EventStream {
            receiver: self.session.state().events.subscribe(),
            start_time: Instant::now(),
        }
    }

    /// Make an HTTP request to the test server
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<(axum::http::StatusCode, Option<Value>), Box<dyn std::error::Error>> {
        use axum::body::Body;
        use http::{Method, Request};
        use tower::Service;

        let method = match method {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            _ => return Err(format!("Unsupported method: {}", method).into()),
        };

        let mut request_builder = Request::builder().method(method).uri(path);

        if body.is_some() {
            request_builder = request_builder.header("content-type", "application/json");
        }

        let request = if let Some(json_body) = body {
            request_builder.body(Body::from(json_body.to_string()))?
        } else {
            request_builder.body(Body::empty())?
        };

        let response = self.router.clone().call(request).await?;

        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        let json_body = if !body.is_empty() {
            Some(serde_json::from_slice(&body)?)
        } else {
            None
        };

        Ok((status, json_body))
    }

    /// Replace the playlist through the API
    pub async fn put_playlist(
        &self,
        tracks: &[Track],
        position: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let body = serde_json::json!({ "tracks": tracks, "position": position });
        let (status, response) = self.request("PUT", "/playlist", Some(body)).await?;

        if !status.is_success() {
            return Err(format!("Playlist replace failed: {:?}", response).into());
        }

        Ok(())
    }

    /// Fetch the playlist snapshot through the API
    pub async fn get_playlist(&self) -> Result<(Vec<Track>, usize), Box<dyn std::error::Error>> {
        let (status, response) = self.request("GET", "/playlist", None).await?;

        if !status.is_success() {
            return Err(format!("Get playlist failed: {:?}", response).into());
        }

        let body = response.ok_or("Missing playlist response")?;
        let tracks = serde_json::from_value(
            body.get("tracks").cloned().ok_or("Missing tracks in response")?,
        )?;
        let position = body
            .get("position")
            .and_then(|p| p.as_u64())
            .ok_or("Missing position in response")? as usize;

        Ok((tracks, position))
    }

    /// Fetch the state snapshot through the API
    pub async fn get_state(&self) -> Result<Value, Box<dyn std::error::Error>> {
        let (status, response) = self.request("GET", "/playback/state", None).await?;

        if !status.is_success() {
            return Err(format!("state request returned {}", status).into());
        }

        response.ok_or("Missing playback state response".into())
    }
}

/// Event bus subscription wrapper
pub struct EventStream {
    pub receiver: broadcast::Receiver<QuaverEvent>,
    pub start_time: Instant,
}

impl EventStream {
    /// Wait for next event (indefinitely)
    pub async fn next(&mut self) -> Option<QuaverEvent> {
        self.receiver.recv().await.ok()
    }

    /// Wait for next event with timeout
    pub async fn next_timeout(&mut self, timeout: Duration) -> Option<QuaverEvent> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .ok()
            .and_then(|r| r.ok())
    }

    /// Wait for a specific event type
    pub async fn wait_for(&mut self, event_type: &str, timeout: Duration) -> Option<QuaverEvent> {
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() > deadline {
                return None;
            }

            let remaining = deadline.duration_since(Instant::now());
            if let Some(event) = self.next_timeout(remaining).await {
                if event.event_name() == event_type {
                    return Some(event);
                }
            } else {
                return None;
            }
        }
    }

    /// Collect events matching a type
    pub async fn take_matching(
        &mut self,
        event_type: &str,
        count: usize,
        timeout: Duration,
    ) -> Option<Vec<QuaverEvent>> {
        let mut events = Vec::new();
        let deadline = Instant::now() + timeout;

        while events.len() < count {
            if Instant::now() > deadline {
                return None;
            }

            let remaining = deadline.duration_since(Instant::now());
            if let Some(event) = self.next_timeout(remaining).await {
                if event.event_name() == event_type {
                    events.push(event);
                }
            } else {
                return None;
            }
        }

        Some(events)
    }
}
