//! Session client binding
//!
//! HTTP+SSE client of a playback session daemon. A session handle is a
//! validated connection to the host plus (optionally) a live event
//! subscription. The binding owns the attach/validate/reconnect lifecycle:
//!
//! - `attach` validates the host and synchronizes once in both directions:
//!   the client's playlist view is pushed to the host (or pulled from it
//!   when the local view is empty) and the host's play state and mode are
//!   pulled into the local view.
//! - Any transport-level failure is proof of staleness. The handle is
//!   discarded and, while the client is foregrounded, a reconnect is
//!   scheduled after a fixed delay. Concurrent reconnect requests collapse
//!   into the one already in flight.
//! - `activate`/`deactivate` track whether a user is actually looking at
//!   this client; backgrounded clients go stale quietly and catch up on the
//!   next activation instead of hammering a dead host.

use crate::events::QuaverEvent;
use crate::types::{PlayMode, PlaylistSnapshot, StateSnapshot, Track};
use crate::{Error, Result};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Delay before a scheduled reconnect attempt re-validates the host
pub const RECONNECT_DELAY: Duration = Duration::from_millis(200);

/// Local mirror of the host session
#[derive(Debug, Default)]
struct ClientView {
    tracks: Vec<Track>,
    position: usize,
    playing: bool,
    mode: PlayMode,
}

struct ClientInner {
    base_url: String,
    http: reqwest::Client,
    reconnect_delay: Duration,
    attached: AtomicBool,
    foregrounded: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_attempts: AtomicU64,
    view: RwLock<ClientView>,
}

/// Client binding to a playback session host
///
/// Cheap to clone; clones share the attachment state and local view.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    /// Create a detached client for the host at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_delay(base_url, RECONNECT_DELAY)
    }

    /// Create a detached client with a custom reconnect delay (tests use
    /// a near-zero delay).
    pub fn with_delay(base_url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            inner: Arc::new(ClientInner {
                base_url,
                http: reqwest::Client::new(),
                reconnect_delay,
                attached: AtomicBool::new(false),
                foregrounded: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                reconnect_attempts: AtomicU64::new(0),
                view: RwLock::new(ClientView::default()),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    // ========================================================================
    // Attachment lifecycle
    // ========================================================================

    /// Attach to the host and synchronize once in both directions.
    ///
    /// Pushes the local playlist view to the host, unless the local view is
    /// empty, in which case the host's playlist is pulled instead (pushing
    /// an empty list would wipe a live session). The host's play state and
    /// mode always win and are pulled into the local view.
    pub async fn attach(&self) -> Result<()> {
        let state = self.fetch_state().await?;

        let local_is_empty = self.inner.view.read().await.tracks.is_empty();
        if local_is_empty {
            let snapshot = self.fetch_playlist().await?;
            let mut view = self.inner.view.write().await;
            view.tracks = snapshot.tracks;
            view.position = snapshot.position;
        } else {
            let snapshot = {
                let view = self.inner.view.read().await;
                PlaylistSnapshot {
                    tracks: view.tracks.clone(),
                    position: view.position,
                }
            };
            let resp = self
                .inner
                .http
                .put(self.url("/playlist"))
                .json(&snapshot)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(Error::Host(format!(
                    "playlist push rejected: {}",
                    resp.status()
                )));
            }
        }

        {
            let mut view = self.inner.view.write().await;
            view.playing = state.playing;
            view.mode = state.mode;
        }

        self.inner.attached.store(true, Ordering::SeqCst);
        info!("Attached to session host at {}", self.inner.base_url);
        Ok(())
    }

    /// Re-validate the session handle with the cheap state call.
    ///
    /// Returns false and marks the handle stale on any failure.
    pub async fn validate(&self) -> bool {
        match self.fetch_state().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Session handle failed validation: {}", e);
                self.inner.attached.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Perform one debounced reconnect attempt.
    ///
    /// Returns false when an attempt was already in flight (this request is
    /// satisfied by it). Otherwise waits the reconnect delay, re-attaches,
    /// and returns true whether or not the attach succeeded.
    pub async fn reconnect(&self) -> bool {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already in flight, dropping request");
            return false;
        }

        self.inner.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.inner.reconnect_delay).await;

        let result = self.attach().await;
        self.inner.reconnecting.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => debug!("Reconnect succeeded"),
            Err(e) => warn!("Reconnect failed, staying detached: {}", e),
        }
        true
    }

    /// Mark the client foregrounded and bring the session handle up to date.
    pub async fn activate(&self) {
        self.inner.foregrounded.store(true, Ordering::SeqCst);
        if self.validate().await {
            debug!("Session handle still valid on activation");
        } else {
            self.reconnect().await;
        }
    }

    /// Mark the client backgrounded; staleness is then handled lazily.
    pub fn deactivate(&self) {
        self.inner.foregrounded.store(false, Ordering::SeqCst);
    }

    fn handle_disconnect(&self) {
        self.inner.attached.store(false, Ordering::SeqCst);
        if self.inner.foregrounded.load(Ordering::SeqCst) {
            let client = self.clone();
            tokio::spawn(async move {
                client.reconnect().await;
            });
        } else {
            debug!("Host unreachable while backgrounded, handle marked stale");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    pub fn is_foregrounded(&self) -> bool {
        self.inner.foregrounded.load(Ordering::SeqCst)
    }

    /// Number of reconnect attempts actually started (debounced requests
    /// are not counted).
    pub fn reconnect_attempts(&self) -> u64 {
        self.inner.reconnect_attempts.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Event subscription
    // ========================================================================

    /// Subscribe to the host's event stream.
    ///
    /// Events arrive on the returned channel until the stream ends; stream
    /// termination runs the disconnect path (stale + reconnect when
    /// foregrounded). Dropping the receiver tears the task down quietly.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<QuaverEvent>> {
        let resp = self.inner.http.get(self.url("/events")).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Host(format!(
                "event subscription rejected: {}",
                resp.status()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        debug!("Event stream read failed: {}", e);
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(end) = buffer.find("\n\n") {
                    let frame = buffer[..end].to_string();
                    buffer.drain(..end + 2);
                    if let Some(event) = parse_sse_frame(&frame) {
                        if tx.send(event).is_err() {
                            // Receiver dropped: local teardown, not host loss
                            return;
                        }
                    }
                }
            }
            debug!("Event stream ended");
            client.handle_disconnect();
        });

        Ok(rx)
    }

    // ========================================================================
    // Guarded commands
    // ========================================================================

    pub async fn play(&self) -> Result<()> {
        self.guarded(reqwest::Method::POST, "/playback/play", None).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.guarded(reqwest::Method::POST, "/playback/pause", None).await
    }

    pub async fn next(&self) -> Result<()> {
        self.guarded(reqwest::Method::POST, "/playback/next", None).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.guarded(reqwest::Method::POST, "/playback/previous", None)
            .await
    }

    pub async fn play_at(&self, index: usize) -> Result<()> {
        self.guarded(
            reqwest::Method::POST,
            "/playback/play_at",
            Some(serde_json::json!({ "index": index })),
        )
        .await
    }

    pub async fn set_mode(&self, mode: PlayMode) -> Result<()> {
        let result = self
            .guarded(
                reqwest::Method::POST,
                "/playback/mode",
                Some(serde_json::json!({ "mode": mode })),
            )
            .await;
        if result.is_ok() {
            self.inner.view.write().await.mode = mode;
        }
        result
    }

    /// Push the current local playlist view to the host.
    pub async fn push_playlist(&self) -> Result<()> {
        let snapshot = {
            let view = self.inner.view.read().await;
            PlaylistSnapshot {
                tracks: view.tracks.clone(),
                position: view.position,
            }
        };
        self.guarded(
            reqwest::Method::PUT,
            "/playlist",
            Some(serde_json::to_value(&snapshot)?),
        )
        .await
    }

    /// Issue a command to the host, running the disconnect path on
    /// transport failure. A non-2xx response is a host-side rejection
    /// (invalid index and the like), not staleness.
    async fn guarded(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut request = self.inner.http.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(Error::Host(format!("{} returned {}", path, resp.status()))),
            Err(e) => {
                warn!("Command {} failed at transport level: {}", path, e);
                self.handle_disconnect();
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Local view
    // ========================================================================

    /// Replace the local playlist view (what `attach` will push).
    pub async fn set_local_view(&self, tracks: Vec<Track>, position: usize) {
        let mut view = self.inner.view.write().await;
        view.position = if tracks.is_empty() {
            0
        } else {
            position.min(tracks.len() - 1)
        };
        view.tracks = tracks;
    }

    /// Snapshot of the local playlist view.
    pub async fn playlist_view(&self) -> (Vec<Track>, usize) {
        let view = self.inner.view.read().await;
        (view.tracks.clone(), view.position)
    }

    /// Play/pause state as last synchronized from the host.
    pub async fn view_playing(&self) -> bool {
        self.inner.view.read().await.playing
    }

    /// Play mode as last synchronized from the host.
    pub async fn view_mode(&self) -> PlayMode {
        self.inner.view.read().await.mode
    }

    // ========================================================================
    // Raw requests
    // ========================================================================

    async fn fetch_state(&self) -> Result<StateSnapshot> {
        let resp = self
            .inner
            .http
            .get(self.url("/playback/state"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Host(format!(
                "state query returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    async fn fetch_playlist(&self) -> Result<PlaylistSnapshot> {
        let resp = self.inner.http.get(self.url("/playlist")).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Host(format!(
                "playlist query returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

/// Parse one SSE frame (`event:`/`data:` lines) into an event.
///
/// The `event:` name duplicates the serde tag and is ignored; comment lines
/// (keep-alives) yield nothing. Unparseable data is logged and skipped so a
/// newer host cannot wedge an older client.
fn parse_sse_frame(frame: &str) -> Option<QuaverEvent> {
    let mut data = String::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Ignoring unparseable SSE frame: {}", e);
            None
        }
    }
}
