//! Playback engine orchestration
//!
//! Drives one [`AudioSink`] from playlist decisions: staging, asynchronous
//! preparation, transport commands, and the advance policy on completion or
//! failure. All commands and sink callbacks are serialized by one internal
//! mutex, so no two in-flight commands interleave; callers observe outcomes
//! through broadcast events rather than blocking returns.
//!
//! Every `play_at` bumps a generation counter and the sink echoes it in its
//! events, so callbacks from a superseded source are recognized and dropped.

use crate::error::{Error, Result};
use crate::playback::sink::{AudioSink, SinkEvent, SinkNotice};
use crate::playlist::PlaylistManager;
use crate::state::{PlaybackState, SharedState};
use quaver_common::events::QuaverEvent;
use quaver_common::PlayMode;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Playback engine, the single authority over the audio sink
pub struct PlaybackEngine {
    sink: Arc<dyn AudioSink>,
    playlist: Arc<PlaylistManager>,
    state: Arc<SharedState>,

    /// Bumped at each play_at; sink events carrying an older value are stale
    generation: AtomicU64,

    /// True from a successful prepare until reset/stop
    prepared: AtomicBool,

    /// Background loop gate
    running: AtomicBool,

    /// Serializes commands and sink-event dispatch
    command: Mutex<()>,
}

impl PlaybackEngine {
    pub fn new(
        sink: Arc<dyn AudioSink>,
        playlist: Arc<PlaylistManager>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            sink,
            playlist,
            state,
            generation: AtomicU64::new(0),
            prepared: AtomicBool::new(false),
            running: AtomicBool::new(false),
            command: Mutex::new(()),
        }
    }

    /// Start the background tasks: sink event dispatch and the progress
    /// ticker.
    pub fn start(
        self: &Arc<Self>,
        mut sink_events: mpsc::UnboundedReceiver<SinkEvent>,
        progress_interval: Duration,
    ) {
        info!("Starting playback engine");
        self.running.store(true, Ordering::SeqCst);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = sink_events.recv().await {
                if !engine.running.load(Ordering::SeqCst) {
                    break;
                }
                engine.dispatch(event).await;
            }
            debug!("Sink event loop finished");
        });

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.progress_loop(progress_interval).await;
        });
    }

    /// Stop the background tasks and tear down the sink.
    pub async fn shutdown(&self) {
        info!("Stopping playback engine");
        let _guard = self.command.lock().await;
        self.running.store(false, Ordering::SeqCst);
        self.prepared.store(false, Ordering::SeqCst);
        self.sink.stop();
        self.sink.release();
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Jump to a playlist position and start playing it.
    ///
    /// Raises `SongChanged` synchronously, then hands the source to the sink
    /// for asynchronous preparation. A synchronous staging failure is
    /// returned to the caller; it never triggers an auto-advance.
    pub async fn play_at(&self, index: usize) -> Result<()> {
        let _guard = self.command.lock().await;
        self.play_at_locked(index).await
    }

    /// Resume a prepared source. Logged no-op when nothing is prepared.
    pub async fn play(&self) -> Result<()> {
        let _guard = self.command.lock().await;
        if !self.prepared.load(Ordering::SeqCst) {
            debug!("Play ignored: no prepared source");
            return Ok(());
        }
        info!("Play command received");
        self.sink.start();
        self.state.set_playback_state(PlaybackState::Playing).await;
        self.emit_state_changed(true);
        self.emit_progress_snapshot().await;
        Ok(())
    }

    /// Halt a playing source, keeping its position. Logged no-op otherwise.
    pub async fn pause(&self) -> Result<()> {
        let _guard = self.command.lock().await;
        if self.state.get_playback_state().await != PlaybackState::Playing {
            debug!("Pause ignored: not playing");
            return Ok(());
        }
        info!("Pause command received");
        self.sink.pause();
        self.state.set_playback_state(PlaybackState::Paused).await;
        self.emit_state_changed(false);
        self.emit_progress_snapshot().await;
        Ok(())
    }

    /// Halt playback and drop the prepared source. Safe in every state.
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.command.lock().await;
        self.stop_locked().await;
        Ok(())
    }

    /// Jump to an absolute position. Logged no-op when nothing is prepared.
    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let _guard = self.command.lock().await;
        if !self.prepared.load(Ordering::SeqCst) {
            debug!("Seek ignored: no prepared source");
            return Ok(());
        }
        debug!("Seeking to {}ms", position_ms);
        self.sink.seek_to(position_ms);
        self.emit_progress_snapshot().await;
        Ok(())
    }

    /// Manual skip forward: one step under Sequential and RepeatOne, a
    /// fresh draw under Random.
    pub async fn play_next(&self) -> Result<()> {
        let _guard = self.command.lock().await;
        let len = self.playlist.len().await;
        if len == 0 {
            debug!("Next ignored: playlist is empty");
            return Ok(());
        }
        let current = self.playlist.position().await;
        let next = match self.state.get_play_mode().await {
            PlayMode::Random => next_position(current, len, PlayMode::Random),
            _ => (current + 1) % len,
        };
        self.play_at_locked(next).await
    }

    /// Manual skip backward, mirror of [`play_next`](Self::play_next).
    pub async fn play_previous(&self) -> Result<()> {
        let _guard = self.command.lock().await;
        let len = self.playlist.len().await;
        if len == 0 {
            debug!("Previous ignored: playlist is empty");
            return Ok(());
        }
        let current = self.playlist.position().await;
        let previous = match self.state.get_play_mode().await {
            PlayMode::Random => next_position(current, len, PlayMode::Random),
            _ => (current + len - 1) % len,
        };
        self.play_at_locked(previous).await
    }

    pub async fn set_play_mode(&self, mode: PlayMode) -> Result<()> {
        let _guard = self.command.lock().await;
        info!("Play mode set to {}", mode);
        self.state.set_play_mode(mode).await;
        self.state.broadcast_event(QuaverEvent::PlayModeChanged {
            mode,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    pub async fn play_mode(&self) -> PlayMode {
        self.state.get_play_mode().await
    }

    // =========================================================================
    // Internals (command mutex held)
    // =========================================================================

    /// Position and duration as the sink currently reports them.
    fn progress(&self) -> (u64, u64) {
        (self.sink.position_ms(), self.sink.duration_ms())
    }

    async fn play_at_locked(&self, index: usize) -> Result<()> {
        let track = match self.playlist.track_at(index).await {
            Some(track) => track,
            None => {
                let len = self.playlist.len().await;
                return Err(Error::BadRequest(format!(
                    "playlist index {} out of range (len {})",
                    index, len
                )));
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "play_at({}) -> \"{}\" (generation {})",
            index, track.name, generation
        );

        self.sink.reset();
        self.prepared.store(false, Ordering::SeqCst);
        self.playlist.set_position(index).await;
        self.state.set_progress(0, 0).await;

        // Raised before the prepare so clients see the jump immediately,
        // and strictly before any progress for the new position
        self.state.broadcast_event(QuaverEvent::SongChanged {
            position: index,
            track: Some(track.clone()),
            timestamp: chrono::Utc::now(),
        });

        if let Err(e) = self.sink.set_source(&track.url) {
            error!("Failed to stage \"{}\": {}", track.url, e);
            self.state.set_playback_state(PlaybackState::Idle).await;
            return Err(e);
        }

        self.sink.prepare_async(generation);
        self.state.set_playback_state(PlaybackState::Preparing).await;
        Ok(())
    }

    async fn stop_locked(&self) {
        info!("Stop command received");
        let was_playing = self.state.get_playback_state().await == PlaybackState::Playing;
        self.sink.stop();
        self.prepared.store(false, Ordering::SeqCst);
        self.state.set_playback_state(PlaybackState::Idle).await;
        self.state.set_progress(0, 0).await;
        if was_playing {
            self.emit_state_changed(false);
        }
    }

    /// Sink callback dispatch. Stale generations are dropped here, before
    /// any effect.
    async fn dispatch(&self, event: SinkEvent) {
        let _guard = self.command.lock().await;
        let current = self.generation.load(Ordering::SeqCst);
        if event.generation != current {
            debug!(
                "Dropping stale sink event {:?} (generation {}, current {})",
                event.notice, event.generation, current
            );
            return;
        }

        match event.notice {
            SinkNotice::Prepared => self.on_prepared().await,
            SinkNotice::Completed => {
                debug!("Source completed, advancing");
                self.prepared.store(false, Ordering::SeqCst);
                if let Err(e) = self.advance().await {
                    warn!("Advance after completion failed: {}", e);
                }
            }
            SinkNotice::Error(code) => {
                warn!("Sink reported error {}, advancing like completion", code);
                self.prepared.store(false, Ordering::SeqCst);
                if let Err(e) = self.advance().await {
                    warn!("Advance after sink error failed: {}", e);
                }
            }
        }
    }

    async fn on_prepared(&self) {
        self.prepared.store(true, Ordering::SeqCst);
        self.sink.start();
        self.state.set_playback_state(PlaybackState::Playing).await;
        self.emit_state_changed(true);
        self.emit_progress_snapshot().await;
    }

    /// Advance per play mode, shared by the completion and error callbacks.
    async fn advance(&self) -> Result<()> {
        let len = self.playlist.len().await;
        if len == 0 {
            self.stop_locked().await;
            return Ok(());
        }
        let current = self.playlist.position().await;
        let mode = self.state.get_play_mode().await;
        let next = next_position(current, len, mode);
        self.play_at_locked(next).await
    }

    fn emit_state_changed(&self, playing: bool) {
        self.state
            .broadcast_event(QuaverEvent::PlaybackStateChanged {
                playing,
                timestamp: chrono::Utc::now(),
            });
    }

    /// One immediate progress sample, emitted after play/pause/seek so
    /// clients need not wait for the next tick.
    async fn emit_progress_snapshot(&self) {
        let (position_ms, duration_ms) = self.progress();
        self.state.set_progress(position_ms, duration_ms).await;
        self.state.broadcast_event(QuaverEvent::PlaybackProgress {
            position_ms,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Periodic progress reporting, ticking only while Playing. Each tick
    /// takes the command mutex, so a tick never interleaves a command or
    /// sink callback mid-flight.
    async fn progress_loop(&self, period: Duration) {
        let mut tick = interval(period);
        loop {
            tick.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                debug!("Progress loop stopping");
                break;
            }
            let _guard = self.command.lock().await;
            if self.state.get_playback_state().await != PlaybackState::Playing {
                continue;
            }
            let (position_ms, duration_ms) = self.progress();
            self.state.set_progress(position_ms, duration_ms).await;
            self.state.broadcast_event(QuaverEvent::PlaybackProgress {
                position_ms,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// Advance policy: the position that follows `current` in a playlist of
/// `len` under `mode`. Callers guarantee `len > 0`.
///
/// Random draws uniformly over every position except `current` without a
/// rejection loop: draw from `0..len-1` and shift the values at or above
/// `current` up by one.
fn next_position(current: usize, len: usize, mode: PlayMode) -> usize {
    match mode {
        PlayMode::Sequential => (current + 1) % len,
        PlayMode::RepeatOne => current,
        PlayMode::Random => {
            if len <= 1 {
                return 0;
            }
            let r = rand::thread_rng().gen_range(0..len - 1);
            if r >= current {
                r + 1
            } else {
                r
            }
        }
    }
}
