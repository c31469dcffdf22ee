//! Event types for the Quaver event system
//!
//! Provides the shared event definitions and the EventBus used to fan them
//! out to in-process subscribers and SSE clients.

use crate::types::{PlayMode, Track};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback engine state
///
/// `Error` is deliberately absent: a playback error is a transient signal
/// that resolves into an auto-advance, never a state a client can observe
/// the engine stuck in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No track loaded
    Idle,
    /// Asynchronous prepare outstanding
    Preparing,
    /// Sink is producing audio
    Playing,
    /// Prepared and halted, position retained
    Paused,
}

impl PlaybackState {
    /// True for the one state in which progress ticks are emitted.
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Preparing => write!(f, "preparing"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Quaver event types
///
/// Events are broadcast via [`EventBus`] and serialized for SSE transmission
/// with the variant name as the SSE event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QuaverEvent {
    /// Playback started or halted
    ///
    /// Triggers:
    /// - SSE: update play/pause controls
    PlaybackStateChanged {
        /// True iff the engine is now playing
        playing: bool,
        /// When the transition occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current playlist position changed
    ///
    /// Raised synchronously inside `play_at`, before the asynchronous
    /// prepare begins, so clients can reflect intent immediately. Always
    /// precedes any progress event for the same position.
    SongChanged {
        /// New zero-based playlist position
        position: usize,
        /// Track now at the cursor
        track: Option<Track>,
        /// When the change was commanded
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic progress report while playing
    ///
    /// Emitted on a one second tick and once immediately on play/pause.
    /// Never emitted while paused or stopped.
    PlaybackProgress {
        /// Current position in milliseconds
        position_ms: u64,
        /// Total duration in milliseconds (0 when the sink cannot tell)
        duration_ms: u64,
        /// When the sample was taken
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playlist contents or cursor changed
    ///
    /// Triggers:
    /// - SSE: refresh playlist views
    PlaylistChanged {
        /// New playlist length
        length: usize,
        /// New cursor position
        position: usize,
        /// When the mutation committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Play mode changed
    PlayModeChanged {
        /// Mode now in effect for the next advance decision
        mode: PlayMode,
        /// When the mode changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Snapshot sent to each new SSE subscriber before live events
    InitialState {
        /// Engine state at subscribe time
        state: PlaybackState,
        /// Play mode at subscribe time
        mode: PlayMode,
        /// Playlist cursor
        position: usize,
        /// Playlist length
        playlist_length: usize,
        /// Position of the current track in milliseconds
        position_ms: u64,
        /// Duration of the current track in milliseconds
        duration_ms: u64,
        /// When the snapshot was taken
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QuaverEvent {
    /// Stable name used as the SSE event field.
    pub fn event_name(&self) -> &'static str {
        match self {
            QuaverEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            QuaverEvent::SongChanged { .. } => "SongChanged",
            QuaverEvent::PlaybackProgress { .. } => "PlaybackProgress",
            QuaverEvent::PlaylistChanged { .. } => "PlaylistChanged",
            QuaverEvent::PlayModeChanged { .. } => "PlayModeChanged",
            QuaverEvent::InitialState { .. } => "InitialState",
        }
    }
}

/// Broadcast hub for [`QuaverEvent`]s
///
/// Thin wrapper over `tokio::sync::broadcast`: subscribers receive every
/// event emitted after they subscribe, in emission order. A subscriber that
/// lags beyond the channel capacity loses the oldest events but never sees
/// them reordered.
pub struct EventBus {
    tx: broadcast::Sender<QuaverEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<QuaverEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the subscriber count reached.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: QuaverEvent,
    ) -> Result<usize, broadcast::error::SendError<QuaverEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case of no subscribers listening.
    pub fn emit_lossy(&self, event: QuaverEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(QuaverEvent::SongChanged {
            position: 0,
            track: None,
            timestamp: chrono::Utc::now(),
        });
        bus.emit_lossy(QuaverEvent::PlaybackStateChanged {
            playing: true,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            QuaverEvent::SongChanged { position, .. } => assert_eq!(position, 0),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            QuaverEvent::PlaybackStateChanged { playing, .. } => assert!(playing),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error_in_lossy_mode() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit_lossy(QuaverEvent::PlaybackProgress {
            position_ms: 1000,
            duration_ms: 180000,
            timestamp: chrono::Utc::now(),
        });
        assert!(bus
            .emit(QuaverEvent::PlaybackStateChanged {
                playing: false,
                timestamp: chrono::Utc::now(),
            })
            .is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = QuaverEvent::PlaybackStateChanged {
            playing: true,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PlaybackStateChanged\""));
        assert!(json.contains("\"playing\":true"));
        assert_eq!(event.event_name(), "PlaybackStateChanged");
    }
}
