//! Shared playback state
//!
//! Thread-safe shared state for coordination between the playlist manager,
//! playback engine and HTTP surface.

use quaver_common::events::{EventBus, QuaverEvent};
use quaver_common::PlayMode;
use tokio::sync::RwLock;

pub use quaver_common::events::PlaybackState;

/// Progress of the track currently loaded in the sink
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentProgress {
    /// Current position in milliseconds
    pub position_ms: u64,
    /// Total duration in milliseconds (0 when the sink cannot tell)
    pub duration_ms: u64,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct SharedState {
    /// Current playback engine state
    pub playback_state: RwLock<PlaybackState>,

    /// Play mode consulted on each advance decision
    pub play_mode: RwLock<PlayMode>,

    /// Progress of the current track
    pub progress: RwLock<CurrentProgress>,

    /// Event broadcaster for in-process subscribers and SSE
    pub events: EventBus,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self {
            playback_state: RwLock::new(PlaybackState::Idle),
            play_mode: RwLock::new(PlayMode::default()),
            progress: RwLock::new(CurrentProgress::default()),
            events: EventBus::new(100),
        }
    }

    /// Broadcast an event to all listeners, no receivers is fine
    pub fn broadcast_event(&self, event: QuaverEvent) {
        self.events.emit_lossy(event);
    }

    /// Get current playback state
    pub async fn get_playback_state(&self) -> PlaybackState {
        *self.playback_state.read().await
    }

    /// Set playback state
    pub async fn set_playback_state(&self, state: PlaybackState) {
        *self.playback_state.write().await = state;
    }

    /// Get current play mode
    pub async fn get_play_mode(&self) -> PlayMode {
        *self.play_mode.read().await
    }

    /// Set play mode
    pub async fn set_play_mode(&self, mode: PlayMode) {
        *self.play_mode.write().await = mode;
    }

    /// Get progress of the current track
    pub async fn get_progress(&self) -> CurrentProgress {
        *self.progress.read().await
    }

    /// Set progress of the current track
    pub async fn set_progress(&self, position_ms: u64, duration_ms: u64) {
        *self.progress.write().await = CurrentProgress {
            position_ms,
            duration_ms,
        };
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_playback_state() {
        let state = SharedState::new();

        // Nothing is loaded at boot
        assert_eq!(state.get_playback_state().await, PlaybackState::Idle);

        state.set_playback_state(PlaybackState::Playing).await;
        assert_eq!(state.get_playback_state().await, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_play_mode() {
        let state = SharedState::new();

        assert_eq!(state.get_play_mode().await, PlayMode::Sequential);

        state.set_play_mode(PlayMode::RepeatOne).await;
        assert_eq!(state.get_play_mode().await, PlayMode::RepeatOne);
    }

    #[tokio::test]
    async fn test_progress() {
        let state = SharedState::new();

        let progress = state.get_progress().await;
        assert_eq!(progress.position_ms, 0);
        assert_eq!(progress.duration_ms, 0);

        state.set_progress(1000, 180_000).await;
        let progress = state.get_progress().await;
        assert_eq!(progress.position_ms, 1000);
        assert_eq!(progress.duration_ms, 180_000);
    }
}
