//! Playlist manager: the single authority over the ordered track list
//!
//! Holds the canonical in-memory playlist plus cursor; every mutation is
//! compute, persist, commit: the new contents are written through the
//! track store first and adopted in memory only after the store commit,
//! so a persistence failure leaves both views at the prior state. All
//! readers get snapshot copies.
//!
//! Cursor invariants: 0 for an empty playlist, otherwise within
//! `[0, len)`. Removing an entry before the cursor shifts it down by one;
//! removing the cursor entry clamps it to the last valid index.

use crate::db::TrackStore;
use crate::error::Result;
use crate::state::SharedState;
use quaver_common::events::QuaverEvent;
use quaver_common::Track;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct PlaylistInner {
    tracks: Vec<Track>,
    position: usize,
}

/// In-memory ordered playlist with write-through persistence
pub struct PlaylistManager {
    inner: RwLock<PlaylistInner>,
    store: Arc<TrackStore>,
    state: Arc<SharedState>,
}

impl PlaylistManager {
    pub fn new(store: Arc<TrackStore>, state: Arc<SharedState>) -> Self {
        Self {
            inner: RwLock::new(PlaylistInner::default()),
            store,
            state,
        }
    }

    /// Fill memory from the persisted ordering, cursor at 0.
    pub async fn load(&self) -> Result<()> {
        let tracks = self.store.load_playlist().await?;
        let mut inner = self.inner.write().await;
        debug!("Loaded {} playlist tracks from store", tracks.len());
        inner.tracks = tracks;
        inner.position = 0;
        Ok(())
    }

    /// Replace the whole playlist; the cursor is clamped into range.
    pub async fn set_playlist(&self, tracks: Vec<Track>, position: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        let position = clamp_position(position, tracks.len());
        let tracks = self.persist(tracks).await?;
        inner.tracks = tracks;
        inner.position = position;
        let (length, position) = (inner.tracks.len(), inner.position);
        drop(inner);
        self.notify(length, position);
        Ok(())
    }

    /// Append a track unless its URL is already present.
    ///
    /// Returns false for the duplicate no-op.
    pub async fn add_to_end(&self, track: Track) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.tracks.iter().any(|t| t.same_source(&track)) {
            debug!("Track already in playlist, not adding: {}", track.url);
            return Ok(false);
        }

        let mut next = inner.tracks.clone();
        next.push(track);
        let next = self.persist(next).await?;
        inner.tracks = next;
        let (length, position) = (inner.tracks.len(), inner.position);
        drop(inner);
        self.notify(length, position);
        Ok(true)
    }

    /// The "play this now" entry point: dedup by URL, insert at the front,
    /// cursor to 0.
    pub async fn add_and_move_to_front(&self, track: Track) -> Result<()> {
        let mut inner = self.inner.write().await;
        let mut next = inner.tracks.clone();
        next.retain(|t| !t.same_source(&track));
        next.insert(0, track);
        let next = self.persist(next).await?;
        inner.tracks = next;
        inner.position = 0;
        let (length, position) = (inner.tracks.len(), inner.position);
        drop(inner);
        self.notify(length, position);
        Ok(())
    }

    /// Remove the entry at `index`; false + unchanged when out of range.
    pub async fn remove_at(&self, index: usize) -> Result<bool> {
        let mut inner = self.inner.write().await;
        self.remove_locked(&mut inner, index).await
    }

    /// Remove a track by content URL; false when not present.
    pub async fn remove_track(&self, track: &Track) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.tracks.iter().position(|t| t.same_source(track)) {
            Some(index) => self.remove_locked(&mut inner, index).await,
            None => Ok(false),
        }
    }

    async fn remove_locked(&self, inner: &mut PlaylistInner, index: usize) -> Result<bool> {
        if index >= inner.tracks.len() {
            warn!(
                "Ignoring out-of-range removal: index {} of {}",
                index,
                inner.tracks.len()
            );
            return Ok(false);
        }

        let mut next = inner.tracks.clone();
        next.remove(index);

        let mut position = inner.position;
        if index < position {
            position -= 1;
        } else if index == position {
            position = clamp_position(position, next.len());
        }

        let next = self.persist(next).await?;
        inner.tracks = next;
        inner.position = position;
        let (length, position) = (inner.tracks.len(), inner.position);
        self.notify(length, position);
        Ok(true)
    }

    /// Move the cursor; out-of-range requests are logged no-ops.
    pub async fn set_position(&self, index: usize) -> bool {
        let mut inner = self.inner.write().await;
        if inner.tracks.is_empty() {
            inner.position = 0;
            return index == 0;
        }
        if index >= inner.tracks.len() {
            warn!(
                "Ignoring out-of-range cursor move: index {} of {}",
                index,
                inner.tracks.len()
            );
            return false;
        }
        inner.position = index;
        let (length, position) = (inner.tracks.len(), inner.position);
        drop(inner);
        self.notify(length, position);
        true
    }

    /// Empty the playlist and reset the cursor.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        self.persist(Vec::new()).await?;
        inner.tracks.clear();
        inner.position = 0;
        drop(inner);
        self.notify(0, 0);
        Ok(())
    }

    pub async fn current_track(&self) -> Option<Track> {
        let inner = self.inner.read().await;
        inner.tracks.get(inner.position).cloned()
    }

    pub async fn track_at(&self, index: usize) -> Option<Track> {
        self.inner.read().await.tracks.get(index).cloned()
    }

    pub async fn position(&self) -> usize {
        self.inner.read().await.position
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.tracks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tracks.is_empty()
    }

    pub async fn is_valid_index(&self, index: usize) -> bool {
        index < self.inner.read().await.tracks.len()
    }

    /// Snapshot copy of contents and cursor.
    pub async fn snapshot(&self) -> (Vec<Track>, usize) {
        let inner = self.inner.read().await;
        (inner.tracks.clone(), inner.position)
    }

    /// Write the candidate contents through the store and adopt the ids
    /// the store assigned.
    async fn persist(&self, mut tracks: Vec<Track>) -> Result<Vec<Track>> {
        let ids = self.store.save_playlist(&tracks).await?;
        for (track, id) in tracks.iter_mut().zip(ids) {
            track.id = Some(id);
        }
        Ok(tracks)
    }

    fn notify(&self, length: usize, position: usize) {
        self.state.broadcast_event(QuaverEvent::PlaylistChanged {
            length,
            position,
            timestamp: chrono::Utc::now(),
        });
    }
}

fn clamp_position(position: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        position.min(len - 1)
    }
}
