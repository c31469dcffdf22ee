//! Core domain types shared by the session daemon and its clients

use crate::events::PlaybackState;
use serde::{Deserialize, Serialize};

/// A playable item identified by a stable content URL.
///
/// The numeric `id` is assigned by the track store on first persistence and
/// is `None` for catalog-fresh entries. Two persisted tracks are the same iff
/// their ids match; before persistence (or across the persistence boundary)
/// identity falls back to the content URL. Playlist dedup always compares
/// URLs via [`Track::same_source`], which is the identity that survives
/// re-persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Store-assigned row id (None until persisted)
    #[serde(default)]
    pub id: Option<i64>,

    /// Display name
    pub name: String,

    /// Artist or author display name
    pub author: String,

    /// Stable, unique content URL (track identity)
    pub url: String,

    /// Cover art URL
    #[serde(default)]
    pub cover_url: Option<String>,

    /// Lyric file URL
    #[serde(default)]
    pub lyric_url: Option<String>,

    /// Track duration in milliseconds (0 when unknown)
    #[serde(default)]
    pub duration_ms: u64,

    /// Source file size in bytes (0 when unknown)
    #[serde(default)]
    pub file_size: u64,

    /// Catalog-reported play count (display datum, not persisted)
    #[serde(default)]
    pub play_count: u32,

    /// Liked flag, joined from the liked relation on load
    #[serde(default)]
    pub liked: bool,

    /// Unix seconds when the store first saw this track
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Track {
    /// Build a bare track from its identity fields.
    pub fn new(name: impl Into<String>, author: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            author: author.into(),
            url: url.into(),
            cover_url: None,
            lyric_url: None,
            duration_ms: 0,
            file_size: 0,
            play_count: 0,
            liked: false,
            created_at: None,
        }
    }

    /// Identity test used for playlist ordering and dedup: same content URL.
    pub fn same_source(&self, other: &Track) -> bool {
        self.url == other.url
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.same_source(other),
        }
    }
}

impl Eq for Track {}

impl std::hash::Hash for Track {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // The store keys ids by URL, so hashing the URL stays consistent
        // with both arms of the eq impl.
        self.url.hash(state);
    }
}

/// Policy governing which track follows the current one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Advance to the next position, wrapping at the end
    Sequential,
    /// Advance to a uniformly drawn position other than the current one
    Random,
    /// Replay the current position on natural completion
    RepeatOne,
}

impl Default for PlayMode {
    fn default() -> Self {
        PlayMode::Sequential
    }
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayMode::Sequential => write!(f, "sequential"),
            PlayMode::Random => write!(f, "random"),
            PlayMode::RepeatOne => write!(f, "repeat_one"),
        }
    }
}

impl std::str::FromStr for PlayMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(PlayMode::Sequential),
            "random" => Ok(PlayMode::Random),
            "repeat_one" => Ok(PlayMode::RepeatOne),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown play mode: {}",
                other
            ))),
        }
    }
}

/// Wire snapshot of the session playlist, exchanged on attach sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    /// Ordered playlist contents
    pub tracks: Vec<Track>,
    /// Zero-based cursor (0 for an empty playlist)
    #[serde(default)]
    pub position: usize,
}

/// Wire snapshot of the host's playback state, pulled on attach sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// True iff the engine is currently playing
    pub playing: bool,
    /// Full engine state
    pub state: PlaybackState,
    /// Current play mode
    pub mode: PlayMode,
    /// Playlist cursor
    pub position: usize,
    /// Playlist length
    pub playlist_length: usize,
}
