//! # Quaver Common Library
//!
//! Shared code for the Quaver playback session modules including:
//! - Core types (Track, PlayMode, wire snapshots)
//! - Event types (QuaverEvent enum) and the EventBus
//! - Session client binding (attach / reconnect / event subscription)
//! - Configuration discovery
//! - Generic SQLite schema plumbing

pub mod client;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod types;

pub use client::SessionClient;
pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, QuaverEvent};
pub use types::{PlayMode, PlaylistSnapshot, StateSnapshot, Track};
