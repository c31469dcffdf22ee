//! # Quaver Playback Session (quaver-ps)
//!
//! Playback session coordinator: owns the persistent track store, the
//! playlist and its cursor, and the playback engine driving an audio sink,
//! and exposes them over HTTP/SSE so display clients can attach, control
//! playback, and stay in sync.

pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod playlist;
pub mod session;
pub mod state;

pub use error::{Error, Result};
pub use session::Session;
pub use state::SharedState;
