//! Database access for the playback session
//!
//! The schema module owns DDL and self-healing; the store module is the
//! sole writer of the track/liked/playlist relations; settings is the
//! key-value runtime configuration table.

pub mod schema;
pub mod settings;
pub mod store;

pub use store::TrackStore;
