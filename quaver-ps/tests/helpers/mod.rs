//! Test helper modules for quaver-ps integration tests
//!
//! Provides reusable test infrastructure:
//! - TestServer: in-memory quaver-ps instance behind the real router
//! - EventStream: event bus subscription with timeout helpers

pub mod test_server;

pub use test_server::{test_track, EventStream, TestServer};
