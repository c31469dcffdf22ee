//! HTTP control surface for the playback session daemon
//!
//! REST endpoints for playback, playlist, track, and catalog control plus
//! the SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, run, AppContext};
