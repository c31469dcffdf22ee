//! Playback engine and the audio sink seam

pub mod engine;
pub mod sink;

pub use engine::PlaybackEngine;
pub use sink::{AudioSink, SilenceSink, SinkEvent, SinkNotice};
