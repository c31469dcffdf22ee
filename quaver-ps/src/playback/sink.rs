//! Audio sink seam between the engine and whatever produces sound
//!
//! The engine drives exactly one `AudioSink` and never assumes a platform
//! audio stack. Sinks answer asynchronous work (preparation, natural
//! completion, failures) on an unbounded channel handed over at
//! construction, tagging every callback with the prepare generation so the
//! engine can discard events from superseded sources.
//!
//! `SilenceSink` is the headless implementation the daemon runs with: a
//! wall-clock player that produces no audio but honors the full lifecycle.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Asynchronous outcome a sink reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkNotice {
    /// The staged source finished preparing and can be started
    Prepared,
    /// The source played through to its natural end
    Completed,
    /// The sink failed asynchronously (carries the platform error code)
    Error(i32),
}

/// One sink callback, tagged with the prepare generation it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    pub generation: u64,
    pub notice: SinkNotice,
}

/// Contract between the playback engine and an audio backend.
///
/// All methods are callable from async context and must not block. After
/// `prepare_async(g)` the sink sends exactly one `Prepared` or `Error`
/// event carrying `g`; `Completed` may follow at most once while that
/// source is current. After `release()` the sink sends nothing.
pub trait AudioSink: Send + Sync {
    /// Drop any staged source and return to the unconfigured state.
    fn reset(&self);

    /// Stage a source URL. Only synchronous validation happens here.
    fn set_source(&self, url: &str) -> Result<()>;

    /// Begin asynchronous preparation of the staged source.
    fn prepare_async(&self, generation: u64);

    /// Begin or resume playback of a prepared source.
    fn start(&self);

    /// Halt playback, keeping position and the prepared source.
    fn pause(&self);

    /// Halt playback and drop the prepared state.
    fn stop(&self);

    /// Jump to an absolute position in the prepared source.
    fn seek_to(&self, position_ms: u64);

    fn is_playing(&self) -> bool;

    /// Current position in the source, frozen while paused.
    fn position_ms(&self) -> u64;

    /// Total source duration, 0 until known.
    fn duration_ms(&self) -> u64;

    /// Final teardown; the sink is unusable afterwards.
    fn release(&self);
}

/// Clock-driven sink that plays silence.
///
/// Accepts any non-empty source URL, prepares instantly (but still answers
/// on the event channel like a real backend), and advances its position by
/// wall-clock time while started. It never reports a duration and never
/// completes naturally, so playback holds on the current track until a
/// command moves it.
pub struct SilenceSink {
    events: mpsc::UnboundedSender<SinkEvent>,
    origin: Instant,
    has_source: AtomicBool,
    prepared: AtomicBool,
    playing: AtomicBool,
    released: AtomicBool,
    /// Position accumulated across completed play runs
    accrued_ms: AtomicU64,
    /// Clock reading (ms since origin) when the current run started
    run_started_ms: AtomicU64,
}

impl SilenceSink {
    pub fn new(events: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self {
            events,
            origin: Instant::now(),
            has_source: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            released: AtomicBool::new(false),
            accrued_ms: AtomicU64::new(0),
            run_started_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Fold the elapsed run time into the accrued position.
    fn settle_run(&self) {
        if self.playing.swap(false, Ordering::SeqCst) {
            let elapsed = self.now_ms() - self.run_started_ms.load(Ordering::SeqCst);
            self.accrued_ms.fetch_add(elapsed, Ordering::SeqCst);
        }
    }
}

impl AudioSink for SilenceSink {
    fn reset(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.prepared.store(false, Ordering::SeqCst);
        self.has_source.store(false, Ordering::SeqCst);
        self.accrued_ms.store(0, Ordering::SeqCst);
    }

    fn set_source(&self, url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(Error::Sink("cannot stage an empty source URL".to_string()));
        }
        debug!("Staging source: {}", url);
        self.has_source.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn prepare_async(&self, generation: u64) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        let staged = self.has_source.load(Ordering::SeqCst);
        if staged {
            self.prepared.store(true, Ordering::SeqCst);
            self.accrued_ms.store(0, Ordering::SeqCst);
        }
        let tx = self.events.clone();
        tokio::spawn(async move {
            // Answer off the caller's stack, like a real backend would
            tokio::task::yield_now().await;
            let notice = if staged {
                SinkNotice::Prepared
            } else {
                SinkNotice::Error(-1)
            };
            let _ = tx.send(SinkEvent { generation, notice });
        });
    }

    fn start(&self) {
        if self.released.load(Ordering::SeqCst) || !self.prepared.load(Ordering::SeqCst) {
            return;
        }
        if !self.playing.swap(true, Ordering::SeqCst) {
            self.run_started_ms.store(self.now_ms(), Ordering::SeqCst);
        }
    }

    fn pause(&self) {
        self.settle_run();
    }

    fn stop(&self) {
        self.settle_run();
        self.prepared.store(false, Ordering::SeqCst);
        self.accrued_ms.store(0, Ordering::SeqCst);
    }

    fn seek_to(&self, position_ms: u64) {
        if !self.prepared.load(Ordering::SeqCst) {
            return;
        }
        self.accrued_ms.store(position_ms, Ordering::SeqCst);
        if self.playing.load(Ordering::SeqCst) {
            self.run_started_ms.store(self.now_ms(), Ordering::SeqCst);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst)
    }

    fn position_ms(&self) -> u64 {
        let accrued = self.accrued_ms.load(Ordering::SeqCst);
        if self.playing.load(Ordering::SeqCst) {
            accrued + (self.now_ms() - self.run_started_ms.load(Ordering::SeqCst))
        } else {
            accrued
        }
    }

    fn duration_ms(&self) -> u64 {
        0
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}
