//! Audio output abstraction
//!
//! A [`VoiceSink`] stands for one audio destination (a voice channel, the
//! local speakers) and spawns one [`OutputProcess`] per request. The
//! player keeps at most one process alive: starting a new entry kills the
//! previous process first.
//!
//! A process reports its fate through a [`watch`] channel of
//! [`ProcessPhase`]. The player treats any terminal phase as the entry
//! completing: a faulted process logs a warning and playback moves on,
//! exactly like a clean exit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use voxentry::{Entry, LocalResource};

use crate::error::{PlayerError, Result};

mod command;
mod simulated;

pub use command::{CommandSink, DEFAULT_PLAYER_BINARY};
pub use simulated::{SimulatedSink, SpawnRecord};

/// One playback order, self-contained
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    /// What to play: a downloaded file or a direct stream URL
    pub source: LocalResource,
    /// Absolute start offset in seconds
    pub start: f64,
    /// Seconds to play from `start`; `None` plays to the natural end
    pub length: Option<f64>,
    /// Volume in `(0, 1]`
    pub volume: f32,
    /// Endless live source
    pub stream: bool,
    /// Display title, for logs
    pub title: String,
}

impl PlaybackRequest {
    /// Builds the request for an entry, resuming at `resume_from` when set
    ///
    /// The entry must be materialized first.
    pub fn for_entry(entry: &Entry, volume: f32, resume_from: Option<f64>) -> Result<Self> {
        let source = entry.resource().ok_or(PlayerError::NotReady)?;
        let stream = entry.is_stream();
        let start = resume_from
            .unwrap_or_else(|| entry.start_seconds().unwrap_or(0.0))
            .max(0.0);
        let length = if stream || entry.duration() <= 0.0 {
            None
        } else {
            Some((entry.effective_end() - start).max(0.0))
        };
        Ok(Self {
            source,
            start,
            length,
            volume,
            stream,
            title: entry.title(),
        })
    }
}

/// Why an output process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Ran to the end, or was told to stop
    Clean,
    /// Crashed or exited with an error; carries the best available detail
    Faulted(String),
}

/// Life cycle of an output process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessPhase {
    Running,
    Paused,
    Finished(ProcessOutcome),
}

/// A single running audio output
///
/// All controls are idempotent after the process finished; they become
/// no-ops or report [`PlayerError::Sink`].
#[async_trait]
pub trait OutputProcess: Send + Sync {
    /// Suspends audio without completing the entry
    async fn pause(&self) -> Result<()>;

    /// Resumes after [`OutputProcess::pause`]
    async fn resume(&self) -> Result<()>;

    /// Terminates playback; reported as a clean finish
    async fn stop(&self);

    /// Applies a new volume to the running output
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Current position within the media, in seconds, start offset
    /// included
    fn progress(&self) -> f64;

    /// Channel observing the process phase
    fn watch_phase(&self) -> watch::Receiver<ProcessPhase>;
}

/// An audio destination able to play one request at a time
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Starts playing `request` and returns the process handle
    async fn spawn(&self, request: PlaybackRequest) -> Result<Arc<dyn OutputProcess>>;

    /// Human-readable destination name, for logs
    fn describe(&self) -> String;
}

/// Media position clock shared by the sink implementations
///
/// Counts media seconds from an absolute base, `scale` media seconds per
/// real second, and stops counting while frozen.
pub(crate) struct PositionClock {
    base: f64,
    anchor: Option<std::time::Instant>,
    scale: f64,
}

impl PositionClock {
    pub(crate) fn running(base: f64, scale: f64) -> Self {
        Self {
            base,
            anchor: Some(std::time::Instant::now()),
            scale,
        }
    }

    pub(crate) fn now(&self) -> f64 {
        let running = self
            .anchor
            .map(|anchor| anchor.elapsed().as_secs_f64() * self.scale)
            .unwrap_or(0.0);
        self.base + running
    }

    pub(crate) fn scale(&self) -> f64 {
        self.scale
    }

    pub(crate) fn freeze(&mut self) {
        self.base = self.now();
        self.anchor = None;
    }

    pub(crate) fn unfreeze(&mut self) {
        self.anchor = Some(std::time::Instant::now());
    }
}
