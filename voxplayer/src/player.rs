//! Playback state machine.
//!
//! A [`Player`] sits between a [`Queue`] and a [`VoiceSink`]. It owns at most
//! one output process at a time, supervises its lifecycle from a background
//! task, and walks the queue forward whenever playback ends. All transitions
//! funnel through a single async lock so that concurrent `play`/`skip`/`stop`
//! calls cannot interleave half-finished state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use voxentry::Entry;
use voxqueue::{EventBus, EventKind, ListenerId, PipelineEvent, Placement, Queue};

use crate::error::{PlayerError, Result};
use crate::sink::{OutputProcess, PlaybackRequest, ProcessOutcome, ProcessPhase, VoiceSink};
use crate::state::{PlayerState, RepeatMode};

/// Initial volume when the caller does not configure one.
pub const DEFAULT_VOLUME: f32 = 0.3;

/// How long to wait after an entry lands in an idle queue before starting it.
pub const DEFAULT_AUTOPLAY_DELAY: Duration = Duration::from_secs(2);

/// Tunable knobs for a [`Player`].
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Starting volume, in `(0, 1]`.
    pub volume: f32,
    /// Grace period before autoplay reacts to a queued entry.
    pub autoplay_delay: Duration,
    /// Delete downloaded files once their entry finished playing.
    pub cleanup_finished: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            autoplay_delay: DEFAULT_AUTOPLAY_DELAY,
            cleanup_finished: false,
        }
    }
}

/// The entry currently on air together with its output process.
#[derive(Clone)]
struct CurrentPlayback {
    entry: Arc<Entry>,
    process: Arc<dyn OutputProcess>,
}

/// Drives playback for one voice destination.
pub struct Player {
    queue: Arc<Queue>,
    bus: Arc<EventBus>,
    sink: StdRwLock<Arc<dyn VoiceSink>>,
    state: StdRwLock<PlayerState>,
    repeat: StdRwLock<RepeatMode>,
    /// Set by [`Player::skip`] so the completion handler bypasses
    /// single-entry repeat exactly once.
    skip_repeat: AtomicBool,
    volume: StdRwLock<f32>,
    current: StdRwLock<Option<CurrentPlayback>>,
    /// Bumped whenever the active process is replaced or discarded on
    /// purpose. Completion reports stamped with an older generation are
    /// ignored, which keeps stale supervisor tasks from double-advancing.
    generation: AtomicU64,
    play_lock: AsyncMutex<()>,
    options: PlayerOptions,
}

impl Player {
    pub fn new(
        queue: Arc<Queue>,
        bus: Arc<EventBus>,
        sink: Arc<dyn VoiceSink>,
        options: PlayerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            bus,
            sink: StdRwLock::new(sink),
            state: StdRwLock::new(PlayerState::Stopped),
            repeat: StdRwLock::new(RepeatMode::None),
            skip_repeat: AtomicBool::new(false),
            volume: StdRwLock::new(options.volume),
            current: StdRwLock::new(None),
            generation: AtomicU64::new(0),
            play_lock: AsyncMutex::new(()),
            options,
        })
    }

    /// Start playback when the queue yields an entry while the player idles.
    ///
    /// The listener holds only a weak handle, so dropping the player also
    /// retires autoplay. Returns the listener id for explicit removal.
    pub fn connect_autoplay(self: &Arc<Self>) -> ListenerId {
        let weak = Arc::downgrade(self);
        let delay = self.options.autoplay_delay;
        self.bus.on_async(EventKind::EntryAdded, move |_event| {
            let weak = weak.clone();
            async move {
                let Some(player) = weak.upgrade() else {
                    return Ok(());
                };
                if !player.is_stopped() {
                    return Ok(());
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                // Someone may have started playback during the grace period.
                if player.is_stopped() {
                    player.play().await?;
                }
                Ok(())
            }
        })
    }

    // ---- Accessors ------------------------------------------------------

    pub fn state(&self) -> PlayerState {
        *self.state.read().unwrap()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlayerState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PlayerState::Stopped
    }

    pub fn is_dead(&self) -> bool {
        self.state() == PlayerState::Dead
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        *self.repeat.read().unwrap()
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        *self.repeat.write().unwrap() = mode;
    }

    /// Advance repeat to its next mode and return the new one.
    pub fn cycle_repeat(&self) -> RepeatMode {
        let mut repeat = self.repeat.write().unwrap();
        *repeat = repeat.cycled();
        *repeat
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn current_entry(&self) -> Option<Arc<Entry>> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|current| Arc::clone(&current.entry))
    }

    /// Seconds into the current entry, `0.0` when nothing plays.
    pub fn progress(&self) -> f64 {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|current| current.process.progress())
            .unwrap_or(0.0)
    }

    /// Seconds left in the current entry. `None` for streams and idle players.
    pub fn remaining(&self) -> Option<f64> {
        let current = self.current.read().unwrap().clone()?;
        if current.entry.is_stream() {
            return None;
        }
        let end = current.entry.effective_end();
        Some((end - current.process.progress()).max(0.0))
    }

    pub fn volume(&self) -> f32 {
        *self.volume.read().unwrap()
    }

    pub fn sink_description(&self) -> String {
        self.sink.read().unwrap().describe()
    }

    // ---- Playback control -----------------------------------------------

    /// Start playing from the queue.
    ///
    /// Only acts from `Stopped`; while playing, paused or dead it is a
    /// no-op. An empty queue leaves the player stopped.
    pub async fn play(self: &Arc<Self>) -> Result<()> {
        self.advance(false).await
    }

    /// Materialize `entry` and play it immediately, replacing whatever is on
    /// air without touching the queue.
    pub async fn play_entry(self: &Arc<Self>, entry: Arc<Entry>) -> Result<()> {
        if self.is_dead() {
            return Err(PlayerError::Dead);
        }
        entry.ready().await?;
        let _guard = self.play_lock.lock().await;
        if self.is_dead() {
            return Err(PlayerError::Dead);
        }
        self.start_entry(entry, None).await
    }

    /// Pause the current entry. Streams cannot hold a position, so pausing a
    /// stream stops the player instead. Ignored in every other state.
    pub async fn pause(&self) -> Result<()> {
        if !self.is_playing() {
            debug!(state = %self.state(), "pause ignored");
            return Ok(());
        }
        let current = self.current.read().unwrap().clone();
        let Some(current) = current else {
            *self.state.write().unwrap() = PlayerState::Paused;
            return Ok(());
        };
        if current.entry.is_stream() {
            info!(title = %current.entry.title(), "streams cannot pause, stopping");
            self.stop().await;
            return Ok(());
        }
        current.process.pause().await?;
        *self.state.write().unwrap() = PlayerState::Paused;
        self.bus.emit(PipelineEvent::Pause {
            entry: current.entry,
        });
        Ok(())
    }

    /// Resume a paused entry. When the paused process is gone or refuses to
    /// continue, the entry is restarted from its held position instead.
    /// Ignored while stopped or dead.
    pub async fn resume(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            PlayerState::Paused => {
                let current = self.current.read().unwrap().clone();
                let Some(current) = current else {
                    // Paused without a process: fall back to a fresh start.
                    *self.state.write().unwrap() = PlayerState::Stopped;
                    return self.advance(false).await;
                };
                if let Err(error) = current.process.resume().await {
                    warn!(
                        title = %current.entry.title(),
                        "output would not resume, replaying from held position: {error}"
                    );
                    let position = current.process.progress();
                    let _guard = self.play_lock.lock().await;
                    return self.start_entry(current.entry, Some(position)).await;
                }
                *self.state.write().unwrap() = PlayerState::Playing;
                self.bus.emit(PipelineEvent::Resume {
                    entry: current.entry,
                });
                Ok(())
            }
            PlayerState::Stopped | PlayerState::Dead => {
                debug!(state = %self.state(), "resume ignored");
                Ok(())
            }
            from => Err(PlayerError::InvalidTransition {
                from,
                action: "resume",
            }),
        }
    }

    /// Force the current entry to complete and move on.
    ///
    /// The output process is told to stop and its completion flows through
    /// the normal supervision path, so history, events and queue advancement
    /// all behave as if the entry ended naturally. Under single-entry repeat
    /// the skipped entry is not re-queued.
    pub async fn skip(&self) -> Result<()> {
        if self.is_dead() {
            debug!("skip on a dead player, ignored");
            return Ok(());
        }
        let process = self
            .current
            .read()
            .unwrap()
            .as_ref()
            .map(|current| Arc::clone(&current.process));
        let Some(process) = process else {
            return Ok(());
        };
        debug!("skip requested, forcing completion");
        self.skip_repeat.store(true, Ordering::SeqCst);
        process.stop().await;
        Ok(())
    }

    /// Stop playback and discard the current entry. The queue is untouched.
    pub async fn stop(&self) {
        if self.is_dead() {
            return;
        }
        self.halt().await;
    }

    /// Tear the player down for good. The queue is drained, every bus
    /// listener is detached, later transport calls are ignored and
    /// starting anything new fails with [`PlayerError::Dead`].
    pub async fn kill(&self) {
        if self.is_dead() {
            return;
        }
        *self.state.write().unwrap() = PlayerState::Dead;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.current.write().unwrap().take();
        if let Some(previous) = previous {
            previous.process.stop().await;
        }
        let drained = self.queue.clear();
        self.bus.clear();
        info!(drained, "player killed");
    }

    /// Jump to `seconds` within the current entry.
    ///
    /// Ignored when nothing is loaded. Seeking at or past the end (or past
    /// the trimmed end) skips instead. The jump target becomes the entry's
    /// start offset, so replaying it later resumes from the same spot.
    pub async fn seek(self: &Arc<Self>, seconds: f64) -> Result<()> {
        if self.is_dead() {
            debug!("seek on a dead player, ignored");
            return Ok(());
        }
        let current = self.current.read().unwrap().clone();
        let Some(current) = current else {
            debug!(seconds, "seek with nothing loaded, ignored");
            return Ok(());
        };
        let entry = current.entry;
        let past_end = (entry.duration() > 0.0 && seconds >= entry.duration())
            || entry.is_stream()
            || entry
                .end_seconds()
                .is_some_and(|end| seconds >= end);
        if past_end {
            debug!(seconds, "seek target beyond the end, skipping");
            return self.skip().await;
        }
        let seconds = seconds.max(0.0);
        entry.set_start(seconds)?;
        debug!(seconds, title = %entry.title(), "seeking");
        let _guard = self.play_lock.lock().await;
        self.start_entry(entry, None).await
    }

    /// Change the volume, effective immediately. Valid range is `(0, 1]`.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(volume > 0.0 && volume <= 1.0) {
            return Err(PlayerError::InvalidVolume(volume));
        }
        *self.volume.write().unwrap() = volume;
        let process = self
            .current
            .read()
            .unwrap()
            .as_ref()
            .map(|current| Arc::clone(&current.process));
        if let Some(process) = process {
            process.set_volume(volume).await?;
        }
        debug!(volume, "volume changed");
        Ok(())
    }

    /// Swap the voice output. Playback continues on the new sink from the
    /// position it had reached on the old one.
    pub async fn reload_voice(self: &Arc<Self>, sink: Arc<dyn VoiceSink>) -> Result<()> {
        info!(sink = %sink.describe(), "voice output replaced");
        *self.sink.write().unwrap() = sink;
        let current = self.current.read().unwrap().clone();
        let Some(current) = current else {
            return Ok(());
        };
        match self.state() {
            PlayerState::Playing => {
                let position = current.process.progress();
                let _guard = self.play_lock.lock().await;
                self.start_entry(current.entry, Some(position)).await
            }
            PlayerState::Paused => {
                let position = current.process.progress();
                {
                    let _guard = self.play_lock.lock().await;
                    self.start_entry(current.entry, Some(position)).await?;
                }
                self.pause().await
            }
            _ => Ok(()),
        }
    }

    // ---- Internals ------------------------------------------------------

    /// Walk the queue forward. `continuing` is set when the previous entry
    /// just finished; it lets the advance through even though the state is
    /// still `Playing`.
    ///
    /// An entry the sink refuses is burned: logged, recorded as finished,
    /// and the next one is tried, so a broken output never wedges the
    /// pipeline mid-state.
    async fn advance(self: &Arc<Self>, continuing: bool) -> Result<()> {
        if self.is_dead() {
            debug!("play on a dead player, ignored");
            return Ok(());
        }
        let _guard = self.play_lock.lock().await;
        match self.state() {
            PlayerState::Dead => return Ok(()),
            PlayerState::Stopped => {}
            _ if continuing => {}
            _ => return Ok(()),
        }
        loop {
            let Some(entry) = self.queue.pop_next().await else {
                debug!("queue exhausted");
                if !self.is_stopped() {
                    self.halt().await;
                }
                return Ok(());
            };
            match self.start_entry(Arc::clone(&entry), None).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(title = %entry.title(), "could not start entry, moving on: {error}");
                    self.queue.record_finished(Arc::clone(&entry));
                    self.bus.emit(PipelineEvent::FinishedPlaying { entry });
                }
            }
        }
    }

    /// Hand `entry` to the sink and install it as the current playback.
    /// Callers must hold the play lock.
    async fn start_entry(self: &Arc<Self>, entry: Arc<Entry>, resume_from: Option<f64>) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.current.write().unwrap().take();
        if let Some(previous) = previous {
            previous.process.stop().await;
        }
        let volume = self.volume();
        let request = PlaybackRequest::for_entry(&entry, volume, resume_from)?;
        let sink = Arc::clone(&*self.sink.read().unwrap());
        let process = match sink.spawn(request).await {
            Ok(process) => process,
            Err(error) => {
                if !self.is_dead() {
                    *self.state.write().unwrap() = PlayerState::Stopped;
                }
                return Err(error);
            }
        };
        if self.is_dead() {
            // kill() raced the spawn; do not resurrect.
            process.stop().await;
            return Err(PlayerError::Dead);
        }
        *self.current.write().unwrap() = Some(CurrentPlayback {
            entry: Arc::clone(&entry),
            process: Arc::clone(&process),
        });
        *self.state.write().unwrap() = PlayerState::Playing;
        self.watch_process(generation, process);
        info!(title = %entry.title(), "playing");
        self.bus.emit(PipelineEvent::Play { entry });
        Ok(())
    }

    /// Supervise an output process until it reports a terminal phase.
    fn watch_process(self: &Arc<Self>, generation: u64, process: Arc<dyn OutputProcess>) {
        let player = Arc::clone(self);
        let mut phase = process.watch_phase();
        tokio::spawn(async move {
            loop {
                let snapshot = phase.borrow_and_update().clone();
                if let ProcessPhase::Finished(outcome) = snapshot {
                    player.handle_completion(generation, outcome).await;
                    return;
                }
                if phase.changed().await.is_err() {
                    let outcome = ProcessOutcome::Faulted("output process vanished".to_string());
                    player.handle_completion(generation, outcome).await;
                    return;
                }
            }
        });
    }

    /// React to the current entry ending, for whatever reason.
    async fn handle_completion(self: &Arc<Self>, generation: u64, outcome: ProcessOutcome) {
        if self.generation.load(Ordering::SeqCst) != generation {
            // Superseded by a newer process or discarded on purpose.
            return;
        }
        let finished = self.current.write().unwrap().take();
        let Some(finished) = finished else {
            return;
        };
        let entry = finished.entry;
        if let ProcessOutcome::Faulted(detail) = &outcome {
            warn!(title = %entry.title(), "output process faulted, treating as completion: {detail}");
        }

        self.queue.record_finished(Arc::clone(&entry));

        let skip_requested = self.skip_repeat.swap(false, Ordering::SeqCst);
        match self.repeat_mode() {
            RepeatMode::All => {
                self.queue.push(Arc::clone(&entry), Placement::End);
            }
            RepeatMode::Single if !skip_requested => {
                self.queue.push(Arc::clone(&entry), Placement::Index(0));
            }
            _ => {}
        }

        if !matches!(self.state(), PlayerState::Stopped | PlayerState::Dead) {
            if let Err(error) = self.advance(true).await {
                warn!("could not advance after completion: {error}");
            }
        }

        self.bus.emit(PipelineEvent::FinishedPlaying {
            entry: Arc::clone(&entry),
        });

        if self.options.cleanup_finished {
            self.cleanup_finished_file(&entry).await;
        }
    }

    /// Delete the finished entry's media file unless the playing entry, a
    /// pending one or a replayable history record still points at it.
    async fn cleanup_finished_file(&self, entry: &Entry) {
        let Some(path) = entry.filename() else {
            return;
        };
        let playing = self
            .current_entry()
            .is_some_and(|current| current.filename().is_some_and(|other| other == path));
        let pending = self
            .queue
            .entries()
            .iter()
            .any(|queued| queued.filename().is_some_and(|other| other == path));
        let replayable = self.queue.history().iter().any(|record| {
            record.entry.id() != entry.id()
                && record.entry.filename().is_some_and(|other| other == path)
        });
        if playing || pending || replayable {
            debug!(path = %path.display(), "media file still referenced, keeping it");
            return;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "deleted finished media file"),
            Err(error) => {
                warn!(path = %path.display(), "could not delete finished media file: {error}");
            }
        }
    }

    /// Shared path for `stop` and queue exhaustion. Discards the current
    /// process and announces the stop.
    async fn halt(&self) {
        *self.state.write().unwrap() = PlayerState::Stopped;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.current.write().unwrap().take();
        if let Some(previous) = previous {
            previous.process.stop().await;
        }
        self.bus.emit(PipelineEvent::Stop);
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("repeat", &self.repeat_mode())
            .field("volume", &self.volume())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}
