//! Clock-driven sink, no audio involved
//!
//! Plays every request against a virtual clock running `time_scale`
//! times faster than real time. Used by the test suite and by the demo
//! console when no player binary is around.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock as StdRwLock;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{PlayerError, Result};
use crate::sink::{
    OutputProcess, PlaybackRequest, PositionClock, ProcessOutcome, ProcessPhase, VoiceSink,
};

/// What a spawn looked like, for assertions
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub title: String,
    pub start: f64,
    pub length: Option<f64>,
    pub volume: f32,
    pub stream: bool,
}

pub struct SimulatedSink {
    name: String,
    time_scale: f64,
    fault_titles: StdRwLock<HashSet<String>>,
    records: StdMutex<Vec<SpawnRecord>>,
    controls: StdMutex<Vec<mpsc::UnboundedSender<Control>>>,
}

impl SimulatedSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_scale: 1000.0,
            fault_titles: StdRwLock::new(HashSet::new()),
            records: StdMutex::new(Vec::new()),
            controls: StdMutex::new(Vec::new()),
        }
    }

    /// Virtual seconds played per real second
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Requests with this title will fault right after spawning
    pub fn fault_on(&self, title: &str) {
        self.fault_titles.write().unwrap().insert(title.to_string());
    }

    /// Makes the most recently spawned process fault mid-play
    pub fn fault_current(&self, detail: &str) {
        if let Some(control) = self.controls.lock().unwrap().last() {
            let _ = control.send(Control::Fault(detail.to_string()));
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records(&self) -> Vec<SpawnRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceSink for SimulatedSink {
    async fn spawn(&self, request: PlaybackRequest) -> Result<Arc<dyn OutputProcess>> {
        self.records.lock().unwrap().push(SpawnRecord {
            title: request.title.clone(),
            start: request.start,
            length: request.length,
            volume: request.volume,
            stream: request.stream,
        });
        let fault = self
            .fault_titles
            .read()
            .unwrap()
            .contains(&request.title)
            .then(|| format!("simulated fault for {}", request.title));

        let process = SimulatedProcess::start(request, self.time_scale, fault);
        self.controls
            .lock()
            .unwrap()
            .push(process.control.clone());
        Ok(process)
    }

    fn describe(&self) -> String {
        format!("simulated sink {}", self.name)
    }
}

enum Control {
    Pause,
    Resume,
    Stop,
    Fault(String),
}

struct SimulatedProcess {
    control: mpsc::UnboundedSender<Control>,
    phase: watch::Receiver<ProcessPhase>,
    clock: Arc<StdMutex<PositionClock>>,
}

impl SimulatedProcess {
    fn start(request: PlaybackRequest, scale: f64, fault: Option<String>) -> Arc<Self> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(ProcessPhase::Running);
        let clock = Arc::new(StdMutex::new(PositionClock::running(request.start, scale)));
        tokio::spawn(drive(
            request,
            fault,
            Arc::clone(&clock),
            phase_tx,
            control_rx,
        ));
        Arc::new(Self {
            control: control_tx,
            phase: phase_rx,
            clock,
        })
    }
}

#[async_trait]
impl OutputProcess for SimulatedProcess {
    // The clock is adjusted caller-side, not in the drive task, so
    // progress() is already settled when pause() or resume() returns.
    async fn pause(&self) -> Result<()> {
        self.control
            .send(Control::Pause)
            .map_err(|_| PlayerError::sink("output already finished"))?;
        self.clock.lock().unwrap().freeze();
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.control
            .send(Control::Resume)
            .map_err(|_| PlayerError::sink("output already finished"))?;
        self.clock.lock().unwrap().unfreeze();
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    async fn set_volume(&self, _volume: f32) -> Result<()> {
        Ok(())
    }

    fn progress(&self) -> f64 {
        self.clock.lock().unwrap().now()
    }

    fn watch_phase(&self) -> watch::Receiver<ProcessPhase> {
        self.phase.clone()
    }
}

async fn drive(
    request: PlaybackRequest,
    fault: Option<String>,
    clock: Arc<StdMutex<PositionClock>>,
    phase: watch::Sender<ProcessPhase>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let finish = |outcome: ProcessOutcome| {
        clock.lock().unwrap().freeze();
        phase.send_replace(ProcessPhase::Finished(outcome));
    };

    if let Some(detail) = fault {
        tokio::time::sleep(Duration::from_millis(1)).await;
        debug!(title = %request.title, "simulated process faulting");
        finish(ProcessOutcome::Faulted(detail));
        return;
    }

    let end_at = request.length.map(|length| request.start + length);
    let scale = clock.lock().unwrap().scale();
    'running: loop {
        let sleep_for = end_at.map(|end| {
            let remaining = (end - clock.lock().unwrap().now()).max(0.0);
            Duration::from_secs_f64(remaining / scale)
        });
        tokio::select! {
            _ = sleep_until_end(sleep_for) => {
                finish(ProcessOutcome::Clean);
                return;
            }
            command = control.recv() => match command {
                None | Some(Control::Stop) => {
                    finish(ProcessOutcome::Clean);
                    return;
                }
                Some(Control::Fault(detail)) => {
                    finish(ProcessOutcome::Faulted(detail));
                    return;
                }
                Some(Control::Pause) => {
                    phase.send_replace(ProcessPhase::Paused);
                    loop {
                        match control.recv().await {
                            Some(Control::Resume) => {
                                phase.send_replace(ProcessPhase::Running);
                                continue 'running;
                            }
                            None | Some(Control::Stop) => {
                                finish(ProcessOutcome::Clean);
                                return;
                            }
                            Some(Control::Fault(detail)) => {
                                finish(ProcessOutcome::Faulted(detail));
                                return;
                            }
                            Some(Control::Pause) => {}
                        }
                    }
                }
                Some(Control::Resume) => {}
            }
        }
    }
}

async fn sleep_until_end(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
