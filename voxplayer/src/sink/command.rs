//! Child-process sink
//!
//! Plays each request by spawning one external player process (ffplay by
//! default) and supervising it until it exits. There is no in-process
//! pause for a child: pausing kills it quietly after recording the
//! position, resuming spawns a fresh child at that position. Volume
//! changes respawn the same way, since the binary only takes a volume at
//! startup.
//!
//! The last non-empty stderr line is kept so that a crashing child can
//! report something useful.

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use voxentry::LocalResource;

use crate::error::{PlayerError, Result};
use crate::sink::{
    OutputProcess, PlaybackRequest, PositionClock, ProcessOutcome, ProcessPhase, VoiceSink,
};

/// Binary used when none is configured
pub const DEFAULT_PLAYER_BINARY: &str = "ffplay";

pub struct CommandSink {
    binary: String,
    label: String,
}

impl CommandSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            binary: DEFAULT_PLAYER_BINARY.to_string(),
            label: label.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl VoiceSink for CommandSink {
    async fn spawn(&self, request: PlaybackRequest) -> Result<Arc<dyn OutputProcess>> {
        debug!(
            binary = %self.binary,
            title = %request.title,
            start = request.start,
            "spawning output process"
        );
        CommandProcess::start(self.binary.clone(), request)
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.label, self.binary)
    }
}

enum Control {
    Pause,
    Resume,
    Stop,
    Volume(f32),
}

struct CommandProcess {
    control: mpsc::UnboundedSender<Control>,
    phase: watch::Receiver<ProcessPhase>,
    clock: Arc<StdMutex<PositionClock>>,
}

impl CommandProcess {
    fn start(binary: String, request: PlaybackRequest) -> Result<Arc<dyn OutputProcess>> {
        let stderr_tail = Arc::new(StdMutex::new(String::new()));
        let child = spawn_child(
            &binary,
            &request,
            request.start,
            request.volume,
            &stderr_tail,
        )
        .map_err(|e| PlayerError::sink(format!("failed to launch {binary}: {e}")))?;

        let clock = Arc::new(StdMutex::new(PositionClock::running(request.start, 1.0)));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(ProcessPhase::Running);
        tokio::spawn(drive(
            binary,
            request,
            child,
            Arc::clone(&clock),
            phase_tx,
            control_rx,
            stderr_tail,
        ));
        Ok(Arc::new(Self {
            control: control_tx,
            phase: phase_rx,
            clock,
        }))
    }
}

#[async_trait]
impl OutputProcess for CommandProcess {
    async fn pause(&self) -> Result<()> {
        self.control
            .send(Control::Pause)
            .map_err(|_| PlayerError::sink("output already finished"))
    }

    async fn resume(&self) -> Result<()> {
        self.control
            .send(Control::Resume)
            .map_err(|_| PlayerError::sink("output already finished"))
    }

    async fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.control
            .send(Control::Volume(volume))
            .map_err(|_| PlayerError::sink("output already finished"))
    }

    fn progress(&self) -> f64 {
        self.clock.lock().unwrap().now()
    }

    fn watch_phase(&self) -> watch::Receiver<ProcessPhase> {
        self.phase.clone()
    }
}

async fn drive(
    binary: String,
    request: PlaybackRequest,
    mut child: Child,
    clock: Arc<StdMutex<PositionClock>>,
    phase: watch::Sender<ProcessPhase>,
    mut control: mpsc::UnboundedReceiver<Control>,
    stderr_tail: Arc<StdMutex<String>>,
) {
    let mut volume = request.volume;
    loop {
        tokio::select! {
            status = child.wait() => {
                clock.lock().unwrap().freeze();
                let outcome = match status {
                    Ok(status) if status.success() => ProcessOutcome::Clean,
                    Ok(status) => ProcessOutcome::Faulted(fault_detail(&status, &stderr_tail)),
                    Err(error) => ProcessOutcome::Faulted(error.to_string()),
                };
                phase.send_replace(ProcessPhase::Finished(outcome));
                return;
            }
            command = control.recv() => match command {
                None | Some(Control::Stop) => {
                    reap(&mut child).await;
                    clock.lock().unwrap().freeze();
                    phase.send_replace(ProcessPhase::Finished(ProcessOutcome::Clean));
                    return;
                }
                Some(Control::Pause) => {
                    let position = {
                        let mut clock = clock.lock().unwrap();
                        clock.freeze();
                        clock.now()
                    };
                    reap(&mut child).await;
                    phase.send_replace(ProcessPhase::Paused);
                    if !wait_for_resume(&mut control, &mut volume).await {
                        phase.send_replace(ProcessPhase::Finished(ProcessOutcome::Clean));
                        return;
                    }
                    match spawn_child(&binary, &request, position, volume, &stderr_tail) {
                        Ok(next) => {
                            child = next;
                            clock.lock().unwrap().unfreeze();
                            phase.send_replace(ProcessPhase::Running);
                        }
                        Err(error) => {
                            warn!(%binary, "respawn after pause failed: {error}");
                            phase.send_replace(ProcessPhase::Finished(ProcessOutcome::Faulted(
                                error.to_string(),
                            )));
                            return;
                        }
                    }
                }
                Some(Control::Volume(next_volume)) => {
                    volume = next_volume;
                    // the binary only takes a volume at startup
                    let position = {
                        let mut clock = clock.lock().unwrap();
                        clock.freeze();
                        clock.now()
                    };
                    reap(&mut child).await;
                    match spawn_child(&binary, &request, position, volume, &stderr_tail) {
                        Ok(next) => {
                            child = next;
                            clock.lock().unwrap().unfreeze();
                        }
                        Err(error) => {
                            warn!(%binary, "respawn after volume change failed: {error}");
                            phase.send_replace(ProcessPhase::Finished(ProcessOutcome::Faulted(
                                error.to_string(),
                            )));
                            return;
                        }
                    }
                }
                Some(Control::Resume) => {}
            }
        }
    }
}

/// Waits in the paused phase; `false` means stop instead of resume
async fn wait_for_resume(
    control: &mut mpsc::UnboundedReceiver<Control>,
    volume: &mut f32,
) -> bool {
    loop {
        match control.recv().await {
            Some(Control::Resume) => return true,
            None | Some(Control::Stop) => return false,
            Some(Control::Volume(next)) => *volume = next,
            Some(Control::Pause) => {}
        }
    }
}

async fn reap(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn spawn_child(
    binary: &str,
    request: &PlaybackRequest,
    position: f64,
    volume: f32,
    stderr_tail: &Arc<StdMutex<String>>,
) -> std::io::Result<Child> {
    let mut cmd = Command::new(binary);
    cmd.arg("-nodisp")
        .arg("-autoexit")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("warning");
    if !request.stream {
        if position > 0.0 {
            cmd.arg("-ss").arg(format!("{position:.3}"));
        }
        if let Some(length) = request.length {
            let remaining = (request.start + length - position).max(0.0);
            cmd.arg("-t").arg(format!("{remaining:.3}"));
        }
    }
    let volume_percent = ((volume * 100.0).round() as i64).clamp(0, 100);
    cmd.arg("-volume").arg(volume_percent.to_string());
    cmd.arg("-i").arg(source_arg(&request.source));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    if let Some(stderr) = child.stderr.take() {
        let tail = Arc::clone(stderr_tail);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    *tail.lock().unwrap() = trimmed.to_string();
                }
            }
        });
    }
    Ok(child)
}

fn source_arg(source: &LocalResource) -> OsString {
    match source {
        LocalResource::File(path) => path.as_os_str().to_os_string(),
        LocalResource::StreamUrl(url) => url.into(),
    }
}

fn fault_detail(status: &std::process::ExitStatus, stderr_tail: &Arc<StdMutex<String>>) -> String {
    let tail = stderr_tail.lock().unwrap();
    if tail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {tail}")
    }
}
