//! Recording session use case
//!
//! Owns the state machine and every handle a recording needs: the output
//! sink, the current transfer loop and the progress clock. All public
//! operations run under one async mutex so at most one state change is in
//! flight at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::negotiation::{candidate_rates, open_capture};
use super::ports::{
    CaptureBackend, CaptureError, CaptureSource, ChunkSink, EncoderFactory, KeepAlive,
    OutputStore, SinkError,
};
use super::progress_clock::{ClockHandle, ProgressClock, TICK_INTERVAL};
use super::transfer_loop::{LoopControl, LoopEvent, LoopFailure, TransferLoop};
use crate::domain::audio::AudioMeta;
use crate::domain::config::{AppConfig, DEFAULT_SAMPLE_RATES};
use crate::domain::error::InvalidAudioMeta;
use crate::domain::recording::{
    EndStatus, InvalidStateTransition, PauseMode, SessionLifecycle, SessionState, Transition,
};

/// Status carried by every `RecordingFinished` event
pub const FINISHED_OK: &str = "OK";

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateTransition),

    #[error("Please call prepare before starting recording")]
    RecordingNotPrepared,

    #[error("No compatible capture device for any candidate sample rate")]
    NoCompatibleDevice,

    #[error("Couldn't prepare recording at {}: {message}", path.display())]
    IoFailure { path: PathBuf, message: String },

    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Invalid audio format: {0}")]
    InvalidMeta(#[from] InvalidAudioMeta),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

impl SessionError {
    /// Stable error code for callers that match on strings
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "INVALID_STATE",
            Self::RecordingNotPrepared => "RECORDING_NOT_PREPARED",
            Self::NoCompatibleDevice => "NO_COMPATIBLE_DEVICE",
            Self::IoFailure { .. } => "COULDNT_PREPARE_RECORDING_AT_PATH",
            Self::EncodingFailure(_) => "ENCODING_FAILURE",
            Self::InvalidMeta(_) => "INVALID_META",
            Self::CaptureFailed(_) => "CAPTURE_FAILED",
        }
    }

    fn io(path: &Path, error: SinkError) -> Self {
        let message = match error {
            SinkError::Open { message, .. } => message,
            SinkError::Write(message) => message,
        };
        Self::IoFailure {
            path: path.to_path_buf(),
            message,
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::NoCompatibleDevice => Self::NoCompatibleDevice,
            other => Self::CaptureFailed(other.to_string()),
        }
    }
}

impl From<LoopFailure> for SessionError {
    fn from(failure: LoopFailure) -> Self {
        match failure {
            LoopFailure::Capture(e) => e.into(),
            LoopFailure::Encoding(e) => Self::EncodingFailure(e.to_string()),
        }
    }
}

/// Events emitted by a session, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Cumulative recording time, once per tick while recording
    RecordingProgress { current_time: f64 },
    /// Exactly once per successful `stop`
    RecordingFinished {
        status: &'static str,
        output_location: PathBuf,
    },
    /// A capture period opened its encoder
    RecordStart { meta: AudioMeta },
    /// A transfer loop finished
    RecordEnd { status: EndStatus },
    /// A period failed; `code` matches [`SessionError::code`]
    RecordError { code: &'static str, message: String },
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed candidate rates, tried after the caller's rate
    pub sample_rates: Vec<u32>,
    pub pause_mode: PauseMode,
    pub tick_interval: StdDuration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rates: DEFAULT_SAMPLE_RATES.to_vec(),
            pause_mode: PauseMode::default(),
            tick_interval: TICK_INTERVAL,
        }
    }
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            sample_rates: config.sample_rates_or_default(),
            pause_mode: config.pause_mode_or_default(),
            tick_interval: TICK_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct PreparedOutput {
    path: PathBuf,
    meta: AudioMeta,
}

/// Handles of one running transfer loop
struct ActivePeriod {
    generation: u64,
    control: LoopControl,
    thread: Option<std::thread::JoinHandle<EndStatus>>,
    pump: Option<JoinHandle<Box<dyn ChunkSink>>>,
}

impl ActivePeriod {
    fn is_live(&self) -> bool {
        !self.control.has_exited()
    }
}

impl Drop for ActivePeriod {
    fn drop(&mut self) {
        self.control.stop();
    }
}

#[derive(Default)]
struct Inner {
    lifecycle: SessionLifecycle,
    prepared: Option<PreparedOutput>,
    negotiated: Option<AudioMeta>,
    sink: Option<Box<dyn ChunkSink>>,
    period: Option<ActivePeriod>,
    clock: Option<ProgressClock>,
    /// Bumped for every launched period
    generation: u64,
}

impl Inner {
    fn output_path(&self) -> Result<PathBuf, SessionError> {
        self.prepared
            .as_ref()
            .map(|p| p.path.clone())
            .ok_or(SessionError::RecordingNotPrepared)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.period
            .as_ref()
            .is_some_and(|p| p.generation == generation)
    }
}

/// State reachable from both the session and its failure watchers
struct Shared<K> {
    inner: Mutex<Inner>,
    keep_alive: K,
    state_tx: watch::Sender<SessionState>,
}

impl<K: KeepAlive> Shared<K> {
    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.lifecycle.state());
    }

    async fn foreground_needed(&self) {
        if let Err(e) = self.keep_alive.foreground_needed().await {
            warn!(error = %e, "keep-alive request failed");
        }
    }

    async fn foreground_not_needed(&self) {
        if let Err(e) = self.keep_alive.foreground_not_needed().await {
            warn!(error = %e, "keep-alive release failed");
        }
    }

    /// Tear down a period that ended by error and return to Idle.
    ///
    /// The sink stays open so a later `start` appends to the delivered
    /// output. No `RecordingFinished` is emitted.
    async fn recover(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        // a stop or pause already collected this period
        if !inner.is_current(generation) {
            return;
        }
        let previous = match inner.lifecycle.begin_stop() {
            Ok(previous) => previous,
            Err(e) => {
                debug!(error = %e, "failed period outside an active recording");
                return;
            }
        };
        self.publish(&inner);

        end_period(&mut inner).await;
        if let Some(mut clock) = inner.clock.take() {
            clock.cancel();
        }
        if let Some(sink) = inner.sink.as_mut() {
            if let Err(e) = sink.flush().await {
                error!(error = %e, "flush after failure failed");
            }
        }

        if let Err(e) = inner.lifecycle.finish_stop() {
            error!(error = %e, "failed period left the session mid-stop");
        }
        self.publish(&inner);

        warn!(previous = %previous, "recording ended by failure");
        if previous == SessionState::Recording {
            self.foreground_not_needed().await;
        }
    }
}

/// Microphone-to-file recording session
pub struct RecordingSession<B, F, O, K>
where
    B: CaptureBackend + 'static,
    F: EncoderFactory,
    O: OutputStore,
    K: KeepAlive + 'static,
{
    backend: Arc<B>,
    encoders: F,
    output: O,
    config: SessionConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    shared: Arc<Shared<K>>,
}

impl<B, F, O, K> RecordingSession<B, F, O, K>
where
    B: CaptureBackend + 'static,
    F: EncoderFactory,
    O: OutputStore,
    K: KeepAlive + 'static,
{
    /// Create a session and the receiving end of its event stream
    pub fn new(
        backend: B,
        encoders: F,
        output: O,
        keep_alive: K,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let session = Self {
            backend: Arc::new(backend),
            encoders,
            output,
            config,
            events,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                keep_alive,
                state_tx,
            }),
        };
        (session, events_rx)
    }

    /// Current state; does not wait for an operation in flight
    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Format chosen by the last successful negotiation
    pub async fn negotiated_meta(&self) -> Option<AudioMeta> {
        self.shared.inner.lock().await.negotiated
    }

    pub fn check_permission(&self) -> bool {
        self.backend.has_permission()
    }

    /// Create (or truncate) the output file and remember the requested format
    pub async fn prepare(
        &self,
        path: impl Into<PathBuf>,
        meta: AudioMeta,
    ) -> Result<PathBuf, SessionError> {
        let path = path.into();
        let mut inner = self.shared.inner.lock().await;
        inner.lifecycle.check_prepare()?;

        let sink = self
            .output
            .open(&path)
            .await
            .map_err(|e| SessionError::io(&path, e))?;

        inner.sink = Some(sink);
        inner.prepared = Some(PreparedOutput {
            path: path.clone(),
            meta,
        });
        inner.negotiated = None;
        inner.lifecycle.prepare()?;
        self.shared.publish(&inner);

        info!(path = %path.display(), %meta, "recording prepared");
        Ok(path)
    }

    /// Negotiate the device and begin the first capture period
    pub async fn start(&self) -> Result<PathBuf, SessionError> {
        let mut inner = self.shared.inner.lock().await;
        inner.lifecycle.check_start()?;
        let prepared = inner
            .prepared
            .clone()
            .ok_or(SessionError::RecordingNotPrepared)?;

        // a restart after stop begins a fresh file; after a failure the
        // sink is still open and the new period appends
        if inner.sink.is_none() {
            let sink = self
                .output
                .open(&prepared.path)
                .await
                .map_err(|e| SessionError::io(&prepared.path, e))?;
            inner.sink = Some(sink);
        }

        let candidates = candidate_rates(prepared.meta.sample_rate_hz(), &self.config.sample_rates);
        let source = self.open_source(prepared.meta, candidates).await?;
        let meta = source.meta();

        let mut clock = ProgressClock::new(self.config.tick_interval);
        self.launch_period(&mut inner, source, &prepared.path, clock.handle())
            .await?;

        let events = self.events.clone();
        clock.start(move |current_time| {
            let _ = events.send(SessionEvent::RecordingProgress { current_time });
        });
        inner.clock = Some(clock);
        inner.negotiated = Some(meta);
        inner.lifecycle.start()?;
        self.shared.publish(&inner);

        info!(%meta, "recording started");
        self.shared.foreground_needed().await;
        Ok(prepared.path)
    }

    /// End the current capture period. A no-op unless recording.
    pub async fn pause(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.lifecycle.pause()? == Transition::Unchanged {
            return Ok(());
        }

        match self.config.pause_mode {
            PauseMode::ReleaseDevice => {
                end_period(&mut inner).await;
            }
            PauseMode::KeepDevice => {
                let control = inner.period.as_ref().map(|p| p.control.clone());
                if let Some(control) = control {
                    if control.hold().await.is_err() {
                        debug!("transfer loop gone before hold was acknowledged");
                    }
                }
            }
        }
        if let Some(clock) = inner.clock.as_ref() {
            clock.suspend();
        }
        self.shared.publish(&inner);

        info!(mode = %self.config.pause_mode, "recording paused");
        self.shared.foreground_not_needed().await;
        Ok(())
    }

    /// Begin a new capture period at the negotiated rate. A no-op unless paused.
    pub async fn resume(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.lifecycle.state() != SessionState::Paused {
            inner.lifecycle.resume()?;
            return Ok(());
        }

        let held = self.config.pause_mode == PauseMode::KeepDevice
            && inner.period.as_ref().is_some_and(ActivePeriod::is_live);

        if held {
            if let Some(period) = inner.period.as_ref() {
                period.control.run();
            }
        } else {
            end_period(&mut inner).await;
            let meta = inner.negotiated.ok_or(SessionError::RecordingNotPrepared)?;
            let path = inner.output_path()?;
            let clock = inner
                .clock
                .as_ref()
                .map(ProgressClock::handle)
                .ok_or(SessionError::RecordingNotPrepared)?;
            let source = self.open_source(meta, vec![meta.sample_rate_hz()]).await?;
            self.launch_period(&mut inner, source, &path, clock).await?;
        }

        inner.lifecycle.resume()?;
        if let Some(clock) = inner.clock.as_ref() {
            clock.resume();
        }
        self.shared.publish(&inner);

        info!("recording resumed");
        self.shared.foreground_needed().await;
        Ok(())
    }

    /// Tear everything down and report the finished file
    pub async fn stop(&self) -> Result<PathBuf, SessionError> {
        let mut inner = self.shared.inner.lock().await;
        let previous = inner.lifecycle.begin_stop()?;
        let path = inner
            .prepared
            .as_ref()
            .map(|p| p.path.clone())
            .unwrap_or_default();
        self.shared.publish(&inner);

        end_period(&mut inner).await;
        if let Some(mut clock) = inner.clock.take() {
            clock.cancel();
        }
        if let Some(mut sink) = inner.sink.take() {
            if let Err(e) = sink.flush().await {
                error!(error = %e, "final flush failed");
            }
        }

        inner.lifecycle.finish_stop()?;
        self.shared.publish(&inner);

        info!(path = %path.display(), "recording finished");
        let _ = self.events.send(SessionEvent::RecordingFinished {
            status: FINISHED_OK,
            output_location: path.clone(),
        });
        if previous == SessionState::Recording {
            self.shared.foreground_not_needed().await;
        }
        Ok(path)
    }

    async fn open_source(
        &self,
        template: AudioMeta,
        candidates: Vec<u32>,
    ) -> Result<Box<dyn CaptureSource>, SessionError> {
        let backend = Arc::clone(&self.backend);
        let opened = tokio::task::spawn_blocking(move || {
            open_capture(backend.as_ref(), &candidates, template)
        })
        .await
        .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;
        Ok(opened?)
    }

    /// Spawn the transfer loop, its pump task and a watcher that tears the
    /// session down if the period ends by error
    async fn launch_period(
        &self,
        inner: &mut Inner,
        source: Box<dyn CaptureSource>,
        path: &Path,
        clock: ClockHandle,
    ) -> Result<(), SessionError> {
        let sink = inner.sink.take().ok_or_else(|| SessionError::IoFailure {
            path: path.to_path_buf(),
            message: "output is not open".to_string(),
        })?;

        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let (failed_tx, failed_rx) = oneshot::channel();
        let control = LoopControl::new();
        let pump = PeriodPump {
            loop_rx,
            sink,
            path: path.to_path_buf(),
            control: control.clone(),
            clock,
            events: self.events.clone(),
            failed: Some(failed_tx),
        };
        let pump = tokio::spawn(pump.run());

        let transfer = TransferLoop::new(source, self.encoders.create(), control.clone(), loop_tx);
        match transfer.spawn() {
            Ok(thread) => {
                inner.generation += 1;
                let generation = inner.generation;
                inner.period = Some(ActivePeriod {
                    generation,
                    control,
                    thread: Some(thread),
                    pump: Some(pump),
                });

                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    // the sender is dropped without a signal when the
                    // period ends cleanly
                    if failed_rx.await.is_ok() {
                        shared.recover(generation).await;
                    }
                });
                Ok(())
            }
            Err(e) => {
                // the loop and its sender are gone, so the pump hands the sink back
                inner.sink = collect_sink(pump).await;
                Err(e.into())
            }
        }
    }
}

/// Stop the current loop, wait for its teardown and take the sink back
async fn end_period(inner: &mut Inner) -> Option<EndStatus> {
    let mut period = inner.period.take()?;
    period.control.stop();

    let status = match period.thread.take() {
        Some(thread) => match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) | Err(_) => {
                error!("capture thread panicked");
                EndStatus::EndedByError
            }
        },
        None => EndStatus::EndedByError,
    };
    if let Some(pump) = period.pump.take() {
        inner.sink = collect_sink(pump).await;
    }

    debug!(%status, "capture period ended");
    Some(status)
}

async fn collect_sink(pump: JoinHandle<Box<dyn ChunkSink>>) -> Option<Box<dyn ChunkSink>> {
    match pump.await {
        Ok(sink) => Some(sink),
        Err(e) => {
            error!(error = %e, "output pump failed");
            None
        }
    }
}

/// Moves one loop's events into the sink and the session's event stream
struct PeriodPump {
    loop_rx: mpsc::UnboundedReceiver<LoopEvent>,
    sink: Box<dyn ChunkSink>,
    path: PathBuf,
    control: LoopControl,
    clock: ClockHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Fired once if the period ends by error
    failed: Option<oneshot::Sender<()>>,
}

impl PeriodPump {
    async fn run(mut self) -> Box<dyn ChunkSink> {
        let mut failed = false;

        while let Some(event) = self.loop_rx.recv().await {
            match event {
                LoopEvent::RecordStart(meta) => {
                    self.emit(SessionEvent::RecordStart { meta });
                }
                LoopEvent::Chunk(chunk) => {
                    if failed {
                        continue;
                    }
                    if let Err(e) = self.sink.write_chunk(chunk).await {
                        failed = true;
                        self.control.stop();
                        self.fail(SessionError::io(&self.path, e));
                    }
                }
                LoopEvent::RecordError(failure) => {
                    self.fail(failure.into());
                }
                LoopEvent::RecordEnd(status) => {
                    if let Err(e) = self.sink.flush().await {
                        if !failed {
                            failed = true;
                            self.fail(SessionError::io(&self.path, e));
                        }
                    }
                    let status = if failed { EndStatus::EndedByError } else { status };
                    self.emit(SessionEvent::RecordEnd { status });
                    if status == EndStatus::EndedByError {
                        self.clock.suspend();
                        if let Some(failed) = self.failed.take() {
                            let _ = failed.send(());
                        }
                    }
                }
            }
        }

        self.sink
    }

    fn fail(&self, error: SessionError) {
        error!(code = error.code(), error = %error, "recording period failed");
        self.emit(SessionEvent::RecordError {
            code: error.code(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
