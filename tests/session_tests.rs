//! Recording session integration tests
//!
//! A scripted capture backend stands in for the microphone so the full
//! pipeline runs: negotiation, the transfer loop thread, the output pump and
//! the progress clock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use flac_recorder::application::ports::{
    CaptureBackend, CaptureError, CaptureSource, ChunkSink, EncoderFactory, EncodingError,
    EncodingReady, KeepAlive, KeepAliveError, OutputStore, SinkError, StreamEncoder,
};
use flac_recorder::application::{RecordingSession, SessionConfig, SessionEvent, FINISHED_OK};
use flac_recorder::domain::audio::{AudioMeta, EncodedChunk};
use flac_recorder::domain::recording::{EndStatus, PauseMode, SessionState};
use flac_recorder::infrastructure::FsOutputStore;

// ---------------------------------------------------------------------------
// Scripted capture hardware
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct ScriptedBackend {
    supported: Vec<u32>,
    /// Fail every source after this many reads
    fail_after: Option<usize>,
    opened: Arc<Mutex<Vec<u32>>>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    fn supporting(rates: &[u32]) -> Self {
        Self {
            supported: rates.to_vec(),
            ..Self::default()
        }
    }

    fn opened_rates(&self) -> Vec<u32> {
        self.opened.lock().unwrap().clone()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn has_permission(&self) -> bool {
        !self.supported.is_empty()
    }

    fn min_buffer_size(&self, meta: &AudioMeta) -> Option<usize> {
        self.supported
            .contains(&meta.sample_rate_hz())
            .then(|| meta.bytes_per_second() / 50)
    }

    fn open(
        &self,
        meta: AudioMeta,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureSource>, CaptureError> {
        self.opened.lock().unwrap().push(meta.sample_rate_hz());
        Ok(Box::new(SyntheticSource {
            meta,
            buffer_size,
            closed: false,
            served: 0,
            fail_after: self.fail_after,
            reads: Arc::clone(&self.reads),
        }))
    }
}

/// Produces a full buffer of a ramp pattern every couple of milliseconds
struct SyntheticSource {
    meta: AudioMeta,
    buffer_size: usize,
    closed: bool,
    served: usize,
    fail_after: Option<usize>,
    reads: Arc<AtomicUsize>,
}

impl CaptureSource for SyntheticSource {
    fn meta(&self) -> AudioMeta {
        self.meta
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        if self.closed {
            return Err(CaptureError::SourceClosed);
        }
        if self.fail_after.is_some_and(|limit| self.served >= limit) {
            return Err(CaptureError::DeviceFailed("unplugged".into()));
        }
        std::thread::sleep(Duration::from_millis(2));
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = i as u8;
        }
        self.served += 1;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let frame = self.meta.bytes_per_frame();
        Ok(buf.len() - buf.len() % frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// ---------------------------------------------------------------------------
// Encoder that logs its calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Initialize(u32),
    Encode(usize),
    Release,
}

#[derive(Clone, Default)]
struct EncoderLog {
    calls: Arc<Mutex<Vec<Call>>>,
    emitted: Arc<AtomicUsize>,
}

impl EncoderLog {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn encode_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Encode(_)))
            .count()
    }

    fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }
}

struct LoggingEncoder {
    log: EncoderLog,
    /// Fail the nth encode call, counted across periods
    fail_on_encode: Option<usize>,
    ready: Option<Box<dyn EncodingReady>>,
    open: bool,
}

impl LoggingEncoder {
    fn emit(&mut self, len: usize) {
        self.log.emitted.fetch_add(len, Ordering::SeqCst);
        if let Some(ready) = self.ready.as_mut() {
            ready.on_encoded(EncodedChunk::new(vec![0x5A; len]));
        }
    }
}

impl StreamEncoder for LoggingEncoder {
    fn set_encoding_ready(&mut self, ready: Box<dyn EncodingReady>) {
        self.ready = Some(ready);
    }

    fn initialize(&mut self, meta: &AudioMeta) -> Result<(), EncodingError> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push(Call::Initialize(meta.sample_rate_hz()));
        self.open = true;
        self.emit(4);
        Ok(())
    }

    fn encode(&mut self, pcm: &[u8]) -> Result<(), EncodingError> {
        if !self.open {
            return Err(EncodingError::NotInitialized);
        }
        self.log.calls.lock().unwrap().push(Call::Encode(pcm.len()));
        if self.fail_on_encode == Some(self.log.encode_count()) {
            return Err(EncodingError::Encode("bitstream overflow".into()));
        }
        self.emit(pcm.len() / 8 + 1);
        Ok(())
    }

    fn release(&mut self) -> Result<(), EncodingError> {
        self.log.calls.lock().unwrap().push(Call::Release);
        self.open = false;
        self.emit(3);
        Ok(())
    }
}

struct LoggingEncoderFactory {
    log: EncoderLog,
    fail_on_encode: Option<usize>,
}

impl EncoderFactory for LoggingEncoderFactory {
    fn create(&self) -> Box<dyn StreamEncoder> {
        Box::new(LoggingEncoder {
            log: self.log.clone(),
            fail_on_encode: self.fail_on_encode,
            ready: None,
            open: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Output that can run out of space
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct LimitedStore {
    /// Chunks accepted per opened sink before writes fail
    chunk_limit: Option<usize>,
    written: Arc<AtomicUsize>,
}

impl LimitedStore {
    fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputStore for LimitedStore {
    async fn open(&self, path: &Path) -> Result<Box<dyn ChunkSink>, SinkError> {
        let inner = FsOutputStore::new().open(path).await?;
        Ok(Box::new(LimitedSink {
            inner,
            remaining: self.chunk_limit,
            written: Arc::clone(&self.written),
        }))
    }
}

struct LimitedSink {
    inner: Box<dyn ChunkSink>,
    remaining: Option<usize>,
    written: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkSink for LimitedSink {
    async fn write_chunk(&mut self, chunk: EncodedChunk) -> Result<(), SinkError> {
        match self.remaining.as_mut() {
            Some(0) => return Err(SinkError::Write("No space left on device".into())),
            Some(n) => *n -= 1,
            None => {}
        }
        let len = chunk.len();
        self.inner.write_chunk(chunk).await?;
        self.written.fetch_add(len, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.inner.flush().await
    }
}

// ---------------------------------------------------------------------------
// Keep-alive counter
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct CountingKeepAlive {
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl CountingKeepAlive {
    fn log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeepAlive for CountingKeepAlive {
    async fn foreground_needed(&self) -> Result<(), KeepAliveError> {
        self.log.lock().unwrap().push("needed");
        Ok(())
    }

    async fn foreground_not_needed(&self) -> Result<(), KeepAliveError> {
        self.log.lock().unwrap().push("not_needed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

type TestSession =
    RecordingSession<ScriptedBackend, LoggingEncoderFactory, LimitedStore, CountingKeepAlive>;

struct Harness {
    session: TestSession,
    events: UnboundedReceiver<SessionEvent>,
    backend: ScriptedBackend,
    encoder: EncoderLog,
    store: LimitedStore,
    keep_alive: CountingKeepAlive,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new(backend: ScriptedBackend, pause_mode: PauseMode) -> Self {
        Self::with_faults(backend, pause_mode, None, LimitedStore::default())
    }

    fn with_faults(
        backend: ScriptedBackend,
        pause_mode: PauseMode,
        fail_on_encode: Option<usize>,
        store: LimitedStore,
    ) -> Self {
        let encoder = EncoderLog::default();
        let keep_alive = CountingKeepAlive::default();
        let config = SessionConfig {
            pause_mode,
            tick_interval: Duration::from_millis(40),
            ..SessionConfig::default()
        };
        let (session, events) = RecordingSession::new(
            backend.clone(),
            LoggingEncoderFactory {
                log: encoder.clone(),
                fail_on_encode,
            },
            store.clone(),
            keep_alive.clone(),
            config,
        );
        Self {
            session,
            events,
            backend,
            encoder,
            store,
            keep_alive,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("take.flac")
    }

    async fn prepare_and_start(&self, rate: u32) -> PathBuf {
        self.session
            .prepare(self.output(), AudioMeta::pcm16(rate, 1).unwrap())
            .await
            .unwrap();
        self.session.start().await.unwrap()
    }

    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event matching `pred`
    async fn wait_for(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event stream closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Wait until the session publishes `state`
    async fn wait_for_state(&self, state: SessionState) {
        let mut states = self.session.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }
}

async fn capture_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Every initialize is closed by a release before the next one
fn assert_paired(calls: &[Call]) {
    let mut open = false;
    for call in calls {
        match call {
            Call::Initialize(_) => {
                assert!(!open, "initialize while a period is open: {:?}", calls);
                open = true;
            }
            Call::Encode(_) => assert!(open, "encode outside a period: {:?}", calls),
            Call::Release => {
                assert!(open, "release without initialize: {:?}", calls);
                open = false;
            }
        }
    }
    assert!(!open, "period left open: {:?}", calls);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recording_writes_every_chunk_in_order() {
    let mut h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);

    let path = h.prepare_and_start(44100).await;
    assert_eq!(h.session.state(), SessionState::Recording);
    capture_for(100).await;

    let finished = h.session.stop().await.unwrap();
    assert_eq!(finished, path);
    assert_eq!(h.session.state(), SessionState::Idle);

    let written = std::fs::metadata(&path).unwrap().len() as usize;
    assert!(h.encoder.emitted() > 0);
    assert_eq!(written, h.encoder.emitted());

    let events = h.drain();
    let start = events
        .iter()
        .position(|e| matches!(e, SessionEvent::RecordStart { .. }))
        .expect("record start");
    let end = events
        .iter()
        .position(|e| {
            matches!(
                e,
                SessionEvent::RecordEnd {
                    status: EndStatus::EndedByUser
                }
            )
        })
        .expect("record end");
    let done = events
        .iter()
        .position(|e| matches!(e, SessionEvent::RecordingFinished { .. }))
        .expect("recording finished");
    assert!(start < end && end < done);
    assert_eq!(
        events[done],
        SessionEvent::RecordingFinished {
            status: FINISHED_OK,
            output_location: path,
        }
    );
    assert_paired(&h.encoder.calls());
}

#[tokio::test]
async fn start_without_prepare_is_rejected() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);

    let err = h.session.start().await.unwrap_err();
    assert_eq!(err.code(), "RECORDING_NOT_PREPARED");
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.backend.opened_rates().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_is_an_invalid_state() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    h.prepare_and_start(44100).await;

    let err = h.session.start().await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
    assert_eq!(h.session.state(), SessionState::Recording);

    let err = h
        .session
        .prepare(h.output(), AudioMeta::pcm16(44100, 1).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    h.session.stop().await.unwrap();
}

#[tokio::test]
async fn stop_when_idle_is_an_invalid_state() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);

    let err = h.session.stop().await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn pause_and_resume_when_idle_do_nothing() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);

    h.session.pause().await.unwrap();
    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.keep_alive.log().is_empty());
}

#[tokio::test]
async fn no_compatible_rate_fails_start() {
    let h = Harness::new(ScriptedBackend::supporting(&[8000]), PauseMode::ReleaseDevice);
    h.session
        .prepare(h.output(), AudioMeta::pcm16(44100, 1).unwrap())
        .await
        .unwrap();

    let err = h.session.start().await.unwrap_err();
    assert_eq!(err.code(), "NO_COMPATIBLE_DEVICE");
    assert_ne!(h.session.state(), SessionState::Recording);
    assert!(h.keep_alive.log().is_empty());
}

#[tokio::test]
async fn prepare_reports_unwritable_path() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    // a regular file where a directory is needed
    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, b"x").unwrap();

    let err = h
        .session
        .prepare(blocker.join("take.flac"), AudioMeta::pcm16(44100, 1).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COULDNT_PREPARE_RECORDING_AT_PATH");
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn negotiation_falls_through_to_supported_rate() {
    let mut h = Harness::new(ScriptedBackend::supporting(&[16000]), PauseMode::ReleaseDevice);
    h.prepare_and_start(48000).await;

    let meta = h.session.negotiated_meta().await.unwrap();
    assert_eq!(meta.sample_rate_hz(), 16000);
    assert_eq!(meta.channels(), 1);

    let start = h
        .wait_for(|e| matches!(e, SessionEvent::RecordStart { .. }))
        .await;
    assert_eq!(start, SessionEvent::RecordStart { meta });

    h.session.stop().await.unwrap();
    assert_eq!(h.backend.opened_rates(), vec![16000]);
    assert!(h
        .encoder
        .calls()
        .iter()
        .all(|c| !matches!(c, Call::Initialize(rate) if *rate != 16000)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_releases_device_and_stops_encoding() {
    let h = Harness::new(
        ScriptedBackend::supporting(&[22050, 16000]),
        PauseMode::ReleaseDevice,
    );
    h.prepare_and_start(22050).await;
    capture_for(60).await;

    h.session.pause().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Paused);
    // second pause is a no-op
    h.session.pause().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Paused);

    let encoded = h.encoder.encode_count();
    let reads = h.backend.reads.load(Ordering::SeqCst);
    capture_for(60).await;
    assert_eq!(h.encoder.encode_count(), encoded);
    assert_eq!(h.backend.reads.load(Ordering::SeqCst), reads);

    h.session.resume().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Recording);
    capture_for(60).await;
    assert!(h.encoder.encode_count() > encoded);

    h.session.stop().await.unwrap();

    // resume reuses the negotiated rate only
    assert_eq!(h.backend.opened_rates(), vec![22050, 22050]);
    let calls = h.encoder.calls();
    assert_paired(&calls);
    assert_eq!(
        calls.iter().filter(|c| matches!(c, Call::Initialize(_))).count(),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keep_device_holds_the_source_across_pause() {
    let h = Harness::new(ScriptedBackend::supporting(&[16000]), PauseMode::KeepDevice);
    h.prepare_and_start(16000).await;
    capture_for(60).await;

    h.session.pause().await.unwrap();
    let encoded = h.encoder.encode_count();
    capture_for(60).await;
    assert_eq!(h.encoder.encode_count(), encoded);
    // the device keeps being drained while held
    let reads = h.backend.reads.load(Ordering::SeqCst);
    capture_for(30).await;
    assert!(h.backend.reads.load(Ordering::SeqCst) > reads);

    h.session.resume().await.unwrap();
    capture_for(60).await;
    assert!(h.encoder.encode_count() > encoded);

    h.session.stop().await.unwrap();
    assert_eq!(h.backend.opened_rates(), vec![16000]);
    assert_paired(&h.encoder.calls());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keep_alive_brackets_every_recording_stretch() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    h.prepare_and_start(44100).await;
    h.session.pause().await.unwrap();
    h.session.pause().await.unwrap();
    h.session.resume().await.unwrap();
    h.session.resume().await.unwrap();
    h.session.stop().await.unwrap();

    assert_eq!(
        h.keep_alive.log(),
        vec!["needed", "not_needed", "needed", "not_needed"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_from_paused_finishes_once() {
    let mut h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    let path = h.prepare_and_start(44100).await;
    capture_for(40).await;
    h.session.pause().await.unwrap();

    assert_eq!(h.session.stop().await.unwrap(), path);
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.keep_alive.log(), vec!["needed", "not_needed"]);

    let finished = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::RecordingFinished { .. }))
        .count();
    assert_eq!(finished, 1);
    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        h.encoder.emitted()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_ticks_increase() {
    let mut h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    h.prepare_and_start(44100).await;
    capture_for(200).await;
    h.session.stop().await.unwrap();

    let ticks: Vec<f64> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::RecordingProgress { current_time } => Some(current_time),
            _ => None,
        })
        .collect();
    assert!(ticks.len() >= 2, "ticks: {:?}", ticks);
    assert!(ticks.windows(2).all(|w| w[0] < w[1]), "ticks: {:?}", ticks);
}

fn error_code(event: SessionEvent) -> (&'static str, String) {
    match event {
        SessionEvent::RecordError { code, message } => (code, message),
        other => panic!("expected a record error, got {:?}", other),
    }
}

fn finished_count(events: &[SessionEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SessionEvent::RecordingFinished { .. }))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_failure_returns_the_session_to_idle() {
    let backend = ScriptedBackend {
        fail_after: Some(5),
        ..ScriptedBackend::supporting(&[44100])
    };
    let mut h = Harness::new(backend, PauseMode::ReleaseDevice);
    let path = h.prepare_and_start(44100).await;

    let error = h
        .wait_for(|e| matches!(e, SessionEvent::RecordError { .. }))
        .await;
    let (code, message) = error_code(error);
    assert_eq!(code, "CAPTURE_FAILED");
    assert!(message.contains("unplugged"));

    let end = h
        .wait_for(|e| matches!(e, SessionEvent::RecordEnd { .. }))
        .await;
    assert_eq!(
        end,
        SessionEvent::RecordEnd {
            status: EndStatus::EndedByError
        }
    );
    h.wait_for_state(SessionState::Idle).await;

    assert_paired(&h.encoder.calls());
    assert_eq!(h.keep_alive.log(), vec!["needed", "not_needed"]);
    // output up to the failure is kept
    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        h.encoder.emitted()
    );
    // already torn down, so there is nothing left to stop
    assert_eq!(h.session.stop().await.unwrap_err().code(), "INVALID_STATE");
    assert_eq!(finished_count(&h.drain()), 0);

    // a fresh start appends to what was delivered
    assert_eq!(h.session.start().await.unwrap(), path);
    assert_eq!(h.session.state(), SessionState::Recording);
    h.wait_for(|e| matches!(e, SessionEvent::RecordEnd { .. }))
        .await;
    h.wait_for_state(SessionState::Idle).await;

    assert_paired(&h.encoder.calls());
    assert_eq!(
        h.keep_alive.log(),
        vec!["needed", "not_needed", "needed", "not_needed"]
    );
    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        h.encoder.emitted()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn encoder_failure_ends_the_period_and_keeps_output() {
    let mut h = Harness::with_faults(
        ScriptedBackend::supporting(&[44100]),
        PauseMode::ReleaseDevice,
        Some(3),
        LimitedStore::default(),
    );
    let path = h.prepare_and_start(44100).await;

    let error = h
        .wait_for(|e| matches!(e, SessionEvent::RecordError { .. }))
        .await;
    let (code, message) = error_code(error);
    assert_eq!(code, "ENCODING_FAILURE");
    assert!(message.contains("bitstream overflow"));
    let end = h
        .wait_for(|e| matches!(e, SessionEvent::RecordEnd { .. }))
        .await;
    assert_eq!(
        end,
        SessionEvent::RecordEnd {
            status: EndStatus::EndedByError
        }
    );
    h.wait_for_state(SessionState::Idle).await;

    // no encode after the failing one, and the period was still released
    let calls = h.encoder.calls();
    assert_paired(&calls);
    assert_eq!(h.encoder.encode_count(), 3);
    assert_eq!(calls.last(), Some(&Call::Release));

    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        h.encoder.emitted()
    );
    assert_eq!(h.keep_alive.log(), vec!["needed", "not_needed"]);
    assert_eq!(finished_count(&h.drain()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_failure_stops_the_loop_and_reports_the_path() {
    let store = LimitedStore {
        chunk_limit: Some(3),
        ..LimitedStore::default()
    };
    let mut h = Harness::with_faults(
        ScriptedBackend::supporting(&[44100]),
        PauseMode::ReleaseDevice,
        None,
        store,
    );
    let path = h.prepare_and_start(44100).await;

    let error = h
        .wait_for(|e| matches!(e, SessionEvent::RecordError { .. }))
        .await;
    let (code, message) = error_code(error);
    assert_eq!(code, "COULDNT_PREPARE_RECORDING_AT_PATH");
    assert!(message.contains("No space left on device"));
    assert!(message.contains(&path.display().to_string()));

    let end = h
        .wait_for(|e| matches!(e, SessionEvent::RecordEnd { .. }))
        .await;
    assert_eq!(
        end,
        SessionEvent::RecordEnd {
            status: EndStatus::EndedByError
        }
    );
    h.wait_for_state(SessionState::Idle).await;

    // the loop was told to stop and closed its period
    let calls = h.encoder.calls();
    assert_paired(&calls);
    assert_eq!(calls.last(), Some(&Call::Release));
    let encoded = h.encoder.encode_count();
    capture_for(30).await;
    assert_eq!(h.encoder.encode_count(), encoded);

    // exactly the accepted chunks reached the file
    let on_disk = std::fs::metadata(&path).unwrap().len() as usize;
    assert_eq!(on_disk, h.store.written());
    assert!(on_disk < h.encoder.emitted());
    assert_eq!(h.keep_alive.log(), vec!["needed", "not_needed"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_racing_a_failure_finishes_once() {
    let backend = ScriptedBackend {
        fail_after: Some(3),
        ..ScriptedBackend::supporting(&[44100])
    };
    let mut h = Harness::new(backend, PauseMode::ReleaseDevice);
    h.prepare_and_start(44100).await;
    h.wait_for(|e| matches!(e, SessionEvent::RecordError { .. }))
        .await;

    // whichever side wins, the session ends Idle with one keep-alive release
    let stopped = h.session.stop().await;
    h.wait_for_state(SessionState::Idle).await;
    capture_for(20).await;

    let finished = finished_count(&h.drain());
    match stopped {
        Ok(_) => assert_eq!(finished, 1),
        Err(e) => {
            assert_eq!(e.code(), "INVALID_STATE");
            assert_eq!(finished, 0);
        }
    }
    assert_eq!(h.keep_alive.log(), vec!["needed", "not_needed"]);
    assert_paired(&h.encoder.calls());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_after_stop_truncates_output() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    let path = h.prepare_and_start(44100).await;
    capture_for(60).await;
    h.session.stop().await.unwrap();
    let first = h.encoder.emitted();

    assert_eq!(h.session.start().await.unwrap(), path);
    capture_for(30).await;
    h.session.stop().await.unwrap();

    let second = h.encoder.emitted() - first;
    assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn state_watchers_see_each_transition() {
    let h = Harness::new(ScriptedBackend::supporting(&[44100]), PauseMode::ReleaseDevice);
    let mut states = h.session.subscribe_state();
    assert_eq!(*states.borrow_and_update(), SessionState::Idle);

    h.prepare_and_start(44100).await;
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), SessionState::Recording);

    h.session.pause().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Paused);

    h.session.stop().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Idle);
}
