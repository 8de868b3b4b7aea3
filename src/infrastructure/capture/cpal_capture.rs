//! Microphone capture using cpal
//!
//! cpal streams are not `Send`, so each open device lives on its own holder
//! thread. The stream callback converts device samples to PCM bytes in the
//! negotiated format and pushes whole frames into a lock-free ring buffer;
//! `read` drains that ring from the transfer loop's thread.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, StreamError, SupportedBufferSize};
use ringbuf::traits::*;
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, warn};

use crate::application::ports::{CaptureBackend, CaptureError, CaptureSource};
use crate::domain::audio::{pcm, AudioMeta};

/// Longest a single `read` waits before returning `Ok(0)`
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Sleep between ring buffer checks
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Seconds of audio the ring buffer can hold before the callback drops frames
const RING_SECONDS: usize = 2;

/// One open input device per process
static DEVICE_IN_USE: AtomicBool = AtomicBool::new(false);

/// Exclusive claim on the input device, released on drop
#[derive(Debug)]
struct DeviceLease(());

impl DeviceLease {
    fn acquire() -> Option<Self> {
        DEVICE_IN_USE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(()))
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        DEVICE_IN_USE.store(false, Ordering::SeqCst);
    }
}

/// Capture backend for the default input device
#[derive(Debug, Clone)]
pub struct CpalCaptureBackend {
    poll_timeout: Duration,
}

impl CpalCaptureBackend {
    pub fn new() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

impl Default for CpalCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for CpalCaptureBackend {
    fn has_permission(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    fn min_buffer_size(&self, meta: &AudioMeta) -> Option<usize> {
        let device = cpal::default_host().default_input_device()?;
        let format = find_format(&device, meta)?;
        Some(buffer_bytes(format.min_frames, meta))
    }

    fn open(
        &self,
        meta: AudioMeta,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let lease = DeviceLease::acquire().ok_or(CaptureError::DeviceBusy)?;

        let capacity = (meta.bytes_per_second() * RING_SECONDS).max(buffer_size * 4);
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        let closed = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel();

        let holder = {
            let closed = Arc::clone(&closed);
            let failure = Arc::clone(&failure);
            std::thread::Builder::new()
                .name("capture-device".into())
                .spawn(move || hold_stream(meta, producer, closed, failure, ready_tx))
                .map_err(|e| CaptureError::DeviceFailed(e.to_string()))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = holder.join();
                return Err(e);
            }
            Err(_) => {
                let _ = holder.join();
                return Err(CaptureError::DeviceFailed(
                    "capture thread exited during setup".into(),
                ));
            }
        }

        debug!(%meta, buffer_size, capacity, "input stream running");
        Ok(Box::new(CpalCaptureSource {
            meta,
            buffer_size,
            consumer,
            closed,
            failure,
            holder: Some(holder),
            lease: Some(lease),
            poll_timeout: self.poll_timeout,
        }))
    }
}

/// An open input stream
pub struct CpalCaptureSource {
    meta: AudioMeta,
    buffer_size: usize,
    consumer: HeapCons<u8>,
    closed: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    holder: Option<JoinHandle<()>>,
    lease: Option<DeviceLease>,
    poll_timeout: Duration,
}

impl CpalCaptureSource {
    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CaptureSource for CpalCaptureSource {
    fn meta(&self) -> AudioMeta {
        self.meta
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let frame = self.meta.bytes_per_frame();
        let wanted = buf.len() - buf.len() % frame;
        let deadline = Instant::now() + self.poll_timeout;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(CaptureError::SourceClosed);
            }
            if let Some(message) = self.failure() {
                return Err(CaptureError::DeviceFailed(message));
            }
            if self.consumer.occupied_len() >= wanted || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let available = self.consumer.occupied_len().min(wanted);
        let take = available - available % frame;
        Ok(self.consumer.pop_slice(&mut buf[..take]))
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(holder) = self.holder.take() {
            holder.thread().unpark();
            if holder.join().is_err() {
                warn!("capture device thread panicked");
            }
            debug!("input stream closed");
        }
        self.lease.take();
    }
}

impl Drop for CpalCaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Stream parameters for one negotiated format
struct DeviceFormat {
    config: StreamConfig,
    sample_format: SampleFormat,
    min_frames: Option<u32>,
}

/// Pick the device configuration for `meta`.
///
/// The rate must be inside the supported range. An exact channel match is
/// preferred; mono requests also accept multichannel configs, which get
/// downmixed.
fn find_format(device: &cpal::Device, meta: &AudioMeta) -> Option<DeviceFormat> {
    let rate = SampleRate(meta.sample_rate_hz());
    let wanted = u16::from(meta.channels());

    let range = device
        .supported_input_configs()
        .ok()?
        .filter(|r| matches!(r.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| r.channels() == wanted || wanted == 1)
        .max_by_key(|r| {
            (
                r.channels() == wanted,
                Reverse(r.channels()),
                r.sample_format() == SampleFormat::I16,
            )
        })?;

    let min_frames = match range.buffer_size() {
        SupportedBufferSize::Range { min, .. } => Some(*min),
        SupportedBufferSize::Unknown => None,
    };
    let sample_format = range.sample_format();
    Some(DeviceFormat {
        config: range.with_sample_rate(rate).config(),
        sample_format,
        min_frames,
    })
}

/// Read buffer size in bytes: the device minimum, but never under 20 ms
fn buffer_bytes(min_frames: Option<u32>, meta: &AudioMeta) -> usize {
    let floor = (meta.sample_rate_hz() / 50).max(1) as usize;
    let frames = min_frames.map_or(floor, |f| (f as usize).max(floor));
    frames * meta.bytes_per_frame()
}

/// Owns the stream until the source is closed
fn hold_stream(
    meta: AudioMeta,
    producer: HeapProd<u8>,
    closed: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    ready: mpsc::Sender<Result<(), CaptureError>>,
) {
    let stream = match build_stream(meta, producer, failure) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(CaptureError::DeviceFailed(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    while !closed.load(Ordering::SeqCst) {
        std::thread::park_timeout(Duration::from_millis(50));
    }
    drop(stream);
}

fn build_stream(
    meta: AudioMeta,
    mut producer: HeapProd<u8>,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, CaptureError> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceFailed("No input device available".into()))?;
    let format = find_format(&device, &meta).ok_or_else(|| {
        CaptureError::DeviceFailed(format!("Input device does not support {}", meta))
    })?;

    let device_channels = format.config.channels;
    let frame = meta.bytes_per_frame();
    let mut scratch = Vec::new();

    let on_error = move |err: StreamError| {
        warn!(error = %err, "input stream error");
        if matches!(err, StreamError::DeviceNotAvailable) {
            *failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
        }
    };

    let stream = match format.sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &format.config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                convert_i16(data, device_channels, &meta, &mut scratch);
                push_frames(&mut producer, &scratch, frame);
            },
            on_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &format.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                convert_f32(data, device_channels, &meta, &mut scratch);
                push_frames(&mut producer, &scratch, frame);
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::DeviceFailed(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| CaptureError::DeviceFailed(e.to_string()))
}

fn convert_i16(data: &[i16], device_channels: u16, meta: &AudioMeta, out: &mut Vec<u8>) {
    out.clear();
    let bits = meta.bits_per_sample();
    if meta.channels() == 1 && device_channels > 1 {
        for sample in pcm::downmix_i16(data, device_channels) {
            pcm::push_i16(out, sample, bits);
        }
    } else {
        for &sample in data {
            pcm::push_i16(out, sample, bits);
        }
    }
}

fn convert_f32(data: &[f32], device_channels: u16, meta: &AudioMeta, out: &mut Vec<u8>) {
    out.clear();
    let bits = meta.bits_per_sample();
    if meta.channels() == 1 && device_channels > 1 {
        for sample in pcm::downmix_f32(data, device_channels) {
            pcm::push_f32(out, sample, bits);
        }
    } else {
        for &sample in data {
            pcm::push_f32(out, sample, bits);
        }
    }
}

/// Push as many whole frames as fit; the rest is an overrun
fn push_frames(producer: &mut HeapProd<u8>, bytes: &[u8], frame: usize) {
    let room = producer.vacant_len();
    let fits = bytes.len().min(room - room % frame);
    producer.push_slice(&bytes[..fits]);
    if fits < bytes.len() {
        warn!(dropped = bytes.len() - fits, "capture overrun, dropping audio");
    }
}
