//! Capture-to-encoder transfer loop
//!
//! One loop drives one capture source and one encoder on a dedicated thread.
//! It is the only reader of the source and the only caller of the encoder,
//! so encoder calls are serialized by construction.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::ports::{CaptureError, CaptureSource, EncodingError, EncodingReady, StreamEncoder};
use crate::domain::audio::{AudioMeta, EncodedChunk};
use crate::domain::recording::EndStatus;

/// Why a transfer loop ended early
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopFailure {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Events produced by a transfer loop, in order
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// A capture period began; the encoder was just initialized
    RecordStart(AudioMeta),
    /// Encoded output, in encoder order
    Chunk(EncodedChunk),
    /// A capture or encoder failure; the loop is ending
    RecordError(LoopFailure),
    /// The loop finished; always the last event
    RecordEnd(EndStatus),
}

/// Requested loop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Read and encode
    Run,
    /// Keep draining the source but discard audio; no encoder period is open
    Hold,
    /// Tear down at the next iteration
    Stop,
}

impl LoopMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Run,
            1 => Self::Hold,
            _ => Self::Stop,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Run => 0,
            Self::Hold => 1,
            Self::Stop => 2,
        }
    }
}

/// Cooperative control shared between the loop and its owner.
///
/// The loop checks the mode once per iteration; a blocked read is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct LoopControl {
    mode: Arc<AtomicU8>,
    exited: Arc<AtomicBool>,
    hold_ack: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> LoopMode {
        LoopMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    fn set(&self, mode: LoopMode) {
        // Stop is final
        let _ = self
            .mode
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (LoopMode::from_u8(current) != LoopMode::Stop).then_some(mode.as_u8())
            });
    }

    pub fn run(&self) {
        self.set(LoopMode::Run);
    }

    pub fn stop(&self) {
        self.set(LoopMode::Stop);
    }

    /// Ask the loop to close the current encoder period and drain.
    ///
    /// The returned receiver resolves once the period is released. It also
    /// resolves (with an error) if the loop has already exited.
    pub fn hold(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold_ack.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self.set(LoopMode::Hold);
        if self.has_exited() {
            self.acknowledge_hold();
        }
        rx
    }

    /// True once the loop has finished its teardown
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn acknowledge_hold(&self) {
        if let Some(tx) = self.hold_ack.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(());
        }
    }
}

/// Forwards encoder output onto the loop's event channel
struct ChunkForwarder {
    events: mpsc::UnboundedSender<LoopEvent>,
}

impl EncodingReady for ChunkForwarder {
    fn on_encoded(&mut self, chunk: EncodedChunk) {
        if !chunk.is_empty() {
            let _ = self.events.send(LoopEvent::Chunk(chunk));
        }
    }
}

/// Producer/consumer engine for one capture source
pub struct TransferLoop {
    source: Box<dyn CaptureSource>,
    encoder: Box<dyn StreamEncoder>,
    control: LoopControl,
    events: mpsc::UnboundedSender<LoopEvent>,
    buffer: Vec<u8>,
    period_open: bool,
}

impl TransferLoop {
    pub fn new(
        source: Box<dyn CaptureSource>,
        mut encoder: Box<dyn StreamEncoder>,
        control: LoopControl,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        encoder.set_encoding_ready(Box::new(ChunkForwarder {
            events: events.clone(),
        }));

        let frame = source.meta().bytes_per_frame().max(1);
        let size = source.buffer_size().max(frame);
        // whole frames only
        let buffer = vec![0u8; size - size % frame];

        Self {
            source,
            encoder,
            control,
            events,
            buffer,
            period_open: false,
        }
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self) -> Result<JoinHandle<EndStatus>, CaptureError> {
        std::thread::Builder::new()
            .name("capture-transfer".into())
            .spawn(move || self.run())
            .map_err(|e| CaptureError::DeviceFailed(format!("Failed to spawn capture thread: {}", e)))
    }

    /// Drive the loop on the current thread until stopped or failed
    pub fn run(mut self) -> EndStatus {
        let meta = self.source.meta();
        debug!(%meta, buffer = self.buffer.len(), "transfer loop started");

        let mut status = match self.pump(meta) {
            Ok(()) => EndStatus::EndedByUser,
            Err(failure) => {
                self.report(failure);
                EndStatus::EndedByError
            }
        };

        if let Err(failure) = self.close_period() {
            self.report(failure);
            status = EndStatus::EndedByError;
        }
        self.source.close();
        self.control.exited.store(true, Ordering::SeqCst);
        self.control.acknowledge_hold();

        debug!(%status, "transfer loop finished");
        let _ = self.events.send(LoopEvent::RecordEnd(status));
        status
    }

    fn pump(&mut self, meta: AudioMeta) -> Result<(), LoopFailure> {
        loop {
            match self.control.mode() {
                LoopMode::Stop => return Ok(()),
                LoopMode::Hold if self.period_open => {
                    self.close_period()?;
                    self.control.acknowledge_hold();
                }
                LoopMode::Hold => self.control.acknowledge_hold(),
                LoopMode::Run => {}
            }

            let read = match self.source.read(&mut self.buffer) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e) => return Err(e.into()),
            };

            // the mode may have changed while the read was blocked
            match self.control.mode() {
                LoopMode::Hold => continue,
                LoopMode::Stop if !self.period_open => continue,
                _ => {}
            }

            if !self.period_open {
                self.encoder.initialize(&meta)?;
                self.period_open = true;
                let _ = self.events.send(LoopEvent::RecordStart(meta));
            }

            self.encoder.encode(&self.buffer[..read])?;
        }
    }

    /// Release the encoder if a period is open
    fn close_period(&mut self) -> Result<(), LoopFailure> {
        if !self.period_open {
            return Ok(());
        }
        self.period_open = false;
        self.encoder.release()?;
        Ok(())
    }

    fn report(&self, failure: LoopFailure) {
        error!(error = %failure, "capture period failed");
        let _ = self.events.send(LoopEvent::RecordError(failure));
    }
}
