//! Capture port interfaces

use thiserror::Error;

use crate::domain::audio::AudioMeta;

/// Capture errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("No compatible capture device for any candidate sample rate")]
    NoCompatibleDevice,

    #[error("Capture device is already in use")]
    DeviceBusy,

    #[error("Capture source is closed")]
    SourceClosed,

    #[error("Capture device failed: {0}")]
    DeviceFailed(String),
}

/// An open, exclusively owned audio input.
///
/// Produces interleaved little-endian PCM in the format given by [`meta`].
///
/// [`meta`]: CaptureSource::meta
pub trait CaptureSource: Send {
    /// Negotiated format of the bytes returned by `read`
    fn meta(&self) -> AudioMeta;

    /// Minimum buffer size in bytes the device asked for at this rate
    fn buffer_size(&self) -> usize;

    /// Fill `buf` with captured PCM.
    ///
    /// Blocks until data arrives or the device's poll window lapses, in which
    /// case `Ok(0)` is returned. Fails with [`CaptureError::SourceClosed`]
    /// once the source has been closed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError>;

    /// Release the hardware handle. Idempotent.
    fn close(&mut self);
}

/// Port for the audio input hardware
pub trait CaptureBackend: Send + Sync {
    /// Whether the process may record from an input device
    fn has_permission(&self) -> bool;

    /// Minimum buffer size in bytes for this format, or `None` if the
    /// hardware rejects it
    fn min_buffer_size(&self, meta: &AudioMeta) -> Option<usize>;

    /// Open the device with the given format and buffer size
    fn open(
        &self,
        meta: AudioMeta,
        buffer_size: usize,
    ) -> Result<Box<dyn CaptureSource>, CaptureError>;
}
