//! Stream encoder port interfaces

use thiserror::Error;

use crate::domain::audio::{AudioMeta, EncodedChunk};

/// Encoder errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Encoder config error: {0}")]
    Config(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Encoder output failed: {0}")]
    Write(String),

    #[error("Encoder used before initialize")]
    NotInitialized,
}

/// Receives encoded output as the encoder produces it
pub trait EncodingReady: Send {
    fn on_encoded(&mut self, chunk: EncodedChunk);
}

impl<F> EncodingReady for F
where
    F: FnMut(EncodedChunk) + Send,
{
    fn on_encoded(&mut self, chunk: EncodedChunk) {
        self(chunk)
    }
}

/// Incremental PCM encoder.
///
/// Lifecycle per capture period: `initialize`, any number of `encode`,
/// then `release`. An encoder may be initialized again after release.
/// Output is pushed to the [`EncodingReady`] callback, possibly during
/// `encode` and `release`.
pub trait StreamEncoder: Send {
    fn set_encoding_ready(&mut self, ready: Box<dyn EncodingReady>);

    fn initialize(&mut self, meta: &AudioMeta) -> Result<(), EncodingError>;

    /// Feed interleaved little-endian PCM bytes
    fn encode(&mut self, pcm: &[u8]) -> Result<(), EncodingError>;

    /// Flush pending output and free per-period resources
    fn release(&mut self) -> Result<(), EncodingError>;
}

/// Builds a fresh encoder for each transfer loop
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Box<dyn StreamEncoder>;
}

impl<F> EncoderFactory for F
where
    F: Fn() -> Box<dyn StreamEncoder> + Send + Sync,
{
    fn create(&self) -> Box<dyn StreamEncoder> {
        self()
    }
}
