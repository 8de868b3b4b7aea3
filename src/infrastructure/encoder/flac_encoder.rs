//! FLAC stream encoder using flacenc
//!
//! `initialize` emits the stream header (`fLaC` plus STREAMINFO with an
//! unknown sample count). Every full block of PCM is encoded as one frame
//! and emitted right away, so at most one block is buffered. `release`
//! encodes the trailing partial block.

use flacenc::bitsink::ByteSink;
use flacenc::component::{BitRepr, Stream, StreamInfo};
use flacenc::config;
use flacenc::error::{Verified, Verify};
use flacenc::source::{Fill, FrameBuf};
use tracing::debug;

use crate::application::ports::{EncoderFactory, EncodingError, EncodingReady, StreamEncoder};
use crate::domain::audio::{pcm, AudioMeta, EncodedChunk};
use crate::domain::config::DEFAULT_BLOCK_SIZE;

/// Largest chunk handed to the callback
pub const MAX_CHUNK_BYTES: usize = 4096;

/// Deepest sample format flacenc accepts
const MAX_BITS_PER_SAMPLE: u8 = 24;

/// Per-period encoding state
struct Period {
    meta: AudioMeta,
    config: Verified<config::Encoder>,
    stream_info: StreamInfo,
    framebuf: FrameBuf,
    frame_number: usize,
    /// PCM bytes not yet forming a full block
    pending: Vec<u8>,
}

impl Period {
    fn block_bytes(&self) -> usize {
        self.framebuf.size() * self.meta.bytes_per_frame()
    }

    /// Encode `bytes` (whole interleaved frames) as the next FLAC frame
    fn encode_frame(&mut self, bytes: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let samples = pcm::unpack(bytes, self.meta.bits_per_sample());
        self.framebuf
            .fill_interleaved(&samples)
            .map_err(|e| EncodingError::Encode(format!("{:?}", e)))?;

        let frame = flacenc::encode_fixed_size_frame(
            &self.config,
            &self.framebuf,
            self.frame_number,
            &self.stream_info,
        )
        .map_err(|e| EncodingError::Encode(format!("{:?}", e)))?;
        self.frame_number += 1;

        let mut sink = ByteSink::new();
        frame
            .write(&mut sink)
            .map_err(|e| EncodingError::Write(e.to_string()))?;
        Ok(sink.into_inner())
    }
}

/// Frame-streaming FLAC encoder
pub struct FlacStreamEncoder {
    block_size: usize,
    ready: Option<Box<dyn EncodingReady>>,
    period: Option<Period>,
}

impl FlacStreamEncoder {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            ready: None,
            period: None,
        }
    }

    fn encoder_config(&self) -> config::Encoder {
        let mut config = config::Encoder::default();
        config.block_size = self.block_size;
        config
    }

    fn emit(&mut self, bytes: Vec<u8>) {
        if let Some(ready) = self.ready.as_mut() {
            for chunk in bytes.chunks(MAX_CHUNK_BYTES) {
                ready.on_encoded(EncodedChunk::new(chunk.to_vec()));
            }
        }
    }

    /// Bytes held back waiting for a full block
    pub fn buffered_bytes(&self) -> usize {
        self.period.as_ref().map_or(0, |p| p.pending.len())
    }
}

impl Default for FlacStreamEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl StreamEncoder for FlacStreamEncoder {
    fn set_encoding_ready(&mut self, ready: Box<dyn EncodingReady>) {
        self.ready = Some(ready);
    }

    fn initialize(&mut self, meta: &AudioMeta) -> Result<(), EncodingError> {
        if meta.bits_per_sample() > MAX_BITS_PER_SAMPLE {
            return Err(EncodingError::Config(format!(
                "FLAC supports at most {} bits per sample, got {}",
                MAX_BITS_PER_SAMPLE,
                meta.bits_per_sample()
            )));
        }
        let config = self
            .encoder_config()
            .into_verified()
            .map_err(|(_, e)| EncodingError::Config(format!("{:?}", e)))?;

        let channels = usize::from(meta.channels());
        let info = StreamInfo::new(
            meta.sample_rate_hz() as usize,
            channels,
            usize::from(meta.bits_per_sample()),
        )
        .map_err(|e| EncodingError::Config(format!("{:?}", e)))?;
        // written before any frame exists, so total samples and MD5 stay
        // zero (unknown)
        let mut header_info = info.clone();
        header_info
            .set_block_sizes(self.block_size, self.block_size)
            .map_err(|e| EncodingError::Config(format!("{:?}", e)))?;
        header_info
            .set_frame_sizes(0, 0)
            .map_err(|e| EncodingError::Config(format!("{:?}", e)))?;
        let stream = Stream::with_stream_info(header_info);

        let framebuf = FrameBuf::with_size(channels, self.block_size)
            .map_err(|e| EncodingError::Config(format!("{:?}", e)))?;

        let mut sink = ByteSink::new();
        stream
            .write(&mut sink)
            .map_err(|e| EncodingError::Write(e.to_string()))?;

        self.period = Some(Period {
            meta: *meta,
            config,
            stream_info: info,
            framebuf,
            frame_number: 0,
            pending: Vec::new(),
        });
        self.emit(sink.into_inner());
        Ok(())
    }

    fn encode(&mut self, pcm: &[u8]) -> Result<(), EncodingError> {
        let period = self.period.as_mut().ok_or(EncodingError::NotInitialized)?;
        period.pending.extend_from_slice(pcm);

        let block_bytes = period.block_bytes();
        let mut encoded = Vec::new();
        while period.pending.len() >= block_bytes {
            let block: Vec<u8> = period.pending.drain(..block_bytes).collect();
            encoded.extend(period.encode_frame(&block)?);
        }
        if !encoded.is_empty() {
            self.emit(encoded);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), EncodingError> {
        let mut period = self.period.take().ok_or(EncodingError::NotInitialized)?;
        let frame_bytes = period.meta.bytes_per_frame();
        let mut tail = std::mem::take(&mut period.pending);
        tail.truncate(tail.len() - tail.len() % frame_bytes);

        if !tail.is_empty() {
            period.framebuf.resize(tail.len() / frame_bytes);
            let bytes = period.encode_frame(&tail)?;
            self.emit(bytes);
        }
        debug!(frames = period.frame_number, "period encoded");
        Ok(())
    }
}

/// Builds a [`FlacStreamEncoder`] per capture period
#[derive(Debug, Clone, Copy)]
pub struct FlacEncoderFactory {
    block_size: usize,
}

impl FlacEncoderFactory {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl Default for FlacEncoderFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl EncoderFactory for FlacEncoderFactory {
    fn create(&self) -> Box<dyn StreamEncoder> {
        Box::new(FlacStreamEncoder::new(self.block_size))
    }
}
