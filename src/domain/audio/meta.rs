//! Audio format descriptor

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::InvalidAudioMeta;

/// Bit depths accepted for capture and encoding
pub const SUPPORTED_BITS_PER_SAMPLE: [u8; 4] = [8, 16, 24, 32];

/// Sample rate, channel count and bit depth of a PCM stream.
///
/// Built once per session from the caller's request, then rewritten with the
/// rate the hardware accepted. It never changes after the first capture
/// period starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioMeta {
    sample_rate_hz: u32,
    channels: u8,
    bits_per_sample: u8,
}

impl AudioMeta {
    /// Create a validated descriptor
    pub fn new(sample_rate_hz: u32, channels: u8, bits_per_sample: u8) -> Result<Self, InvalidAudioMeta> {
        if sample_rate_hz == 0 {
            return Err(InvalidAudioMeta::SampleRate(sample_rate_hz));
        }
        if channels == 0 {
            return Err(InvalidAudioMeta::Channels(channels));
        }
        if !SUPPORTED_BITS_PER_SAMPLE.contains(&bits_per_sample) {
            return Err(InvalidAudioMeta::BitsPerSample(bits_per_sample));
        }
        Ok(Self {
            sample_rate_hz,
            channels,
            bits_per_sample,
        })
    }

    /// 16-bit PCM at the given rate and channel count
    pub fn pcm16(sample_rate_hz: u32, channels: u8) -> Result<Self, InvalidAudioMeta> {
        Self::new(sample_rate_hz, channels, 16)
    }

    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub const fn channels(&self) -> u8 {
        self.channels
    }

    pub const fn bits_per_sample(&self) -> u8 {
        self.bits_per_sample
    }

    /// Bytes used by one sample of one channel
    pub const fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes used by one interleaved frame (one sample per channel)
    pub const fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Bytes of PCM produced per second of audio
    pub const fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate_hz as usize
    }

    /// Same format at another sample rate
    pub fn with_sample_rate(self, sample_rate_hz: u32) -> Result<Self, InvalidAudioMeta> {
        Self::new(sample_rate_hz, self.channels, self.bits_per_sample)
    }
}

impl fmt::Display for AudioMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}-bit",
            self.sample_rate_hz, self.channels, self.bits_per_sample
        )
    }
}
