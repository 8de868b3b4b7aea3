//! Application configuration value object

use serde::{Deserialize, Serialize};

use crate::domain::recording::{Duration, PauseMode};

/// Candidate capture rates, best quality first
pub const DEFAULT_SAMPLE_RATES: [u32; 4] = [44100, 22050, 16000, 11025];

pub const DEFAULT_CHANNELS: u8 = 1;

pub const DEFAULT_BITS_PER_SAMPLE: u8 = 16;

/// FLAC block size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub sample_rates: Option<Vec<u32>>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u8>,
    pub block_size: Option<usize>,
    pub pause_mode: Option<String>,
    pub notify: Option<bool>,
    pub max_duration: Option<String>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            sample_rates: Some(DEFAULT_SAMPLE_RATES.to_vec()),
            channels: Some(DEFAULT_CHANNELS),
            bits_per_sample: Some(DEFAULT_BITS_PER_SAMPLE),
            block_size: Some(DEFAULT_BLOCK_SIZE),
            pause_mode: Some(PauseMode::default().to_string()),
            notify: Some(false),
            max_duration: None,
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            sample_rates: other.sample_rates.or(self.sample_rates),
            channels: other.channels.or(self.channels),
            bits_per_sample: other.bits_per_sample.or(self.bits_per_sample),
            block_size: other.block_size.or(self.block_size),
            pause_mode: other.pause_mode.or(self.pause_mode),
            notify: other.notify.or(self.notify),
            max_duration: other.max_duration.or(self.max_duration),
        }
    }

    /// Candidate rates, or the default list if unset or empty
    pub fn sample_rates_or_default(&self) -> Vec<u32> {
        self.sample_rates
            .as_ref()
            .filter(|rates| !rates.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_SAMPLE_RATES.to_vec())
    }

    pub fn channels_or_default(&self) -> u8 {
        self.channels.filter(|&c| c > 0).unwrap_or(DEFAULT_CHANNELS)
    }

    pub fn bits_per_sample_or_default(&self) -> u8 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    pub fn block_size_or_default(&self) -> usize {
        self.block_size.filter(|&b| b > 0).unwrap_or(DEFAULT_BLOCK_SIZE)
    }

    /// Get pause mode as parsed PauseMode, or default if not set/invalid
    pub fn pause_mode_or_default(&self) -> PauseMode {
        self.pause_mode
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn notify_or_default(&self) -> bool {
        self.notify.unwrap_or(false)
    }

    /// Parsed auto-stop limit; unset or invalid means record until stopped
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration.as_ref().and_then(|s| s.parse().ok())
    }
}
