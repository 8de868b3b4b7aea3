//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::audio::AudioMeta;
use crate::domain::recording::{Duration, PauseMode};

/// flac-recorder - stream the microphone into a FLAC file
#[derive(Parser, Debug)]
#[command(name = "flac-recorder")]
#[command(version)]
#[command(about = "Record the microphone straight into a FLAC file")]
#[command(long_about = None)]
pub struct Cli {
    /// Log pipeline activity to stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record until Ctrl+C, `stop` on stdin, or the max duration
    Record(RecordArgs),
    /// Report whether an input device can be used
    Permission,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of the record command
#[derive(clap::Args, Debug, Clone)]
pub struct RecordArgs {
    /// Output file (created or truncated)
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Preferred sample rate, tried before the configured candidates
    #[arg(short = 'r', long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Channel count
    #[arg(short = 'c', long, value_name = "N")]
    pub channels: Option<u8>,

    /// Bits per sample (8, 16 or 24)
    #[arg(short = 'b', long, value_name = "BITS")]
    pub bits_per_sample: Option<u8>,

    /// Stop automatically after this long (e.g., 30s, 5m, 1h30m)
    #[arg(short = 'd', long, value_name = "TIME")]
    pub max_duration: Option<String>,

    /// What pause does with the capture device
    #[arg(long, value_name = "MODE")]
    pub pause_mode: Option<PauseModeArg>,

    /// Show desktop notifications while the microphone is live
    #[arg(short = 'n', long)]
    pub notify: bool,

    /// Send notifications through notify-send instead of D-Bus
    #[arg(long, env = "FLAC_RECORDER_NOTIFY_SEND")]
    pub notify_send: bool,
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Pause mode argument for clap ValueEnum
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PauseModeArg {
    ReleaseDevice,
    KeepDevice,
}

impl From<PauseModeArg> for PauseMode {
    fn from(arg: PauseModeArg) -> Self {
        match arg {
            PauseModeArg::ReleaseDevice => PauseMode::ReleaseDevice,
            PauseModeArg::KeepDevice => PauseMode::KeepDevice,
        }
    }
}

/// Parsed record options, after merging with the config file
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub path: PathBuf,
    /// Requested format; the rate is only a preference
    pub meta: AudioMeta,
    pub sample_rates: Vec<u32>,
    pub block_size: usize,
    pub pause_mode: PauseMode,
    pub max_duration: Option<Duration>,
    pub notify: bool,
    pub notify_send: bool,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "sample_rates",
    "channels",
    "bits_per_sample",
    "block_size",
    "pause_mode",
    "notify",
    "max_duration",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
