//! Configuration value objects

mod app_config;

pub use app_config::{
    AppConfig, DEFAULT_BITS_PER_SAMPLE, DEFAULT_BLOCK_SIZE, DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATES,
};
