//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod keep_alive;
pub mod notifier;
pub mod sink;

// Re-export common types
pub use capture::{CaptureBackend, CaptureError, CaptureSource};
pub use config::ConfigStore;
pub use encoder::{EncoderFactory, EncodingError, EncodingReady, StreamEncoder};
pub use keep_alive::{KeepAlive, KeepAliveError};
pub use notifier::{NotificationError, NotificationIcon, Notifier};
pub use sink::{ChunkSink, OutputStore, SinkError};
