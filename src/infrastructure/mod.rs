//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with external systems like cpal, flacenc and the
//! desktop notification server.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod keep_alive;
pub mod notification;
pub mod output;

// Re-export adapters
pub use capture::CpalCaptureBackend;
pub use config::XdgConfigStore;
pub use encoder::{FlacEncoderFactory, FlacStreamEncoder};
pub use keep_alive::{NoopKeepAlive, NotifierKeepAlive};
pub use notification::{create_notifier, NotifyRustNotifier, NotifySendNotifier};
pub use output::FsOutputStore;
