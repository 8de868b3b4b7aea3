//! Domain layer - Core recording logic
//!
//! Contains value objects, the session state machine, and domain errors.
//! This layer has no dependencies on external systems.

pub mod audio;
pub mod config;
pub mod error;
pub mod recording;

// Re-export common types
pub use audio::{AudioMeta, EncodedChunk};
pub use config::AppConfig;
pub use error::*;
pub use recording::{Duration, EndStatus, PauseMode, SessionLifecycle, SessionState};
