//! Application layer - Use cases and port interfaces
//!
//! Contains the recording session, the capture transfer loop, the progress
//! clock and the trait definitions for external system interactions.

pub mod negotiation;
pub mod ports;
pub mod progress_clock;
pub mod session;
pub mod transfer_loop;

// Re-export use cases
pub use progress_clock::{ClockHandle, ProgressClock, TICK_INTERVAL};
pub use session::{RecordingSession, SessionConfig, SessionError, SessionEvent, FINISHED_OK};
pub use transfer_loop::{LoopControl, LoopEvent, LoopFailure, LoopMode, TransferLoop};
