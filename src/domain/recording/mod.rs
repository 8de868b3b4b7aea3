//! Recording domain: durations, session states, period outcomes

mod duration;
mod pause_mode;
mod state;
mod status;

pub use duration::Duration;
pub use pause_mode::PauseMode;
pub use state::{InvalidStateTransition, SessionLifecycle, SessionState, Transition};
pub use status::EndStatus;
