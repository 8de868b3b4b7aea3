//! Recording session state machine

use std::fmt;
use thiserror::Error;

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Preparing,
    Recording,
    Paused,
    Stopping,
}

impl SessionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }

    /// True while a capture session holds (or may re-acquire) the device
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused | Self::Stopping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an operation is not valid in the current state
#[derive(Debug, Clone, Error)]
#[error("Invalid state transition: cannot {action} while {current_state}")]
pub struct InvalidStateTransition {
    pub current_state: SessionState,
    pub action: String,
}

/// Outcome of a transition that may legitimately do nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

/// State holder for a recording session.
///
/// State machine:
///   IDLE | PREPARING -> PREPARING (prepare)
///   IDLE | PREPARING -> RECORDING (start)
///   RECORDING -> PAUSED (pause), PAUSED -> RECORDING (resume)
///   RECORDING | PAUSED -> STOPPING (begin_stop) -> IDLE (finish_stop)
///
/// `pause` and `resume` outside their source state are no-ops.
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn reject(&self, action: &str) -> InvalidStateTransition {
        InvalidStateTransition {
            current_state: self.state,
            action: action.to_string(),
        }
    }

    /// Check that `prepare` may proceed without changing state
    pub fn check_prepare(&self) -> Result<(), InvalidStateTransition> {
        if self.state.is_active() {
            return Err(self.reject("prepare"));
        }
        Ok(())
    }

    /// Enter PREPARING; refused while a capture session is active
    pub fn prepare(&mut self) -> Result<(), InvalidStateTransition> {
        self.check_prepare()?;
        self.state = SessionState::Preparing;
        Ok(())
    }

    /// Check that `start` may proceed without changing state
    pub fn check_start(&self) -> Result<(), InvalidStateTransition> {
        if self.state.is_active() {
            return Err(self.reject("start recording"));
        }
        Ok(())
    }

    /// Enter RECORDING from IDLE or PREPARING
    pub fn start(&mut self) -> Result<(), InvalidStateTransition> {
        self.check_start()?;
        self.state = SessionState::Recording;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<Transition, InvalidStateTransition> {
        match self.state {
            SessionState::Recording => {
                self.state = SessionState::Paused;
                Ok(Transition::Changed)
            }
            SessionState::Stopping => Err(self.reject("pause")),
            _ => Ok(Transition::Unchanged),
        }
    }

    pub fn resume(&mut self) -> Result<Transition, InvalidStateTransition> {
        match self.state {
            SessionState::Paused => {
                self.state = SessionState::Recording;
                Ok(Transition::Changed)
            }
            SessionState::Stopping => Err(self.reject("resume")),
            _ => Ok(Transition::Unchanged),
        }
    }

    /// Enter STOPPING, returning the state stop was called from
    pub fn begin_stop(&mut self) -> Result<SessionState, InvalidStateTransition> {
        match self.state {
            SessionState::Recording | SessionState::Paused => {
                let previous = self.state;
                self.state = SessionState::Stopping;
                Ok(previous)
            }
            _ => Err(self.reject("stop recording")),
        }
    }

    pub fn finish_stop(&mut self) -> Result<(), InvalidStateTransition> {
        if self.state != SessionState::Stopping {
            return Err(self.reject("finish stopping"));
        }
        self.state = SessionState::Idle;
        Ok(())
    }
}
