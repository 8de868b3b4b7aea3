//! Terminal status of a capture period

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndStatus {
    /// Stopped or paused by the caller
    EndedByUser,
    /// Terminated by a capture or encoder failure
    EndedByError,
}

impl EndStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EndedByUser => "ended-by-user",
            Self::EndedByError => "ended-by-error",
        }
    }
}

impl fmt::Display for EndStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
