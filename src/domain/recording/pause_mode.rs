//! How a paused session treats the capture device

use std::fmt;
use std::str::FromStr;

use crate::domain::error::InvalidPauseMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseMode {
    /// Tear down the transfer loop and close the device; resume re-opens it.
    #[default]
    ReleaseDevice,
    /// Keep the device open and drain it while paused, discarding audio.
    KeepDevice,
}

impl PauseMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReleaseDevice => "release-device",
            Self::KeepDevice => "keep-device",
        }
    }
}

impl fmt::Display for PauseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PauseMode {
    type Err = InvalidPauseMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "release-device" | "release" => Ok(Self::ReleaseDevice),
            "keep-device" | "keep" => Ok(Self::KeepDevice),
            _ => Err(InvalidPauseMode { input: s.to_string() }),
        }
    }
}
