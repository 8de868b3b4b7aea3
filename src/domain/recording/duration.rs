//! Duration value object

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::domain::error::DurationParseError;

/// Units accepted by the parser, largest first
const UNITS: [(char, u64); 3] = [('h', 3600), ('m', 60), ('s', 1)];

/// A positive, whole-second span such as a recording limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    seconds: u64,
}

impl Duration {
    pub const fn from_secs(seconds: u64) -> Self {
        Self { seconds }
    }

    pub const fn as_secs(&self) -> u64 {
        self.seconds
    }

    pub const fn as_millis(&self) -> u64 {
        self.seconds * 1000
    }

    pub const fn as_std(&self) -> StdDuration {
        StdDuration::from_secs(self.seconds)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    /// Parse strings like "45s", "2m30s" or "1h5m". Units must appear largest
    /// first and at most once.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || DurationParseError { input: s.to_string() };
        let input = s.trim().to_ascii_lowercase();

        let mut total: u64 = 0;
        let mut digits = String::new();
        let mut next_unit = 0;

        for ch in input.chars() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                continue;
            }
            let offset = UNITS[next_unit..]
                .iter()
                .position(|(unit, _)| *unit == ch)
                .ok_or_else(err)?;
            if digits.is_empty() {
                return Err(err());
            }
            let (_, scale) = UNITS[next_unit + offset];
            let value: u64 = digits.parse().map_err(|_| err())?;
            total = value
                .checked_mul(scale)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(err)?;
            digits.clear();
            next_unit += offset + 1;
        }

        if !digits.is_empty() || next_unit == 0 || total == 0 {
            return Err(err());
        }

        Ok(Self { seconds: total })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds == 0 {
            return write!(f, "0s");
        }
        let mut rest = self.seconds;
        for (unit, scale) in UNITS {
            let value = rest / scale;
            rest %= scale;
            if value > 0 {
                write!(f, "{}{}", value, unit)?;
            }
        }
        Ok(())
    }
}
