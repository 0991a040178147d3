//! Wall-clock timeout values with unit parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A timeout stored in whole milliseconds.
///
/// Supports parsing from strings like "500ms", "10s", "2m", and bare numeric
/// values (interpreted as milliseconds). Displays using the largest unit that
/// represents the value exactly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeout(u64);

impl Timeout {
    /// Creates a timeout from a number of milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns the timeout in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the timeout as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timeout({self})")
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0;
        if ms != 0 && ms % 60_000 == 0 {
            write!(f, "{}m", ms / 60_000)
        } else if ms != 0 && ms % 1_000 == 0 {
            write!(f, "{}s", ms / 1_000)
        } else {
            write!(f, "{ms}ms")
        }
    }
}

/// Error type for parsing timeout strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeoutError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timeout: '{}'", self.input)
    }
}

impl std::error::Error for ParseTimeoutError {}

impl FromStr for Timeout {
    type Err = ParseTimeoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseTimeoutError {
            input: s.to_string(),
        };

        // Order matters: "ms" must be tried before "s" and "m".
        let lower = s.to_ascii_lowercase();
        if let Some(num) = lower.strip_suffix("ms") {
            let val: u64 = num.trim().parse().map_err(|_| err())?;
            return Ok(Timeout(val));
        }
        if let Some(num) = lower.strip_suffix('s') {
            let val: u64 = num.trim().parse().map_err(|_| err())?;
            return val.checked_mul(1_000).map(Timeout).ok_or_else(err);
        }
        if let Some(num) = lower.strip_suffix('m') {
            let val: u64 = num.trim().parse().map_err(|_| err())?;
            return val.checked_mul(60_000).map(Timeout).ok_or_else(err);
        }

        // Bare number: milliseconds
        let val: u64 = s.parse().map_err(|_| err())?;
        Ok(Timeout(val))
    }
}
