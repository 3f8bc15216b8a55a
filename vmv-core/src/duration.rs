//! Millisecond duration newtype, matching `layer0::duration::DurationMs`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A duration expressed in whole milliseconds, used anywhere the wire shape
/// wants a plain integer (`bedrockLatencyMs`, per-attempt backoff delays) instead
/// of `std::time::Duration`'s JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DurationMs(pub u64);

impl DurationMs {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Build from a millisecond count.
    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Build from a whole-second count.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// The millisecond count.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Convert to `std::time::Duration`.
    #[must_use]
    pub fn to_std(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for DurationMs {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Duration> for DurationMs {
    fn from(d: Duration) -> Self {
        Self(d.as_millis() as u64)
    }
}

impl From<DurationMs> for Duration {
    fn from(d: DurationMs) -> Self {
        d.to_std()
    }
}

impl fmt::Display for DurationMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
