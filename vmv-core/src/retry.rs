//! Retry strategy value type. The policy engine that picks
//! a strategy per vendor error code and computes concrete delays lives in
//! `vmv-orchestrator::retry`; this crate only needs the shared vocabulary so
//! `Error` can carry a `RetryStrategy` without depending on the orchestrator.

use serde::{Deserialize, Serialize};

/// A backoff family, parameterized the way the retry table specifies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Do not retry.
    None,
    /// Retry immediately with no delay.
    Immediate,
    /// Delay grows linearly: `base_ms * attempt`.
    Linear {
        /// Per-attempt delay increment, in milliseconds.
        base_ms: u64,
    },
    /// Delay grows exponentially: `base_ms * 2^(attempt - 1)`.
    Exponential {
        /// Base delay, in milliseconds.
        base_ms: u64,
    },
    /// Exponential delay with +/-25% jitter applied.
    Jittered {
        /// Base delay, in milliseconds, before jitter.
        base_ms: u64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::None
    }
}
