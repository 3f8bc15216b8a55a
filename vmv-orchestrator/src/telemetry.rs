//! Correlation id generation and the tracing spans emitted at stage
//! boundaries.
//!
//! The id format (`<stage>-<epoch_ms>-<8_hex_random>-<counter>`) needs a
//! random component and a process-wide monotonic counter; the counter is
//! the same `AtomicU64`-per-process pattern `neuron-orch-local` uses for
//! request counters, and the random component uses `rand`'s thread-local
//! generator the way non-cryptographic ids are generated elsewhere in this
//! workspace's dependency stack.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use vmv_core::CorrelationId;

/// Generates correlation ids for one process's lifetime. Construct once at
/// bootstrap and share by reference with every stage invocation.
#[derive(Debug, Default)]
pub struct CorrelationIdGenerator {
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Build a fresh generator with its counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next id for `stage` (e.g. `"turn1"`, `"turn2"`).
    pub fn next(&self, stage: &str) -> CorrelationId {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let random: u32 = rand::thread_rng().gen();
        CorrelationId::new(format!("{stage}-{epoch_ms}-{random:08x}-{counter}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed_with_stage() {
        let gen = CorrelationIdGenerator::new();
        let a = gen.next("turn1");
        let b = gen.next("turn1");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("turn1-"));
        assert!(b.as_str().starts_with("turn1-"));
    }

    #[test]
    fn counter_component_is_strictly_increasing() {
        let gen = CorrelationIdGenerator::new();
        let a = gen.next("turn1");
        let b = gen.next("turn1");
        let a_counter: u64 = a.as_str().rsplit('-').next().unwrap().parse().unwrap();
        let b_counter: u64 = b.as_str().rsplit('-').next().unwrap().parse().unwrap();
        assert!(b_counter > a_counter);
    }

    #[test]
    fn id_has_four_dash_separated_segments() {
        let gen = CorrelationIdGenerator::new();
        let id = gen.next("turn2");
        assert_eq!(id.as_str().split('-').count(), 4);
    }
}
