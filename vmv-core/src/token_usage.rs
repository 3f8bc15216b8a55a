//! Token usage accounting, generalized from `neuron-turn::types::TokenUsage`
//! with the reasoning-token and cross-check fields needed to verify
//! `total == input + output + reasoning`, when `total` is present.

use serde::{Deserialize, Serialize};

/// Token usage reported for a single LMM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens consumed.
    pub input_tokens: u64,
    /// Output (completion) tokens generated.
    pub output_tokens: u64,
    /// Tokens spent on extended thinking/reasoning, if reported or estimated.
    pub reasoning_tokens: Option<u64>,
    /// Vendor-reported grand total, if present.
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    /// Build from the three components, leaving `total_tokens` to be derived.
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64, reasoning_tokens: Option<u64>) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens,
            total_tokens: None,
        }
    }

    /// The sum of input, output, and reasoning tokens, regardless of what
    /// `total_tokens` says.
    #[must_use]
    pub fn computed_total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.reasoning_tokens.unwrap_or(0)
    }

    /// Whether `total_tokens`, if present, agrees with `computed_total()`
    /// Returns `true` when `total_tokens` is absent — there
    /// is nothing to cross-check.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match self.total_tokens {
            Some(total) => total == self.computed_total(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistent_when_total_matches_sum() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            reasoning_tokens: Some(10),
            total_tokens: Some(160),
        };
        assert!(usage.is_consistent());
    }

    #[test]
    fn consistent_when_total_absent() {
        let usage = TokenUsage::new(100, 50, None);
        assert!(usage.is_consistent());
    }

    #[test]
    fn inconsistent_when_total_disagrees() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            reasoning_tokens: None,
            total_tokens: Some(999),
        };
        assert!(!usage.is_consistent());
    }

    #[test]
    fn computed_total_treats_missing_reasoning_as_zero() {
        let usage = TokenUsage::new(10, 20, None);
        assert_eq!(usage.computed_total(), 30);
    }
}
