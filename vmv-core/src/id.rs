//! Typed identifiers, generated the way `layer0::id`'s `typed_id!` macro
//! generates `AgentId`/`SessionId`/`WorkflowId` — a thin newtype per id
//! space so `VerificationId` and `CorrelationId` can never be swapped by
//! accident at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Build from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

typed_id!(VerificationId, "Identifies one vending-machine verification request end to end.");
typed_id!(CorrelationId, "Identifies one stage invocation for log/trace correlation.");
typed_id!(LayoutId, "Identifies a vending machine layout referenced by a verification.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        let id = VerificationId::new("vm-0001");
        assert_eq!(id.to_string(), "vm-0001");
        assert_eq!(id.as_str(), "vm-0001");
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        let v = VerificationId::new("abc");
        let c = CorrelationId::new("abc");
        assert_eq!(v.as_str(), c.as_str());
    }
}
