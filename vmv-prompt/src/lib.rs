//! Prompt builder: loads handlebars templates from
//! `TEMPLATE_BASE_PATH/TEMPLATE_VERSION`, flattens verification context into
//! the shape those templates expect, and estimates whether a rendered
//! prompt fits the configured token budget.

#![deny(missing_docs)]

pub mod builder;
pub mod context;
pub mod helpers;

pub use builder::{estimate_tokens, PromptBuilder};
pub use context::{PromptContext, VerificationSummary};
