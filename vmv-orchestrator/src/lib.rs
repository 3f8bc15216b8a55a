//! Orchestration layer for the vending-machine verification pipeline:
//! correlation ids, event normalization, context loading, response parsing,
//! the canonical stage output shape, and the stage orchestrator that ties
//! them together.
//!
//! Plays the role `neuron-orch-local` plays in the source workspace this
//! crate is grounded on, but generic over a single non-object-safe
//! `LmmGateway` type parameter instead
//! of dispatching across a registry of boxed operators, since this pipeline
//! always runs exactly one kind of stage per process. Retries live one layer
//! down, in the gateway each of them wraps (DynamoDB's adaptive retry,
//! Bedrock's own timeout handling) rather than at this layer — an LMM call
//! is retried by re-invoking the whole stage, never by looping in place.

#![deny(missing_docs)]

pub mod context_loader;
pub mod event;
pub mod output;
pub mod response_parser;
pub mod stage;
pub mod telemetry;

pub use context_loader::LoadedContext;
pub use event::NormalizedEvent;
pub use output::{Discrepancy, StageOutput, StageSummary};
pub use response_parser::ParsedResponse;
pub use stage::{StageOrchestrator, StageSettings};
pub use telemetry::CorrelationIdGenerator;
