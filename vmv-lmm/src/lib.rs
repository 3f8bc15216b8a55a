//! LMM gateway: the boundary between the stage orchestrator and the
//! Bedrock-hosted model.
//!
//! `LmmGateway` uses return-position `impl Trait` the way
//! `neuron-turn::provider::Provider` does — a single async method, not
//! object-safe, so the orchestrator is generic over its gateway
//! (`StageOrchestrator<L: LmmGateway>`) instead of boxing it, mirroring
//! `SingleShotOperator<P: Provider>`.

#![deny(missing_docs)]

pub mod bedrock;
pub mod request;
pub mod validate;

pub use bedrock::BedrockLmmGateway;
pub use request::{LmmRequest, LmmResponse, StopReason, ThinkingConfig};

use std::future::Future;

use vmv_core::Error;

/// Gateway to the large multimodal model. Implementations invoke the vendor
/// transport and map vendor errors through `Error::from_vendor_code`.
pub trait LmmGateway {
    /// Invoke the model with `request`, returning its parsed response.
    fn complete(&self, request: LmmRequest) -> impl Future<Output = Result<LmmResponse, Error>> + Send;
}
