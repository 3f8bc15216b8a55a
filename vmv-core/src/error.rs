//! The error model: a single, richly tagged error value used across every
//! gateway and the stage orchestrator, instead of a per-domain enum per crate.
//!
//! `layer0::error` defines one small `thiserror` enum per
//! domain (`OperatorError`, `OrchError`, `StateError`, ...) each carrying a
//! catch-all `Other` variant. The orchestrator here crosses object storage,
//! key-value storage, an LMM gateway, and template rendering in a single
//! stage execution and needs a uniform shape to persist into status history
//! and the canonical stage output, so the per-domain enums are
//! collapsed into one `ErrorKind` discriminant plus a struct carrying the
//! metadata callers need (retry strategy, attempt counters, correlation
//! id, recovery hints). `ErrorKind` itself stays a `thiserror::Error` enum in
//! that same style, and `Error` wraps it the way `ContextError` wraps
//! `ProviderError` in `neuron-types::error`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::retry::RetryStrategy;

/// Broad failure category, used for metrics/log grouping and for deciding
/// whether a failure belongs in `TURN1_ERROR`, `TEMPLATE_PROCESSING_ERROR`,
/// or `BEDROCK_PROCESSING_FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Malformed or missing input (event shape, config, validation rules).
    Validation,
    /// Process bootstrap / environment configuration failure.
    Config,
    /// Object store (S3-style) read or write failure.
    ObjectStore,
    /// Key-value store (DynamoDB-style) read or write failure.
    KeyValue,
    /// LMM gateway (Bedrock) invocation failure.
    Lmm,
    /// Prompt template loading or rendering failure.
    Template,
    /// Parsing the LMM's response into structured artifacts failed.
    ResponseParsing,
    /// Anything that does not fit the above; should be rare.
    Internal,
}

/// Operational severity, independent of `Category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; stage can proceed.
    Info,
    /// Recoverable via retry.
    Warning,
    /// Stage must terminate.
    Error,
    /// Operator intervention likely required (e.g. config, quota).
    Critical,
}

/// The specific failure, matching the vendor error taxonomy plus the
/// local validation/config/parsing failure modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Inbound event or request failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A required environment variable was missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Requested resource was not found in the object or key-value store.
    #[error("not found: {0}")]
    NotFound(String),
    /// Vendor reported `ValidationException`.
    #[error("vendor validation exception: {0}")]
    VendorValidation(String),
    /// Vendor reported `ConditionalCheckFailedException`.
    #[error("vendor conditional check failed: {0}")]
    VendorConditionalCheckFailed(String),
    /// Vendor reported `ProvisionedThroughputExceededException`.
    #[error("vendor throughput exceeded: {0}")]
    VendorThroughputExceeded(String),
    /// Vendor reported `ResourceNotFoundException`.
    #[error("vendor resource not found: {0}")]
    VendorResourceNotFound(String),
    /// Vendor reported `InternalServerError`.
    #[error("vendor internal server error: {0}")]
    VendorInternalServerError(String),
    /// Vendor reported `ServiceUnavailableException`.
    #[error("vendor service unavailable: {0}")]
    VendorServiceUnavailable(String),
    /// Vendor reported `ThrottlingException`.
    #[error("vendor throttled: {0}")]
    VendorThrottling(String),
    /// Vendor reported `TransactionConflictException`.
    #[error("vendor transaction conflict: {0}")]
    VendorTransactionConflict(String),
    /// Vendor reported `TransactionCanceledException`.
    #[error("vendor transaction canceled: {0}")]
    VendorTransactionCanceled(String),
    /// Vendor reported `LimitExceededException`.
    #[error("vendor limit exceeded: {0}")]
    VendorLimitExceeded(String),
    /// Vendor reported `ItemCollectionSizeLimitExceededException`.
    #[error("vendor item collection size limit exceeded: {0}")]
    VendorItemCollectionSizeLimitExceeded(String),
    /// Vendor reported `RequestLimitExceeded`.
    #[error("vendor request limit exceeded: {0}")]
    VendorRequestLimitExceeded(String),
    /// Network-level failure talking to a gateway (connection reset, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),
    /// Gateway call exceeded its configured timeout.
    #[error("timeout after {0}ms")]
    Timeout(u64),
    /// The LMM call itself exceeded its deadline. Distinct from `Timeout`
    /// because it is never retried at stage level — a retry happens only by
    /// re-invoking the whole stage, never by looping on the same call.
    #[error("lmm call timed out after {0}ms")]
    LmmTimeout(u64),
    /// Template file missing or failed to render.
    #[error("template error: {0}")]
    Template(String),
    /// LMM response could not be parsed into the expected shape.
    #[error("response parse error: {0}")]
    ResponseParse(String),
    /// Unclassified vendor or transport error, preserved verbatim.
    #[error("unclassified error: {0}")]
    Unclassified(String),
}

impl ErrorKind {
    /// The `Category` this kind belongs to.
    #[must_use]
    pub fn category(&self) -> Category {
        use ErrorKind::*;
        match self {
            Validation(_) => Category::Validation,
            Config(_) => Category::Config,
            NotFound(_) => Category::Internal,
            VendorValidation(_) | VendorConditionalCheckFailed(_) => Category::Validation,
            VendorThroughputExceeded(_)
            | VendorResourceNotFound(_)
            | VendorTransactionConflict(_)
            | VendorTransactionCanceled(_)
            | VendorItemCollectionSizeLimitExceeded(_) => Category::KeyValue,
            VendorInternalServerError(_)
            | VendorServiceUnavailable(_)
            | VendorThrottling(_)
            | VendorRequestLimitExceeded(_)
            | VendorLimitExceeded(_) => Category::Lmm,
            Network(_) | Timeout(_) => Category::Lmm,
            LmmTimeout(_) => Category::Lmm,
            Template(_) => Category::Template,
            ResponseParse(_) => Category::ResponseParsing,
            Unclassified(_) => Category::Internal,
        }
    }

    /// Whether this kind of failure is inherently retryable (before any
    /// attempt-ceiling accounting from the retry policy engine).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        use ErrorKind::*;
        matches!(
            self,
            VendorThroughputExceeded(_)
                | VendorInternalServerError(_)
                | VendorServiceUnavailable(_)
                | VendorThrottling(_)
                | VendorTransactionConflict(_)
                | VendorRequestLimitExceeded(_)
                | Network(_)
                | Timeout(_)
        )
    }

    /// The vendor exception name this kind was classified from, if any,
    /// matching the vendor's literal exception strings.
    #[must_use]
    pub fn vendor_code(&self) -> Option<&'static str> {
        use ErrorKind::*;
        Some(match self {
            VendorValidation(_) => "ValidationException",
            VendorConditionalCheckFailed(_) => "ConditionalCheckFailedException",
            VendorThroughputExceeded(_) => "ProvisionedThroughputExceededException",
            VendorResourceNotFound(_) => "ResourceNotFoundException",
            VendorInternalServerError(_) => "InternalServerError",
            VendorServiceUnavailable(_) => "ServiceUnavailableException",
            VendorThrottling(_) => "ThrottlingException",
            VendorTransactionConflict(_) => "TransactionConflictException",
            VendorTransactionCanceled(_) => "TransactionCanceledException",
            VendorLimitExceeded(_) => "LimitExceededException",
            VendorItemCollectionSizeLimitExceeded(_) => "ItemCollectionSizeLimitExceededException",
            VendorRequestLimitExceeded(_) => "RequestLimitExceeded",
            _ => return None,
        })
    }
}

/// The full error value persisted to status history and returned from every
/// gateway trait. Built via the `Error::validation`/`Error::vendor` etc.
/// factories and enriched fluently (`.with_component(..)`, `.with_attempt(..)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    kind: ErrorKind,
    category: Category,
    severity: Severity,
    retryable: bool,
    retry_strategy: RetryStrategy,
    http_status: Option<u16>,
    component: Option<String>,
    operation: Option<String>,
    correlation_id: Option<String>,
    attempt: Option<u32>,
    max_attempts: Option<u32>,
    #[serde(default)]
    details: BTreeMap<String, String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    recovery_hints: Vec<String>,
}

impl Error {
    fn new(kind: ErrorKind, severity: Severity, retry_strategy: RetryStrategy) -> Self {
        let category = kind.category();
        let retryable = kind.is_retryable();
        Self {
            kind,
            category,
            severity,
            retryable,
            retry_strategy,
            http_status: None,
            component: None,
            operation: None,
            correlation_id: None,
            attempt: None,
            max_attempts: None,
            details: BTreeMap::new(),
            suggestions: Vec::new(),
            recovery_hints: Vec::new(),
        }
    }

    /// Build a validation failure (non-retryable).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Validation(message.into()),
            Severity::Error,
            RetryStrategy::None,
        )
    }

    /// Build a configuration/bootstrap failure (non-retryable, critical).
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Config(message.into()),
            Severity::Critical,
            RetryStrategy::None,
        )
    }

    /// Build a not-found failure (non-retryable).
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NotFound(message.into()),
            Severity::Error,
            RetryStrategy::None,
        )
    }

    /// Build a template failure (non-retryable; feeds `TEMPLATE_PROCESSING_ERROR`).
    #[must_use]
    pub fn template(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Template(message.into()),
            Severity::Error,
            RetryStrategy::None,
        )
    }

    /// Build a response-parsing failure (non-retryable).
    #[must_use]
    pub fn response_parse(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ResponseParse(message.into()),
            Severity::Error,
            RetryStrategy::None,
        )
    }

    /// Build a network/transport failure (retryable, jittered backoff).
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Network(message.into()),
            Severity::Warning,
            RetryStrategy::Jittered { base_ms: 500 },
        )
    }

    /// Build a timeout failure (retryable, jittered backoff).
    #[must_use]
    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::new(
            ErrorKind::Timeout(elapsed_ms),
            Severity::Warning,
            RetryStrategy::Jittered { base_ms: 500 },
        )
    }

    /// Build an LMM call timeout (non-retryable at stage level: a retry
    /// happens by re-invoking the entire stage, never by looping on this
    /// call).
    #[must_use]
    pub fn lmm_timeout(elapsed_ms: u64) -> Self {
        Self::new(ErrorKind::LmmTimeout(elapsed_ms), Severity::Error, RetryStrategy::None)
    }

    /// Classify a vendor exception name (case-insensitive substring match
    /// against a fixed list, first match wins) plus a free-text message
    /// into a fully-formed `Error` with the matching `RetryStrategy`.
    #[must_use]
    pub fn from_vendor_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = code.to_ascii_lowercase();
        let (kind, strategy): (fn(String) -> ErrorKind, RetryStrategy) = if lower
            .contains("conditionalcheckfailedexception")
        {
            (ErrorKind::VendorConditionalCheckFailed, RetryStrategy::None)
        } else if lower.contains("validationexception") {
            (ErrorKind::VendorValidation, RetryStrategy::None)
        } else if lower.contains("provisionedthroughputexceededexception") {
            (
                ErrorKind::VendorThroughputExceeded,
                RetryStrategy::Exponential { base_ms: 200 },
            )
        } else if lower.contains("resourcenotfoundexception") {
            (ErrorKind::VendorResourceNotFound, RetryStrategy::None)
        } else if lower.contains("internalservererror") {
            (
                ErrorKind::VendorInternalServerError,
                RetryStrategy::Exponential { base_ms: 200 },
            )
        } else if lower.contains("serviceunavailableexception") {
            (
                ErrorKind::VendorServiceUnavailable,
                RetryStrategy::Exponential { base_ms: 200 },
            )
        } else if lower.contains("throttlingexception") {
            (
                ErrorKind::VendorThrottling,
                RetryStrategy::Jittered { base_ms: 200 },
            )
        } else if lower.contains("transactionconflictexception") {
            (
                ErrorKind::VendorTransactionConflict,
                RetryStrategy::Linear { base_ms: 200 },
            )
        } else if lower.contains("transactioncanceledexception") {
            (ErrorKind::VendorTransactionCanceled, RetryStrategy::None)
        } else if lower.contains("limitexceededexception") {
            (ErrorKind::VendorLimitExceeded, RetryStrategy::None)
        } else if lower.contains("itemcollectionsizelimitexceededexception") {
            (
                ErrorKind::VendorItemCollectionSizeLimitExceeded,
                RetryStrategy::None,
            )
        } else if lower.contains("requestlimitexceeded") {
            (
                ErrorKind::VendorRequestLimitExceeded,
                RetryStrategy::Jittered { base_ms: 200 },
            )
        } else {
            (ErrorKind::Unclassified, RetryStrategy::None)
        };
        let kind = kind(message);
        let severity = if kind.is_retryable() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self::new(kind, severity, strategy)
    }

    /// Attach the component that raised this error (e.g. `"object_store"`).
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Attach the operation that raised this error (e.g. `"store_json"`).
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach the correlation id active when this error occurred.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach the HTTP status code, if the failure came over HTTP.
    #[must_use]
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Record the attempt number and ceiling this error was raised at.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = Some(attempt);
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Attach a free-form detail key/value pair.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach an operator-facing suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Attach a machine-actionable recovery hint.
    #[must_use]
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hints.push(hint.into());
        self
    }

    /// The error kind's stable machine-readable code, for log/metric grouping.
    #[must_use]
    pub fn code(&self) -> String {
        self.kind.vendor_code().map_or_else(
            || {
                serde_json::to_value(&self.kind)
                    .ok()
                    .and_then(|v| v.get("kind").and_then(|k| k.as_str().map(str::to_string)))
                    .unwrap_or_else(|| "unclassified".to_string())
            },
            str::to_string,
        )
    }

    /// Whether this error should be retried per the retry policy engine.
    #[must_use]
    pub fn retryable(&self) -> bool {
        self.retryable
    }

    /// Which backoff strategy governs retries of this error.
    #[must_use]
    pub fn retry_strategy(&self) -> RetryStrategy {
        self.retry_strategy
    }

    /// The broad failure category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// The operational severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The underlying `ErrorKind`.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(component) = &self.component {
            write!(f, " (component={component})")?;
        }
        if let Some(operation) = &self.operation {
            write!(f, " (operation={operation})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_classification_matches_first_substring() {
        let err = Error::from_vendor_code("com.amazonaws.dynamodb#ThrottlingException", "slow down");
        assert_eq!(err.kind().vendor_code(), Some("ThrottlingException"));
        assert!(err.retryable());
    }

    #[test]
    fn vendor_classification_is_case_insensitive() {
        let err = Error::from_vendor_code("validationexception", "bad field");
        assert_eq!(err.kind().vendor_code(), Some("ValidationException"));
        assert!(!err.retryable());
    }

    #[test]
    fn unclassified_vendor_code_is_not_retryable() {
        let err = Error::from_vendor_code("SomeWeirdException", "???");
        assert!(!err.retryable());
        assert_eq!(err.kind().vendor_code(), None);
    }

    #[test]
    fn fluent_enrichment_is_additive() {
        let err = Error::validation("missing field")
            .with_component("event_normalizer")
            .with_operation("normalize")
            .with_correlation_id("turn1-123-abcdef12-1")
            .with_detail("field", "verificationId");
        assert_eq!(err.component, Some("event_normalizer".to_string()));
        assert_eq!(err.details.get("field"), Some(&"verificationId".to_string()));
    }

    #[test]
    fn validation_is_not_retryable() {
        assert!(!Error::validation("x").retryable());
    }

    #[test]
    fn lmm_timeout_is_not_retryable_and_carries_the_lmm_category() {
        let err = Error::lmm_timeout(5_000);
        assert!(!err.retryable());
        assert_eq!(err.category(), Category::Lmm);
        assert_eq!(err.retry_strategy(), RetryStrategy::None);
    }

    #[test]
    fn plain_timeout_remains_retryable_unlike_lmm_timeout() {
        let err = Error::timeout(5_000);
        assert!(err.retryable());
        assert_ne!(err.retry_strategy(), Error::lmm_timeout(5_000).retry_strategy());
    }
}
