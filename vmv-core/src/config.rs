//! Process configuration loaded from the environment, the way
//! `brain::BrainConfig::from_path` centralizes bootstrap config in the
//! teacher, except sourced from env vars rather than a file since this
//! process runs as a stage invocation inside a managed workflow runner.

use std::env;
use std::time::Duration;

use crate::error::Error;

/// Fully resolved process configuration. Constructed once at bootstrap and
/// shared (by reference) with every gateway and the stage orchestrator.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// AWS region for every AWS SDK client.
    pub aws_region: String,
    /// Object store bucket for stage artifacts.
    pub state_bucket: String,
    /// DynamoDB table for the verification record.
    pub verification_table: String,
    /// DynamoDB table for conversation records.
    pub conversation_table: String,
    /// Bedrock model id to invoke.
    pub bedrock_model: String,
    /// Anthropic Messages API version header value.
    pub anthropic_version: String,
    /// Max output tokens requested per LMM call.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling top_p.
    pub top_p: f64,
    /// Extended-thinking mode: `"enabled"` or `"disabled"`.
    pub thinking_type: String,
    /// Extended-thinking token budget.
    pub budget_tokens: u32,
    /// Connect timeout for Bedrock calls.
    pub bedrock_connect_timeout: Duration,
    /// Total call timeout for Bedrock calls.
    pub bedrock_call_timeout: Duration,
    /// Maximum retry attempts for a single LMM call.
    pub max_retries: u32,
    /// Root directory prompt templates are loaded from.
    pub template_base_path: String,
    /// Template format version, appended to template lookup paths.
    pub template_version: String,
    /// IANA timezone name used to compute the `YYYY/MM/DD` date partition.
    pub date_partition_timezone: String,
    /// `tracing` log level filter.
    pub log_level: String,
}

fn env_var(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::config(format!("missing required env var {name}")))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_var_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, Error> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| Error::config(format!("invalid value for {name}: {value}"))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// Any missing required variable or malformed value is reported as a
    /// single `Error::config` — this is a fatal bootstrap failure.
    pub fn from_env() -> Result<Self, Error> {
        let s3_bucket = env::var("S3_BUCKET")
            .or_else(|_| env::var("STATE_BUCKET"))
            .map_err(|_| Error::config("missing required env var S3_BUCKET or STATE_BUCKET"))?;

        let max_tokens: u32 = env_var_parsed("MAX_TOKENS", 24000)?;
        let temperature: f64 = env_var_parsed("TEMPERATURE", 0.7)?;
        let top_p: f64 = env_var_parsed("TOP_P", 0.9)?;
        let thinking_type = env_var_or("THINKING_TYPE", "disabled");
        let budget_tokens: u32 = env_var_parsed("BUDGET_TOKENS", 16000)?;
        let connect_timeout_sec: u64 = env_var_parsed("BEDROCK_CONNECT_TIMEOUT_SEC", 10)?;
        let call_timeout_sec: u64 = env_var_parsed("BEDROCK_CALL_TIMEOUT_SEC", 30)?;
        let max_retries: u32 = env_var_parsed("MAX_RETRIES", 5)?;

        if !(0.0..=1.0).contains(&temperature) {
            return Err(Error::config(format!(
                "TEMPERATURE must be within [0.0, 1.0], got {temperature}"
            )));
        }
        if !(0.0..=1.0).contains(&top_p) {
            return Err(Error::config(format!(
                "TOP_P must be within [0.0, 1.0], got {top_p}"
            )));
        }
        if thinking_type == "enabled" && (temperature - 1.0).abs() > f64::EPSILON {
            return Err(Error::config(
                "THINKING_TYPE=enabled requires TEMPERATURE=1.0",
            ));
        }
        if connect_timeout_sec >= call_timeout_sec {
            return Err(Error::config(
                "BEDROCK_CONNECT_TIMEOUT_SEC must be less than BEDROCK_CALL_TIMEOUT_SEC",
            ));
        }

        Ok(Self {
            aws_region: env_var("AWS_REGION")?,
            state_bucket: s3_bucket,
            verification_table: env_var("DYNAMODB_VERIFICATION_TABLE")?,
            conversation_table: env_var("DYNAMODB_CONVERSATION_TABLE")?,
            bedrock_model: env_var("BEDROCK_MODEL")?,
            anthropic_version: env_var("ANTHROPIC_VERSION")?,
            max_tokens,
            temperature,
            top_p,
            thinking_type,
            budget_tokens,
            bedrock_connect_timeout: Duration::from_secs(connect_timeout_sec),
            bedrock_call_timeout: Duration::from_secs(call_timeout_sec),
            max_retries,
            template_base_path: env_var_or("TEMPLATE_BASE_PATH", "/opt/templates"),
            template_version: env_var_or("TEMPLATE_VERSION", "v1"),
            date_partition_timezone: env_var_or("DATE_PARTITION_TIMEZONE", "UTC"),
            log_level: env_var_or("LOG_LEVEL", "INFO"),
        })
    }
}
