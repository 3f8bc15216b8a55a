//! Stage entry point: one process invocation runs exactly one Turn-1 or
//! Turn-2 stage for one verification, reading its event from stdin and
//! writing the canonical stage output to stdout.
//!
//! Bootstrap-then-dispatch-then-exit follows `brain::main::run_cli`: resolve
//! configuration fatally up front, construct every gateway once, run the
//! requested stage, and report the result on the process exit code.

use std::io::Read;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vmv_core::AppConfig;
use vmv_keyvalue::DynamoKeyValueStore;
use vmv_lmm::{BedrockLmmGateway, ThinkingConfig};
use vmv_objectstore::S3ObjectStore;
use vmv_orchestrator::{CorrelationIdGenerator, StageOrchestrator, StageSettings};
use vmv_prompt::PromptBuilder;

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Bootstrap failures never reach the stage machinery, so they
            // are reported as fatal JSON on stderr rather than the
            // canonical stage output shape.
            let payload = serde_json::json!({
                "fatal": true,
                "message": err.to_string(),
                "code": err.code(),
            });
            eprintln!("{payload}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let stage = std::env::var("STAGE").unwrap_or_else(|_| "turn1".to_string());

    let mut raw_event = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw_event) {
        eprintln!(r#"{{"fatal":true,"message":"failed to read event from stdin: {e}"}}"#);
        std::process::exit(1);
    }
    let event_json: serde_json::Value = match serde_json::from_str(raw_event.trim()) {
        Ok(value) => value,
        Err(e) => {
            eprintln!(r#"{{"fatal":true,"message":"malformed event JSON on stdin: {e}"}}"#);
            std::process::exit(1);
        }
    };

    let object_store = Arc::new(S3ObjectStore::from_env(config.state_bucket.clone()).await);

    let event = match vmv_orchestrator::event::normalize(&event_json, object_store.as_ref()).await {
        Ok(event) => event,
        Err(e) => {
            eprintln!(r#"{{"fatal":true,"message":"event normalization failed: {e}"}}"#);
            std::process::exit(1);
        }
    };

    let key_value_store = Arc::new(
        DynamoKeyValueStore::from_env(
            config.verification_table.clone(),
            config.conversation_table.clone(),
            config.max_retries,
        )
        .await,
    );
    let lmm = BedrockLmmGateway::from_env(
        config.anthropic_version.clone(),
        config.bedrock_connect_timeout,
        config.bedrock_call_timeout,
    )
    .await;
    let prompt_builder = Arc::new(PromptBuilder::new(
        config.template_base_path.clone(),
        config.template_version.clone(),
    ));
    let correlation_ids = Arc::new(CorrelationIdGenerator::new());

    let thinking = if config.thinking_type == "enabled" {
        ThinkingConfig::Enabled {
            budget_tokens: config.budget_tokens,
        }
    } else {
        ThinkingConfig::Disabled
    };

    let settings = StageSettings {
        state_bucket: config.state_bucket.clone(),
        model: config.bedrock_model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        top_p: config.top_p,
        thinking,
        budget_tokens: config.budget_tokens,
        date_partition_timezone: config.date_partition_timezone.clone(),
    };

    let orchestrator = StageOrchestrator::new(
        object_store,
        key_value_store.clone(),
        key_value_store,
        lmm,
        prompt_builder,
        correlation_ids,
        settings,
    );

    let output = match stage.as_str() {
        "turn2" => orchestrator.run_turn2(event).await,
        _ => orchestrator.run_turn1(event).await,
    };

    let success = output.is_success();
    match serde_json::to_string(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!(r#"{{"fatal":true,"message":"failed to serialize stage output: {e}"}}"#),
    }
    std::process::exit(if success { 0 } else { 1 });
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
