/// Engine operations
///
/// The engine is invoked with one operation and one JSON input, and answers
/// with one envelope `{status: OK|ERROR, response}`. Failures of any kind,
/// including panics, are caught here once and reported through the envelope.
///
/// Operations:
/// - EXECUTE_FLOW / EXECUTE_TEST_FLOW / EXECUTE_STEP: run steps through the flow executor
/// - EXECUTE_TRIGGER_HOOK, EXECUTE_PROPERTY, EXECUTE_VALIDATE_AUTH,
///   EXTRACT_PIECE_METADATA: call piece contracts directly

use crate::error::{panic_message, parse_error_message, EngineError};
use crate::runtime::EngineServices;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;

// EXECUTE_FLOW and EXECUTE_TEST_FLOW
pub mod flow;

// EXECUTE_STEP
pub mod step;

// EXECUTE_TRIGGER_HOOK
pub mod trigger;

// EXECUTE_PROPERTY, EXECUTE_VALIDATE_AUTH, EXTRACT_PIECE_METADATA
pub mod property;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineOperationType {
    ExtractPieceMetadata,
    ExecuteFlow,
    ExecuteProperty,
    ExecuteTriggerHook,
    ExecuteStep,
    ExecuteTestFlow,
    ExecuteValidateAuth,
}

impl FromStr for EngineOperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_uppercase()))
            .map_err(|_| format!("Unknown engine operation: {}", s))
    }
}

impl fmt::Display for EngineOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(name)) => write!(f, "{}", name),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineResponseStatus {
    Ok,
    Error,
}

/// Envelope written once per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub status: EngineResponseStatus,
    pub response: Value,
}

impl EngineResponse {
    pub fn ok(response: Value) -> Self {
        Self {
            status: EngineResponseStatus::Ok,
            response,
        }
    }

    pub fn error(response: Value) -> Self {
        Self {
            status: EngineResponseStatus::Error,
            response,
        }
    }
}

/// Run one operation and wrap its result in the response envelope
pub async fn execute(operation: EngineOperationType, input: Value, services: &EngineServices) -> EngineResponse {
    tracing::info!("📍 Executing operation: {}", operation);
    let start_time = std::time::Instant::now();

    let result = AssertUnwindSafe(dispatch(operation, input, services))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(response)) => {
            tracing::info!("✅ Operation {} completed in {:?}", operation, start_time.elapsed());
            EngineResponse::ok(response)
        }
        Ok(Err(e)) => {
            tracing::error!("❌ Operation {} failed: {}", operation, e);
            EngineResponse::error(parse_error_message(&e.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("❌ Operation {} panicked: {}", operation, message);
            EngineResponse::error(json!(message))
        }
    }
}

async fn dispatch(operation: EngineOperationType, input: Value, services: &EngineServices) -> Result<Value, EngineError> {
    match operation {
        EngineOperationType::ExecuteFlow => flow::execute_flow(serde_json::from_value(input)?, services).await,
        EngineOperationType::ExecuteTestFlow => flow::execute_test_flow(serde_json::from_value(input)?, services).await,
        EngineOperationType::ExecuteStep => step::execute_step(serde_json::from_value(input)?, services).await,
        EngineOperationType::ExecuteTriggerHook => {
            trigger::execute_trigger_hook(serde_json::from_value(input)?, services).await
        }
        EngineOperationType::ExecuteProperty => property::execute_property(serde_json::from_value(input)?, services).await,
        EngineOperationType::ExecuteValidateAuth => {
            property::execute_validate_auth(serde_json::from_value(input)?, services).await
        }
        EngineOperationType::ExtractPieceMetadata => {
            property::extract_piece_metadata(serde_json::from_value(input)?, services)
        }
    }
}

/// Serialize an operation result
pub(crate) fn to_response<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Internal(e.into()))
}
