/// Engine error types
///
/// Step-local failures (a piece throws, validation fails) never surface here: they
/// are folded into a FAILED step output by the step executors. `EngineError` is
/// reserved for conditions that make the whole invocation unusable, such as a
/// step-execution path that does not match the graph being executed.

use serde_json::Value;
use thiserror::Error;

/// Fatal, non-retryable engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The execution path points at a missing or non-loop step output.
    /// Indicates that the supplied context was built against a different graph.
    #[error("Step execution path is corrupted: {0}")]
    CorruptedPath(String),

    #[error("Flow run is paused but no pause metadata was recorded")]
    MissingPauseMetadata,

    #[error("Step '{0}' was not found in the flow version")]
    StepNotFound(String),

    #[error("Step name '{0}' is used more than once in the flow version")]
    DuplicateStepName(String),

    #[error("Invalid operation input: {0}")]
    InvalidInput(String),

    /// Collaborator or wiring failure that escaped a step boundary
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}

/// Convert an error message into the value reported to callers
///
/// Messages that are themselves JSON (for example a validation error map) are
/// returned parsed, everything else is returned as a plain string.
pub fn parse_error_message(message: &str) -> Value {
    match serde_json::from_str::<Value>(message) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(message.to_string()),
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_messages_are_parsed() {
        let parsed = parse_error_message(r#"{"url":"Expected value but got nothing"}"#);
        assert_eq!(parsed, json!({"url": "Expected value but got nothing"}));
    }

    #[test]
    fn plain_messages_stay_strings() {
        assert_eq!(parse_error_message("boom"), json!("boom"));
        // Bare JSON scalars are not worth unwrapping
        assert_eq!(parse_error_message("42"), json!("42"));
    }
}
