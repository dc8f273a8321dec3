/// Hook protocol between piece actions and the engine
///
/// A piece action ends a run early or suspends it by returning a signal next to
/// its output. The piece executor reads the signal after `run` returns; nothing
/// unwinds control flow and only one signal can be expressed per invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Resumable state recorded when a run pauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseMetadata {
    /// Resume once the given time has passed
    #[serde(rename_all = "camelCase")]
    Delay { resume_date_time: DateTime<Utc> },
    /// Resume when an external request with this id arrives
    #[serde(rename_all = "camelCase")]
    Webhook {
        request_id: String,
        #[serde(default)]
        response: Value,
    },
}

/// Response returned to the caller when a run is stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopResponse {
    #[serde(default = "default_stop_status")]
    pub status: u16,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_stop_status() -> u16 {
    200
}

impl StopResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: BTreeMap::new(),
        }
    }
}

/// What the run should do after the action returns
#[derive(Debug, Clone, PartialEq)]
pub enum RunSignal {
    Continue,
    Stop(StopResponse),
    Pause(PauseMetadata),
}

/// Discriminated result of a piece action's `run`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub output: Value,
    pub signal: RunSignal,
}

impl ActionOutcome {
    /// Normal completion, the run continues
    pub fn output(output: Value) -> Self {
        Self {
            output,
            signal: RunSignal::Continue,
        }
    }

    /// Complete this step and stop the run with `response`
    pub fn stop(output: Value, response: StopResponse) -> Self {
        Self {
            output,
            signal: RunSignal::Stop(response),
        }
    }

    /// Suspend the run; the step is re-executed on resume
    pub fn pause(output: Value, metadata: PauseMetadata) -> Self {
        Self {
            output,
            signal: RunSignal::Pause(metadata),
        }
    }
}

impl From<Value> for ActionOutcome {
    fn from(output: Value) -> Self {
        ActionOutcome::output(output)
    }
}

/// Per-invocation tag collector handed to piece actions
#[derive(Debug, Clone, Default)]
pub struct TagRecorder {
    tags: Arc<Mutex<Vec<String>>>,
}

impl TagRecorder {
    pub fn add(&self, tag: impl Into<String>) {
        if let Ok(mut tags) = self.tags.lock() {
            tags.push(tag.into());
        }
    }

    /// Tags recorded so far, in insertion order
    pub fn snapshot(&self) -> Vec<String> {
        self.tags.lock().map(|tags| tags.clone()).unwrap_or_default()
    }
}
