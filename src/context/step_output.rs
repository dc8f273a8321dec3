/// Step output records
///
/// Every executed step leaves a `StepOutput` in the context. Loop steps keep one
/// nested `StepMap` per iteration, so the structure mirrors the action graph.

use crate::flow::ActionKind;
use crate::runtime::hooks::PauseMetadata;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Step outputs keyed by step name, in execution order
pub type StepMap = IndexMap<String, StepOutput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
    Paused,
    Stopped,
}

/// Output of a loop step: the current item plus every iteration's step map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopOutput {
    #[serde(default)]
    pub item: Value,
    /// 1-based position of `item`, 0 before the first iteration
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub iterations: Vec<StepMap>,
}

/// Payload stored in `StepOutput::output`
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    Plain(Value),
    Loop(LoopOutput),
}

/// Result record of one step execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStepOutput", into = "RawStepOutput")]
pub struct StepOutput {
    pub kind: ActionKind,
    pub status: StepStatus,
    /// Censored input (safe to log and persist)
    pub input: Value,
    pub output: Option<StepPayload>,
    pub error_message: Option<Value>,
    pub pause_metadata: Option<PauseMetadata>,
    /// Execution time in milliseconds
    pub duration: Option<u64>,
}

impl StepOutput {
    pub fn new(kind: ActionKind, status: StepStatus, input: Value) -> Self {
        Self {
            kind,
            status,
            input,
            output: None,
            error_message: None,
            pause_metadata: None,
            duration: None,
        }
    }

    /// Fresh loop step output with no iterations yet
    pub fn new_loop(input: Value) -> Self {
        let mut step = Self::new(ActionKind::LoopOnItems, StepStatus::Running, input);
        step.output = Some(StepPayload::Loop(LoopOutput::default()));
        step
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(StepPayload::Plain(output));
        self
    }

    pub fn with_error(mut self, message: Value) -> Self {
        self.error_message = Some(message);
        self
    }

    pub fn with_pause_metadata(mut self, metadata: PauseMetadata) -> Self {
        self.pause_metadata = Some(metadata);
        self
    }

    pub fn with_duration(mut self, millis: u64) -> Self {
        self.duration = Some(millis);
        self
    }

    pub fn loop_output(&self) -> Option<&LoopOutput> {
        match &self.output {
            Some(StepPayload::Loop(output)) => Some(output),
            _ => None,
        }
    }

    pub fn loop_output_mut(&mut self) -> Option<&mut LoopOutput> {
        match &mut self.output {
            Some(StepPayload::Loop(output)) => Some(output),
            _ => None,
        }
    }

    /// Value exposed to templates under this step's name
    ///
    /// Loops expose `{item, index}` rather than their full iteration history.
    pub fn state_value(&self) -> Option<Value> {
        match &self.output {
            Some(StepPayload::Plain(value)) => Some(value.clone()),
            Some(StepPayload::Loop(output)) => Some(json!({
                "item": output.item,
                "index": output.index,
            })),
            None => None,
        }
    }

    /// Plain output value, `None` for loops and steps without output
    pub fn plain_output(&self) -> Option<&Value> {
        match &self.output {
            Some(StepPayload::Plain(value)) => Some(value),
            _ => None,
        }
    }
}

/// Wire representation: the shape of `output` depends on `type`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStepOutput {
    #[serde(rename = "type")]
    kind: ActionKind,
    status: StepStatus,
    #[serde(default)]
    input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pause_metadata: Option<PauseMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
}

impl TryFrom<RawStepOutput> for StepOutput {
    type Error = String;

    fn try_from(raw: RawStepOutput) -> Result<Self, Self::Error> {
        let output = match (raw.kind, raw.output) {
            (ActionKind::LoopOnItems, Some(value)) => {
                let parsed: LoopOutput = serde_json::from_value(value)
                    .map_err(|e| format!("invalid loop step output: {}", e))?;
                Some(StepPayload::Loop(parsed))
            }
            (_, Some(value)) => Some(StepPayload::Plain(value)),
            (_, None) => None,
        };
        Ok(StepOutput {
            kind: raw.kind,
            status: raw.status,
            input: raw.input,
            output,
            error_message: raw.error_message,
            pause_metadata: raw.pause_metadata,
            duration: raw.duration,
        })
    }
}

impl From<StepOutput> for RawStepOutput {
    fn from(step: StepOutput) -> Self {
        let output = match step.output {
            Some(StepPayload::Plain(value)) => Some(value),
            Some(StepPayload::Loop(output)) => Some(json!(output)),
            None => None,
        };
        RawStepOutput {
            kind: step.kind,
            status: step.status,
            input: step.input,
            output,
            error_message: step.error_message,
            pause_metadata: step.pause_metadata,
            duration: step.duration,
        }
    }
}
