/// EXECUTE_FLOW and EXECUTE_TEST_FLOW
///
/// BEGIN seeds the context with the trigger payload. RESUME rebuilds the context
/// from the previous invocation's recorded state; steps that already completed
/// are skipped and the paused step runs again with the resume payload. An
/// optional `resumeFrom` discards the named top-level step and everything after
/// it so that region runs again.

use crate::context::{FlowExecutorContext, StepMap, StepOutput, StepStatus};
use crate::error::EngineError;
use crate::flow::{ActionKind, FlowVersion};
use crate::operations::to_response;
use crate::runtime::{EngineConstants, EngineServices, ExecutionType, FlowExecutor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Recorded state of a previous invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    #[serde(default)]
    pub steps: StepMap,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tasks: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteFlowInput {
    pub flow_version: FlowVersion,
    pub flow_run_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub execution_type: ExecutionType,
    #[serde(default)]
    pub trigger_payload: Value,
    #[serde(default)]
    pub execution_state: Option<ExecutionState>,
    #[serde(default)]
    pub resume_payload: Option<Value>,
    /// Top-level step to run again on RESUME, with everything after it
    #[serde(default)]
    pub resume_from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTestFlowInput {
    pub flow_version: FlowVersion,
    #[serde(default)]
    pub flow_run_id: Option<String>,
    #[serde(default)]
    pub project_id: String,
}

pub async fn execute_flow(input: ExecuteFlowInput, services: &EngineServices) -> Result<Value, EngineError> {
    let flow = &input.flow_version;
    flow.validate()?;

    let constants = EngineConstants::new(&flow.flow_id, &flow.id, &input.flow_run_id, &input.project_id, services.clone());

    let (context, constants) = match input.execution_type {
        ExecutionType::Begin => (begin_context(flow, input.trigger_payload.clone())?, constants),
        ExecutionType::Resume => {
            let state = input
                .execution_state
                .clone()
                .ok_or_else(|| EngineError::InvalidInput("RESUME requires executionState".to_string()))?;
            let mut context = FlowExecutorContext::from_previous_run(state.steps, state.tags, state.tasks);
            if let Some(step_name) = &input.resume_from {
                context = context.remove_root_steps(&steps_from(flow, step_name)?);
            }
            tracing::info!("▶️ Resuming run {} ({} recorded steps)", input.flow_run_id, context.steps().len());
            (context, constants.resuming(input.resume_payload.clone()))
        }
    };

    let context = FlowExecutor.execute(flow, context, &constants).await?;
    to_response(&context.to_execution_output()?)
}

pub async fn execute_test_flow(input: ExecuteTestFlowInput, services: &EngineServices) -> Result<Value, EngineError> {
    let payload = input.flow_version.trigger.sample_data.clone().unwrap_or_else(|| json!({}));
    let flow_run_id = input
        .flow_run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    execute_flow(
        ExecuteFlowInput {
            flow_version: input.flow_version,
            flow_run_id,
            project_id: input.project_id,
            execution_type: ExecutionType::Begin,
            trigger_payload: payload,
            execution_state: None,
            resume_payload: None,
            resume_from: None,
        },
        services,
    )
    .await
}

/// Fresh context holding only the trigger output
pub(crate) fn begin_context(flow: &FlowVersion, payload: Value) -> Result<FlowExecutorContext, EngineError> {
    let trigger = StepOutput::new(ActionKind::Trigger, StepStatus::Succeeded, json!({})).with_output(payload);
    FlowExecutorContext::empty().upsert_step(&flow.trigger.name, trigger)
}

/// Names recorded at the root for `step_name` and every top-level step after it
fn steps_from(flow: &FlowVersion, step_name: &str) -> Result<Vec<String>, EngineError> {
    let chain = flow.top_level_chain();
    let position = chain
        .iter()
        .position(|action| action.name() == step_name)
        .ok_or_else(|| EngineError::StepNotFound(step_name.to_string()))?;

    let mut names = Vec::new();
    for action in &chain[position..] {
        names.push(action.name().to_string());
        // Branch children are recorded next to the branch
        names.extend(action.nested_step_names());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> FlowVersion {
        serde_json::from_value(json!({
            "id": "v1",
            "flowId": "f1",
            "trigger": {
                "name": "trigger",
                "type": "WEBHOOK",
                "nextAction": {
                    "type": "CODE",
                    "name": "a",
                    "settings": { "sourceCode": { "code": "" } },
                    "nextAction": {
                        "type": "BRANCH",
                        "name": "b",
                        "settings": { "conditions": [] },
                        "onFailureAction": {
                            "type": "CODE",
                            "name": "b_child",
                            "settings": { "sourceCode": { "code": "" } }
                        },
                        "nextAction": {
                            "type": "CODE",
                            "name": "c",
                            "settings": { "sourceCode": { "code": "" } }
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn resume_point_covers_successors_and_children() {
        let names = steps_from(&flow(), "b").unwrap();
        assert_eq!(names, vec!["b", "b_child", "c"]);
        assert!(matches!(steps_from(&flow(), "b_child"), Err(EngineError::StepNotFound(_))));
    }
}
