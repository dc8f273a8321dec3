/// EXECUTE_STEP
///
/// Runs one step from the editor. The context is synthesized from the sample
/// data of the trigger and every other step (never the target or its nested
/// steps), so templates referring to earlier steps resolve to their last test
/// output.

use crate::context::{FlowExecutorContext, StepOutput, StepStatus, Verdict};
use crate::error::EngineError;
use crate::flow::FlowVersion;
use crate::operations::flow::begin_context;
use crate::operations::to_response;
use crate::runtime::{execute_action, EngineConstants, EngineServices};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStepInput {
    pub flow_version: FlowVersion,
    pub step_name: String,
    #[serde(default)]
    pub project_id: String,
}

pub async fn execute_step(input: ExecuteStepInput, services: &EngineServices) -> Result<Value, EngineError> {
    let flow = &input.flow_version;
    let action = flow
        .get_action(&input.step_name)
        .ok_or_else(|| EngineError::StepNotFound(input.step_name.clone()))?;

    let context = sample_context(flow, &input.step_name)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let constants =
        EngineConstants::new(&flow.flow_id, &flow.id, &run_id, &input.project_id, services.clone()).single_step_test();

    tracing::info!("🧪 Testing step: {}", input.step_name);
    let context = execute_action(action, context, &constants).await?;

    let step = context
        .get_step_output(&input.step_name)
        .ok_or_else(|| EngineError::StepNotFound(input.step_name.clone()))?;

    Ok(json!({
        "success": context.verdict() != Verdict::Failed,
        "output": to_response(step)?,
    }))
}

/// Context holding the sample data of every step except `target` and its children
fn sample_context(flow: &FlowVersion, target: &str) -> Result<FlowExecutorContext, EngineError> {
    let mut excluded: HashSet<String> = HashSet::new();
    excluded.insert(target.to_string());
    if let Some(action) = flow.get_action(target) {
        excluded.extend(action.nested_step_names());
    }

    let payload = flow.trigger.sample_data.clone().unwrap_or_else(|| json!({}));
    let mut context = begin_context(flow, payload)?;

    for action in flow.actions() {
        if excluded.contains(action.name()) {
            continue;
        }
        if let Some(sample) = action.sample_data() {
            let step = StepOutput::new(action.kind(), StepStatus::Succeeded, json!({})).with_output(sample.clone());
            context = context.upsert_step(action.name(), step)?;
        }
    }
    Ok(context)
}
