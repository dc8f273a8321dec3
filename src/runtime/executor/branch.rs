/// Branch executor
///
/// Conditions are resolved like any other input, evaluated as OR-of-ANDs, and
/// exactly one side's sub-chain runs. Child outputs land at the same level as
/// the branch itself. The branch's own output is `{condition: bool}`.

use crate::context::{FlowExecutorContext, StepOutput, StepStatus};
use crate::error::{parse_error_message, EngineError};
use crate::flow::{evaluate_conditions, ActionKind, BranchAction, BranchCondition};
use crate::runtime::constants::EngineConstants;
use crate::runtime::engine::execute_chain;
use crate::runtime::executor::{container_status, elapsed_millis, fail_step};
use serde_json::json;

pub async fn handle(
    action: &BranchAction,
    context: FlowExecutorContext,
    constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
    let start_time = std::time::Instant::now();
    let unresolved = serde_json::to_value(&action.settings.conditions)?;
    let base = StepOutput::new(ActionKind::Branch, StepStatus::Running, json!({ "conditions": unresolved }));

    let resolved = match constants.variables().resolve(&unresolved, &context).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let step = base.with_duration(elapsed_millis(start_time));
            return fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()));
        }
    };

    let conditions: Vec<Vec<BranchCondition>> = match serde_json::from_value(resolved.resolved) {
        Ok(conditions) => conditions,
        Err(e) => {
            let step = base.with_duration(elapsed_millis(start_time));
            let message = json!(format!("Invalid branch conditions: {}", e));
            return fail_step(context, &action.name, &action.display_name, step, message);
        }
    };

    let condition = evaluate_conditions(&conditions);
    tracing::debug!("🔀 Branch {} evaluated to {}", action.name, condition);

    let step = StepOutput {
        input: json!({ "conditions": resolved.censored }),
        ..base
    }
    .with_status(StepStatus::Succeeded)
    .with_output(json!({ "condition": condition }))
    .with_duration(elapsed_millis(start_time));
    let context = context.upsert_step(&action.name, step.clone())?;

    let side = if condition {
        action.on_success_action.as_deref()
    } else {
        action.on_failure_action.as_deref()
    };
    let context = execute_chain(side, context, constants).await?;

    // A paused child must re-enter this branch on resume
    let status = container_status(&context);
    if status == StepStatus::Paused {
        return context.upsert_step(&action.name, step.with_status(status));
    }
    Ok(context)
}
