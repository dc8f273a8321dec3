/// Loop-on-items executor
///
/// Iterations run strictly in index order. For iteration `i` the current path is
/// extended with `(loop, i)` so body outputs land in `iterations[i]`, then the
/// path is restored. A body that fails, pauses or stops ends the loop with that
/// verdict. On resume the recorded iterations are reused and completed body
/// steps are skipped.

use crate::context::{FlowExecutorContext, StepMap, StepOutput, StepStatus, Verdict};
use crate::error::{parse_error_message, EngineError};
use crate::flow::LoopOnItemsAction;
use crate::runtime::constants::EngineConstants;
use crate::runtime::engine::execute_chain;
use crate::runtime::executor::{container_status, elapsed_millis, fail_step};
use serde_json::{json, Value};

pub async fn handle(
    action: &LoopOnItemsAction,
    context: FlowExecutorContext,
    constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
    let start_time = std::time::Instant::now();
    let unresolved = json!({ "items": action.settings.items });

    let resolved = match constants.variables().resolve(&unresolved, &context).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let step = StepOutput::new_loop(unresolved).with_duration(elapsed_millis(start_time));
            return fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()));
        }
    };

    let items = match resolved.resolved.get("items") {
        Some(Value::Array(items)) => items.clone(),
        _ => {
            let step = StepOutput::new_loop(resolved.censored).with_duration(elapsed_millis(start_time));
            let message = json!("The items you have selected must be a list");
            return fail_step(context, &action.name, &action.display_name, step, message);
        }
    };

    // Keep iterations recorded by a previous (paused) invocation
    let step = match context.get_step_output(&action.name) {
        Some(previous) if previous.loop_output().is_some() => StepOutput {
            input: resolved.censored,
            ..previous.clone()
        },
        _ => StepOutput::new_loop(resolved.censored),
    };
    let mut context = context.upsert_step(&action.name, step.with_status(StepStatus::Running))?;

    tracing::debug!("🔁 Loop {} over {} items", action.name, items.len());

    for (index, item) in items.into_iter().enumerate() {
        let mut step = context
            .get_step_output(&action.name)
            .cloned()
            .ok_or_else(|| EngineError::StepNotFound(action.name.clone()))?;
        if let Some(lp) = step.loop_output_mut() {
            lp.item = item;
            lp.index = index + 1;
            if lp.iterations.len() <= index {
                lp.iterations.push(StepMap::new());
            }
        }
        context = context.upsert_step(&action.name, step)?;

        let outer_path = context.current_path().clone();
        let inner_path = outer_path.loop_iteration(&action.name, index);
        context = context.set_current_path(inner_path);
        context = execute_chain(action.first_loop_action.as_deref(), context, constants).await?;
        context = context.set_current_path(outer_path);

        if context.verdict() != Verdict::Running {
            tracing::debug!("🔁 Loop {} ended at iteration {} ({:?})", action.name, index, context.verdict());
            break;
        }
    }

    let status = container_status(&context);
    let step = context
        .get_step_output(&action.name)
        .cloned()
        .ok_or_else(|| EngineError::StepNotFound(action.name.clone()))?
        .with_status(status)
        .with_duration(elapsed_millis(start_time));
    context.upsert_step(&action.name, step)
}
