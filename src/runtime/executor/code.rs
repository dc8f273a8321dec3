/// Code step executor
///
/// Runs the step's source with its resolved inputs inside the sandbox.

use crate::context::{FlowExecutorContext, StepOutput, StepStatus};
use crate::error::{parse_error_message, EngineError};
use crate::flow::{ActionKind, CodeAction};
use crate::runtime::constants::EngineConstants;
use crate::runtime::executor::{elapsed_millis, fail_step};

pub async fn handle(
    action: &CodeAction,
    context: FlowExecutorContext,
    constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
    let start_time = std::time::Instant::now();
    let settings = &action.settings;
    let base = StepOutput::new(ActionKind::Code, StepStatus::Running, settings.input.clone());

    let resolved = match constants.variables().resolve(&settings.input, &context).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let step = base.with_duration(elapsed_millis(start_time));
            return fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()));
        }
    };
    let base = StepOutput {
        input: resolved.censored,
        ..base
    };

    tracing::debug!("📝 Code step {} inputs resolved", action.name);
    let result = constants
        .services
        .sandbox
        .run(&settings.source_code.code, resolved.resolved)
        .await;

    let context = context.increase_task();
    let step = base.with_duration(elapsed_millis(start_time));
    match result {
        Ok(output) => context.upsert_step(&action.name, step.with_status(StepStatus::Succeeded).with_output(output)),
        Err(e) => fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string())),
    }
}
