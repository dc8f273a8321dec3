/// Piece action executor
///
/// Resolve props, validate them against the action's schema, run the action and
/// translate its outcome into the step status and run verdict. Errors and
/// panics raised by the action become a FAILED step.

use crate::context::{FlowExecutorContext, StepOutput, StepStatus, Verdict, VerdictResponse};
use crate::error::{panic_message, parse_error_message, EngineError};
use crate::flow::{ActionKind, PieceAction};
use crate::pieces::{split_auth, ActionContext};
use crate::runtime::constants::{EngineConstants, ExecutionType};
use crate::runtime::executor::{elapsed_millis, fail_step};
use crate::runtime::hooks::{RunSignal, TagRecorder};
use crate::variables::process_and_validate;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;

pub async fn handle(
    action: &PieceAction,
    context: FlowExecutorContext,
    constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
    let start_time = std::time::Instant::now();
    let settings = &action.settings;
    let base = StepOutput::new(ActionKind::Piece, StepStatus::Running, settings.input.clone());

    tracing::debug!("🧩 Executing piece action: {}.{}", settings.piece_name, settings.action_name);

    let resolved = match constants.variables().resolve(&settings.input, &context).await {
        Ok(resolved) => resolved,
        Err(e) => {
            let step = base.with_duration(elapsed_millis(start_time));
            return fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()));
        }
    };
    let base = StepOutput {
        input: resolved.censored.clone(),
        ..base
    };

    let handler = match constants.services.pieces.action(&settings.piece_name, &settings.action_name) {
        Ok(handler) => handler,
        Err(e) => {
            let step = base.with_duration(elapsed_millis(start_time));
            return fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()));
        }
    };

    let mut props = resolved.resolved;
    let auth = split_auth(&mut props);

    let (props, errors) = process_and_validate(&handler.props(), &props);
    if !errors.is_empty() {
        tracing::warn!("⚠️ Invalid props for step {}: {:?}", action.name, errors);
        let message = Value::Object(errors.into_iter().map(|(k, v)| (k, Value::String(v))).collect());
        let step = base.with_duration(elapsed_millis(start_time));
        return fail_step(context, &action.name, &action.display_name, step, message);
    }

    // Only the step that paused the run observes the resume
    let resumed = constants.execution_type == ExecutionType::Resume
        && context
            .get_step_output(&action.name)
            .is_some_and(|step| step.status == StepStatus::Paused);
    let mut run = constants.run_info(&action.name);
    if !resumed {
        run.execution_type = ExecutionType::Begin;
        run.resume_payload = None;
    }

    let tags = TagRecorder::default();
    let action_context = ActionContext {
        props,
        auth,
        store: constants.scoped_store(),
        files: constants.step_files(&action.name),
        connections: constants.services.connections.clone(),
        tags: tags.clone(),
        run,
    };

    let outcome = match AssertUnwindSafe(handler.run(action_context)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!("Piece action panicked: {}", panic_message(panic.as_ref()))),
    };

    let context = context.increase_task().add_tags(tags.snapshot());
    let duration = elapsed_millis(start_time);

    match outcome {
        Ok(outcome) => {
            let step = base.with_output(outcome.output).with_duration(duration);
            match outcome.signal {
                RunSignal::Continue => context.upsert_step(&action.name, step.with_status(StepStatus::Succeeded)),
                RunSignal::Stop(stop_response) => {
                    tracing::info!("🛑 Step {} stopped the run (status {})", action.name, stop_response.status);
                    Ok(context
                        .upsert_step(&action.name, step.with_status(StepStatus::Stopped))?
                        .set_verdict(Verdict::Succeeded, Some(VerdictResponse::Stopped { stop_response })))
                }
                RunSignal::Pause(pause_metadata) => {
                    tracing::info!("⏸️ Step {} paused the run", action.name);
                    let step = step
                        .with_status(StepStatus::Paused)
                        .with_pause_metadata(pause_metadata.clone());
                    Ok(context
                        .upsert_step(&action.name, step)?
                        .set_verdict(Verdict::Paused, Some(VerdictResponse::Paused { pause_metadata })))
                }
            }
        }
        Err(e) => {
            let step = base.with_duration(duration);
            fail_step(context, &action.name, &action.display_name, step, parse_error_message(&e.to_string()))
        }
    }
}
