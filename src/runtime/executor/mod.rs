/// Step executors
///
/// One handler per action kind, all with the same shape:
/// `handle(action, context, constants) -> context'`. Dispatch is an exhaustive
/// match over the closed `Action` enum. Step-local failures are recorded in the
/// returned context; only `EngineError` (a corrupted path) escapes.

use crate::context::{FailedStep, FlowExecutorContext, StepOutput, StepStatus, Verdict, VerdictResponse};
use crate::error::EngineError;
use crate::flow::Action;
use crate::runtime::constants::EngineConstants;
use serde_json::Value;

// Piece actions
pub mod piece;

// User code in the sandbox
pub mod code;

// Conditional sub-chains
pub mod branch;

// Per-item sub-chains
pub mod loop_on_items;

/// Execute a single action against the context
///
/// Steps already completed at the current path are skipped, which makes
/// re-running a resumed chain idempotent.
pub async fn execute_action(
    action: &Action,
    context: FlowExecutorContext,
    constants: &EngineConstants,
) -> Result<FlowExecutorContext, EngineError> {
    let name = action.name();
    if context.is_completed(name) {
        tracing::debug!("⏭️ Step already completed, skipping: {} at {}", name, context.current_path());
        return Ok(context);
    }

    tracing::info!("🚀 Starting step execution: {} (type: {:?}) at {}", name, action.kind(), context.current_path());
    let start_time = std::time::Instant::now();

    let result = match action {
        Action::Piece(piece) => piece::handle(piece, context, constants).await,
        Action::Code(code) => code::handle(code, context, constants).await,
        Action::Branch(branch) => branch::handle(branch, context, constants).await,
        Action::LoopOnItems(lp) => loop_on_items::handle(lp, context, constants).await,
    };

    let duration = start_time.elapsed();
    match &result {
        Ok(next) if next.verdict() == Verdict::Failed => {
            tracing::error!("❌ Step execution failed: {} in {:?}", name, duration);
        }
        Ok(next) => {
            tracing::info!("✅ Step execution completed: {} in {:?} (verdict: {:?})", name, duration, next.verdict());
        }
        Err(e) => {
            tracing::error!("❌ Step execution aborted: {} in {:?} - Error: {}", name, duration, e);
        }
    }

    result
}

/// Record `step` as FAILED and fail the run with `message`
pub(crate) fn fail_step(
    context: FlowExecutorContext,
    name: &str,
    display_name: &str,
    step: StepOutput,
    message: Value,
) -> Result<FlowExecutorContext, EngineError> {
    tracing::debug!("📛 Step {} failed: {}", name, message);
    let step = step.with_status(StepStatus::Failed).with_error(message.clone());
    Ok(context.upsert_step(name, step)?.set_verdict(
        Verdict::Failed,
        Some(VerdictResponse::Failed {
            failed_step: FailedStep {
                name: name.to_string(),
                display_name: display_name.to_string(),
                message,
            },
        }),
    ))
}

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_millis(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Status a container step (branch, loop) takes when its sub-chain ends the run early
pub(crate) fn container_status(context: &FlowExecutorContext) -> StepStatus {
    match context.verdict() {
        Verdict::Paused => StepStatus::Paused,
        Verdict::Failed => StepStatus::Failed,
        Verdict::Running | Verdict::Succeeded => StepStatus::Succeeded,
    }
}
