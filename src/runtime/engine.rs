/// Flow executor
///
/// Walks `nextAction` chains in declaration order. Each action goes through the
/// step executor dispatch; the walk stops as soon as the verdict leaves RUNNING
/// (a step failed, paused or stopped the run). Branch and loop executors call
/// back into `execute_chain` for their sub-chains.

use crate::context::{FlowExecutorContext, Verdict};
use crate::error::EngineError;
use crate::flow::{Action, FlowVersion};
use crate::runtime::constants::EngineConstants;
use crate::runtime::executor::execute_action;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Run the chain starting at `first` until it ends or the verdict changes
pub fn execute_chain<'a>(
    first: Option<&'a Action>,
    context: FlowExecutorContext,
    constants: &'a EngineConstants,
) -> BoxFuture<'a, Result<FlowExecutorContext, EngineError>> {
    async move {
        let mut context = context;
        let mut current = first;
        while let Some(action) = current {
            context = execute_action(action, context, constants).await?;
            if context.verdict() != Verdict::Running {
                break;
            }
            current = action.next_action();
        }
        Ok(context)
    }
    .boxed()
}

/// Drives a whole flow version
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowExecutor;

impl FlowExecutor {
    /// Execute every action after the trigger
    ///
    /// The trigger output must already be in `context`. A run whose chain ends
    /// while still RUNNING is SUCCEEDED; the recorded duration covers this
    /// invocation only.
    pub async fn execute(
        &self,
        flow: &FlowVersion,
        context: FlowExecutorContext,
        constants: &EngineConstants,
    ) -> Result<FlowExecutorContext, EngineError> {
        let workflow_start_time = std::time::Instant::now();
        tracing::info!(
            "🚀 Starting flow execution: {} (version {}, run {})",
            flow.flow_id,
            flow.id,
            constants.flow_run_id
        );

        let context = execute_chain(flow.trigger.next_action.as_deref(), context, constants).await?;

        let context = match context.verdict() {
            Verdict::Running => {
                let response = context.verdict_response().cloned();
                context.set_verdict(Verdict::Succeeded, response)
            }
            _ => context,
        };

        let duration = workflow_start_time.elapsed();
        let context = context.set_duration(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));

        match context.verdict() {
            Verdict::Failed => tracing::error!("❌ Flow execution failed: {} in {:?}", flow.flow_id, duration),
            verdict => tracing::info!(
                "✅ Flow execution finished: {} in {:?} (verdict: {:?}, tasks: {})",
                flow.flow_id,
                duration,
                verdict,
                context.tasks()
            ),
        }

        Ok(context)
    }
}
