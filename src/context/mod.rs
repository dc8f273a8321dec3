/// Execution Context
///
/// This module holds the state a flow run accumulates:
/// - Step-execution paths addressing outputs inside loop iterations
/// - Step output records (plain and loop-shaped)
/// - The immutable flow executor context and its external output record

// (loop step name, iteration) addressing
pub mod path;

// StepOutput and the nested step maps
pub mod step_output;

// Copy-on-write run state and verdict mapping
pub mod executor_context;

// Re-export commonly used types
pub use executor_context::{
    ExecutionOutput, ExecutionStatus, FailedStep, FlowExecutorContext, Verdict, VerdictResponse,
};
pub use path::StepExecutionPath;
pub use step_output::{LoopOutput, StepMap, StepOutput, StepPayload, StepStatus};
