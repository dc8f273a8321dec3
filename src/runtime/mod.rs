/// Runtime Execution Engine
///
/// This module executes flow versions step by step:
/// - Walking `nextAction` chains and stopping on a non-RUNNING verdict
/// - Per-kind step executors (piece, code, branch, loop)
/// - The hook protocol pieces use to stop or pause a run
/// - The Lua sandbox behind code steps

// Chain walking and the flow driver
pub mod engine;

// Per-kind step handlers
pub mod executor;

// Stop/pause outcomes and tag recording
pub mod hooks;

// Run identity and collaborator services
pub mod constants;

// Code step interpreter
pub mod sandbox;

// Re-export main types
pub use constants::{EngineConstants, EngineServices, ExecutionType};
pub use engine::{execute_chain, FlowExecutor};
pub use executor::execute_action;
pub use hooks::{ActionOutcome, PauseMetadata, RunSignal, StopResponse, TagRecorder};
pub use sandbox::{CodeSandbox, LuaSandbox};
