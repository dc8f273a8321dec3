/// Autoflow: flow execution engine
///
/// This library runs trigger-and-action flows one invocation at a time: it walks
/// the action graph, resolves `{{ }}` templates against earlier step outputs,
/// invokes pieces and sandboxed code, and reports a single execution output
/// that can be resumed later when a step pauses.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Flow definitions - action graph types and branch conditions
pub mod flow;

// Execution context - step outputs, paths and verdicts
pub mod context;

// External collaborators - store, connections and step files
pub mod services;

// Template resolution and prop validation
pub mod variables;

// Piece contracts, registry and the built-in pieces
pub mod pieces;

// Runtime execution engine - flow executor, step executors and code sandbox
pub mod runtime;

// Engine operations and the response envelope
pub mod operations;

// Service wiring and invocation entry point
pub mod runner;

// Re-export commonly used types for external consumers
pub use context::{ExecutionOutput, ExecutionStatus, FlowExecutorContext, StepOutput, StepStatus};
pub use error::EngineError;
pub use flow::{Action, FlowVersion};
pub use operations::{EngineOperationType, EngineResponse, EngineResponseStatus};
pub use runner::run;
pub use runtime::{EngineConstants, EngineServices, FlowExecutor};
