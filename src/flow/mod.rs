/// Action Graph Model
///
/// This module describes the persisted tree of steps the engine executes:
/// - Type definitions (FlowVersion, Trigger, Action and its four kinds)
/// - Branch condition operators and their evaluation
/// - Graph-wide validation (unique step names)

// Core graph type definitions
pub mod types;

// Branch predicates (OR of AND-groups)
pub mod condition;

// Re-export commonly used types
pub use condition::{evaluate_conditions, BranchCondition, BranchOperator};
pub use types::{
    Action, ActionKind, BranchAction, CodeAction, FlowVersion, LoopOnItemsAction, PieceAction,
    Trigger, TriggerKind,
};
