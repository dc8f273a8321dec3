/// Action graph type definitions
///
/// A flow version is a trigger followed by a chain of actions linked through
/// `nextAction`. Branches and loops own nested sub-chains. Definitions are
/// deserialized from the JSON sent with every engine operation.

use crate::error::EngineError;
use crate::flow::condition::BranchCondition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One persisted version of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
    /// Flow version identifier
    pub id: String,
    /// Identifier of the flow this version belongs to (used for FLOW-scoped store keys)
    pub flow_id: String,
    /// Human-readable flow name
    #[serde(default)]
    pub display_name: String,
    /// Entry point of the graph
    pub trigger: Trigger,
}

impl FlowVersion {
    /// Check graph-wide invariants before execution
    ///
    /// Step outputs are addressed by name plus path, so every name must be unique
    /// across the whole graph, including branch sides and loop bodies.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        if !seen.insert(self.trigger.name.as_str()) {
            return Err(EngineError::DuplicateStepName(self.trigger.name.clone()));
        }
        for action in self.actions() {
            if !seen.insert(action.name()) {
                return Err(EngineError::DuplicateStepName(action.name().to_string()));
            }
        }
        Ok(())
    }

    /// All actions in declaration order (depth-first: branch and loop children
    /// come before the parent's `nextAction`)
    pub fn actions(&self) -> Vec<&Action> {
        let mut out = Vec::new();
        if let Some(first) = self.trigger.next_action.as_deref() {
            collect_chain(first, &mut out);
        }
        out
    }

    /// Find an action anywhere in the graph by name
    pub fn get_action(&self, name: &str) -> Option<&Action> {
        self.actions().into_iter().find(|action| action.name() == name)
    }

    /// The top-level chain hanging off the trigger (no nested children)
    pub fn top_level_chain(&self) -> Vec<&Action> {
        let mut out = Vec::new();
        let mut current = self.trigger.next_action.as_deref();
        while let Some(action) = current {
            out.push(action);
            current = action.next_action();
        }
        out
    }
}

fn collect_chain<'a>(first: &'a Action, out: &mut Vec<&'a Action>) {
    let mut current = Some(first);
    while let Some(action) = current {
        out.push(action);
        for child in action.children() {
            collect_chain(child, out);
        }
        current = action.next_action();
    }
}

/// Kind tag shared by step outputs and graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Trigger,
    Piece,
    Code,
    Branch,
    LoopOnItems,
}

/// Flow entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub settings: TriggerSettings,
    /// Last payload captured while testing the trigger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

/// Available trigger types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Placeholder trigger of a flow that is still being built
    Empty,
    /// Trigger implemented by a piece (polling or app webhook)
    PieceTrigger,
    /// Generic inbound webhook
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
    #[serde(default = "empty_object")]
    pub input: Value,
}

/// A step after the trigger
///
/// Closed set of kinds: dispatch is an exhaustive `match`, never a lookup by string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Invoke an action of an integration piece
    Piece(PieceAction),
    /// Run user-supplied code inside the sandbox
    Code(CodeAction),
    /// Choose one of two sub-chains
    Branch(BranchAction),
    /// Run a sub-chain once per item
    LoopOnItems(LoopOnItemsAction),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceAction {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub settings: PieceActionSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceActionSettings {
    pub piece_name: String,
    #[serde(default)]
    pub piece_version: String,
    pub action_name: String,
    /// Unresolved props, may contain `{{ }}` templates
    #[serde(default = "empty_object")]
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeAction {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub settings: CodeActionSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeActionSettings {
    pub source_code: SourceCode,
    #[serde(default = "empty_object")]
    pub input: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCode {
    /// Script defining `function code(inputs)`
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchAction {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub settings: BranchActionSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_action: Option<Box<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure_action: Option<Box<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchActionSettings {
    /// OR of AND-groups
    #[serde(default)]
    pub conditions: Vec<Vec<BranchCondition>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOnItemsAction {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub settings: LoopOnItemsSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_loop_action: Option<Box<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopOnItemsSettings {
    /// Items expression, usually a single template such as `{{trigger.items}}`
    pub items: Value,
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Piece(a) => &a.name,
            Action::Code(a) => &a.name,
            Action::Branch(a) => &a.name,
            Action::LoopOnItems(a) => &a.name,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Action::Piece(a) => &a.display_name,
            Action::Code(a) => &a.display_name,
            Action::Branch(a) => &a.display_name,
            Action::LoopOnItems(a) => &a.display_name,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Piece(_) => ActionKind::Piece,
            Action::Code(_) => ActionKind::Code,
            Action::Branch(_) => ActionKind::Branch,
            Action::LoopOnItems(_) => ActionKind::LoopOnItems,
        }
    }

    pub fn next_action(&self) -> Option<&Action> {
        match self {
            Action::Piece(a) => a.next_action.as_deref(),
            Action::Code(a) => a.next_action.as_deref(),
            Action::Branch(a) => a.next_action.as_deref(),
            Action::LoopOnItems(a) => a.next_action.as_deref(),
        }
    }

    pub fn sample_data(&self) -> Option<&Value> {
        match self {
            Action::Piece(a) => a.sample_data.as_ref(),
            Action::Code(a) => a.sample_data.as_ref(),
            Action::Branch(a) => a.sample_data.as_ref(),
            Action::LoopOnItems(a) => a.sample_data.as_ref(),
        }
    }

    /// Heads of the nested sub-chains owned by this action
    pub fn children(&self) -> Vec<&Action> {
        match self {
            Action::Branch(a) => a
                .on_success_action
                .as_deref()
                .into_iter()
                .chain(a.on_failure_action.as_deref())
                .collect(),
            Action::LoopOnItems(a) => a.first_loop_action.as_deref().into_iter().collect(),
            Action::Piece(_) | Action::Code(_) => Vec::new(),
        }
    }

    /// Names of every step nested under this action (not following `nextAction`)
    pub fn nested_step_names(&self) -> Vec<String> {
        let mut nested = Vec::new();
        for child in self.children() {
            collect_chain(child, &mut nested);
        }
        nested.into_iter().map(|a| a.name().to_string()).collect()
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
