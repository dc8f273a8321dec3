/// Piece contract and registry
///
/// A piece is an integration package (HTTP, Slack, delay, ...) exposing actions
/// and triggers. The engine only knows these contracts:
/// - `ActionHandler::run` executes one step and reports an `ActionOutcome`
/// - `TriggerHandler` hooks are called when a flow is enabled, disabled, run or tested
/// - `AuthValidator` checks a connection value before it is saved
///
/// Pieces are registered once per process in an immutable `PieceRegistry`.

use crate::runtime::constants::ExecutionType;
use crate::runtime::hooks::{ActionOutcome, TagRecorder};
use crate::services::{ConnectionService, ScopedStore, StepFiles};
use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

// Prop schema types
pub mod property;

// Pieces shipped with the engine
pub mod builtin;

pub use property::{DropdownOption, DropdownState, PropertyDefinition, PropertyKind, PropertyMap};

/// Input key carrying the connection value of a step
pub const AUTH_PROP: &str = "auth";

/// Remove the connection value from resolved props
pub fn split_auth(props: &mut Value) -> Option<Value> {
    props.as_object_mut().and_then(|map| map.remove(AUTH_PROP))
}

/// Run information visible to a piece action
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub id: String,
    pub flow_id: String,
    pub project_id: String,
    pub step_name: String,
    pub execution_type: ExecutionType,
    /// Payload delivered with the RESUME request, if any
    pub resume_payload: Option<Value>,
    /// Set when a single step is executed from the editor
    pub test_mode: bool,
}

/// Everything a piece action receives for one invocation
#[derive(Clone)]
pub struct ActionContext {
    /// Resolved and validated props
    pub props: Value,
    /// Resolved connection value from the `auth` input
    pub auth: Option<Value>,
    pub store: ScopedStore,
    pub files: StepFiles,
    pub connections: Arc<dyn ConnectionService>,
    pub tags: TagRecorder,
    pub run: RunInfo,
}

/// Context of a trigger hook invocation
#[derive(Clone)]
pub struct TriggerContext {
    pub props: Value,
    pub auth: Option<Value>,
    pub store: ScopedStore,
    pub flow_id: String,
    pub project_id: String,
    /// Incoming payload (RUN/TEST of webhook triggers)
    pub payload: Value,
    pub webhook_url: Option<String>,
}

/// Context of a dynamic dropdown refresh
#[derive(Clone)]
pub struct PropertyContext {
    pub props: Value,
    pub auth: Option<Value>,
    pub store: ScopedStore,
}

/// How a trigger produces events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStrategy {
    Polling,
    Webhook,
    AppWebhook,
}

/// Returned by ON_ENABLE: what the worker must set up for this trigger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRegistration {
    /// Cron expression for polling triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// App events to subscribe to (app webhooks)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<String>,
}

/// Outcome of validating a connection value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthValidation {
    pub fn valid() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Trait implemented by piece actions
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Action name used in flow definitions
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn props(&self) -> PropertyMap;

    /// Execute the action with resolved props
    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome>;

    /// Options of a `Dropdown` prop
    async fn options(&self, property: &str, _ctx: PropertyContext) -> Result<DropdownState> {
        Err(anyhow::anyhow!("Property '{}' of action '{}' has no dynamic options", property, self.name()))
    }
}

/// Trait implemented by piece triggers
#[async_trait]
pub trait TriggerHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn strategy(&self) -> TriggerStrategy;

    fn props(&self) -> PropertyMap;

    async fn on_enable(&self, _ctx: TriggerContext) -> Result<TriggerRegistration> {
        Ok(TriggerRegistration::default())
    }

    async fn on_disable(&self, _ctx: TriggerContext) -> Result<()> {
        Ok(())
    }

    /// Turn an incoming event (or a poll) into trigger payloads
    async fn run(&self, ctx: TriggerContext) -> Result<Vec<Value>>;

    /// Produce sample payloads while building the flow
    async fn test(&self, ctx: TriggerContext) -> Result<Vec<Value>> {
        self.run(ctx).await
    }

    async fn options(&self, property: &str, _ctx: PropertyContext) -> Result<DropdownState> {
        Err(anyhow::anyhow!("Property '{}' of trigger '{}' has no dynamic options", property, self.name()))
    }
}

/// Connection check attached to a piece's auth
#[async_trait]
pub trait AuthValidator: Send + Sync + 'static {
    async fn validate(&self, auth: &Value) -> AuthValidation;
}

/// Authentication declared by a piece
#[derive(Clone)]
pub struct PieceAuth {
    pub definition: PropertyDefinition,
    pub validator: Option<Arc<dyn AuthValidator>>,
}

/// An integration package
pub struct Piece {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub auth: Option<PieceAuth>,
    actions: IndexMap<String, Arc<dyn ActionHandler>>,
    triggers: IndexMap<String, Arc<dyn TriggerHandler>>,
}

impl Piece {
    pub fn new(name: &str, display_name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: String::new(),
            version: version.to_string(),
            auth: None,
            actions: IndexMap::new(),
            triggers: IndexMap::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn auth(mut self, auth: PieceAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn action<T: ActionHandler>(mut self, action: T) -> Self {
        self.actions.insert(action.name().to_string(), Arc::new(action));
        self
    }

    pub fn trigger<T: TriggerHandler>(mut self, trigger: T) -> Self {
        self.triggers.insert(trigger.name().to_string(), Arc::new(trigger));
        self
    }

    pub fn get_action(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(name).cloned()
    }

    pub fn get_trigger(&self, name: &str) -> Option<Arc<dyn TriggerHandler>> {
        self.triggers.get(name).cloned()
    }

    /// Serializable description of the piece (EXTRACT_PIECE_METADATA)
    pub fn metadata(&self) -> PieceMetadata {
        PieceMetadata {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            auth: self.auth.as_ref().map(|auth| auth.definition.clone()),
            actions: self
                .actions
                .values()
                .map(|action| {
                    (
                        action.name().to_string(),
                        ActionMetadata {
                            name: action.name().to_string(),
                            display_name: action.display_name().to_string(),
                            description: action.description().to_string(),
                            props: action.props(),
                        },
                    )
                })
                .collect(),
            triggers: self
                .triggers
                .values()
                .map(|trigger| {
                    (
                        trigger.name().to_string(),
                        TriggerMetadata {
                            name: trigger.name().to_string(),
                            display_name: trigger.display_name().to_string(),
                            description: trigger.description().to_string(),
                            strategy: trigger.strategy(),
                            props: trigger.props(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceMetadata {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<PropertyDefinition>,
    pub actions: IndexMap<String, ActionMetadata>,
    pub triggers: IndexMap<String, TriggerMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub props: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMetadata {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub strategy: TriggerStrategy,
    pub props: PropertyMap,
}

/// Builder used to register pieces before execution
pub struct PieceRegistryBuilder {
    pieces: HashMap<String, Arc<Piece>>,
}

impl Default for PieceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceRegistryBuilder {
    pub fn new() -> Self {
        Self { pieces: HashMap::new() }
    }

    pub fn register(mut self, piece: Piece) -> Self {
        if self.pieces.contains_key(&piece.name) {
            panic!("duplicate piece registered: {}", piece.name);
        }
        self.pieces.insert(piece.name.clone(), Arc::new(piece));
        self
    }

    pub fn build(self) -> PieceRegistry {
        PieceRegistry {
            inner: Arc::new(self.pieces),
        }
    }
}

/// Immutable registry available during execution
///
/// Piece versions are not tracked: one implementation per piece name.
#[derive(Clone)]
pub struct PieceRegistry {
    inner: Arc<HashMap<String, Arc<Piece>>>,
}

impl Default for PieceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceRegistry {
    pub fn new() -> Self {
        PieceRegistryBuilder::new().build()
    }

    pub fn builder() -> PieceRegistryBuilder {
        PieceRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Piece>> {
        self.inner.get(name).cloned()
    }

    pub fn piece(&self, name: &str) -> Result<Arc<Piece>> {
        self.get(name)
            .ok_or_else(|| anyhow::anyhow!("Piece '{}' is not installed", name))
    }

    pub fn action(&self, piece_name: &str, action_name: &str) -> Result<Arc<dyn ActionHandler>> {
        self.piece(piece_name)?
            .get_action(action_name)
            .ok_or_else(|| anyhow::anyhow!("Action '{}' was not found in piece '{}'", action_name, piece_name))
    }

    pub fn trigger(&self, piece_name: &str, trigger_name: &str) -> Result<Arc<dyn TriggerHandler>> {
        self.piece(piece_name)?
            .get_trigger(trigger_name)
            .ok_or_else(|| anyhow::anyhow!("Trigger '{}' was not found in piece '{}'", trigger_name, piece_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ActionHandler for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn display_name(&self) -> &'static str {
            "No-op"
        }

        fn props(&self) -> PropertyMap {
            let mut props = PropertyMap::new();
            props.insert("note".into(), PropertyDefinition::new("Note", PropertyKind::ShortText));
            props
        }

        async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
            Ok(ActionOutcome::output(ctx.props))
        }
    }

    #[test]
    fn registry_lookups_report_what_is_missing() {
        let registry = PieceRegistry::builder()
            .register(Piece::new("utils", "Utilities", "0.1.0").action(Noop))
            .build();

        assert!(registry.action("utils", "noop").is_ok());
        let missing_piece = registry.action("slack", "send").err().unwrap().to_string();
        assert!(missing_piece.contains("'slack'"));
        let missing_action = registry.action("utils", "send").err().unwrap().to_string();
        assert!(missing_action.contains("'send'"));
    }

    #[test]
    fn metadata_lists_actions_with_props() {
        let piece = Piece::new("utils", "Utilities", "0.1.0").description("Helpers").action(Noop);
        let metadata = serde_json::to_value(piece.metadata()).unwrap();

        assert_eq!(metadata["displayName"], "Utilities");
        assert_eq!(metadata["actions"]["noop"]["props"]["note"]["type"], "SHORT_TEXT");
        assert!(metadata.get("auth").is_none());
    }
}
