#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use autoflow::operations::{self, EngineOperationType, EngineResponse};
use autoflow::pieces::{
    builtin, ActionContext, ActionHandler, AuthValidation, AuthValidator, DropdownOption, DropdownState, Piece,
    PieceAuth, PieceRegistry, PropertyContext, PropertyDefinition, PropertyKind, PropertyMap, TriggerContext,
    TriggerHandler, TriggerRegistration, TriggerStrategy,
};
use autoflow::runtime::{ActionOutcome, EngineServices, ExecutionType, LuaSandbox, PauseMetadata, StopResponse};
use autoflow::services::{LocalFileService, MemoryStore, StaticConnections};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of times each counted test action ran, keyed by step name
#[derive(Clone, Default)]
pub struct RunCounter {
    runs: Arc<std::sync::Mutex<HashMap<String, usize>>>,
    total: Arc<AtomicUsize>,
}

impl RunCounter {
    fn record(&self, step_name: &str) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut runs) = self.runs.lock() {
            *runs.entry(step_name.to_string()).or_default() += 1;
        }
    }

    pub fn runs(&self, step_name: &str) -> usize {
        self.runs
            .lock()
            .map(|runs| runs.get(step_name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Returns its (undeclared, passed-through) props as output
pub struct Echo {
    counter: RunCounter,
}

#[async_trait]
impl ActionHandler for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn display_name(&self) -> &'static str {
        "Echo"
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        self.counter.record(&ctx.run.step_name);
        Ok(ActionOutcome::output(ctx.props))
    }
}

/// Requires a text prop
pub struct Greet;

#[async_trait]
impl ActionHandler for Greet {
    fn name(&self) -> &'static str {
        "greet"
    }

    fn display_name(&self) -> &'static str {
        "Greet"
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            "name".into(),
            PropertyDefinition::new("Name", PropertyKind::ShortText).required(),
        );
        props.insert("times".into(), PropertyDefinition::new("Times", PropertyKind::Number));
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let name = ctx.props["name"].as_str().unwrap_or_default().to_string();
        Ok(ActionOutcome::output(json!({ "greeting": format!("hello {}", name) })))
    }
}

pub struct Fail;

#[async_trait]
impl ActionHandler for Fail {
    fn name(&self) -> &'static str {
        "fail"
    }

    fn display_name(&self) -> &'static str {
        "Fail"
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, _ctx: ActionContext) -> Result<ActionOutcome> {
        Err(anyhow::anyhow!("upstream rejected the request"))
    }
}

pub struct Explode;

#[async_trait]
impl ActionHandler for Explode {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn display_name(&self) -> &'static str {
        "Explode"
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, _ctx: ActionContext) -> Result<ActionOutcome> {
        panic!("piece bug");
    }
}

/// Stops the run with a 201 response
pub struct Halt;

#[async_trait]
impl ActionHandler for Halt {
    fn name(&self) -> &'static str {
        "halt"
    }

    fn display_name(&self) -> &'static str {
        "Halt"
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, _ctx: ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::stop(
            json!({ "halted": true }),
            StopResponse::new(201, json!({ "stopped": true })),
        ))
    }
}

/// Pauses on the first run and returns the resume payload afterwards
pub struct Approval {
    counter: RunCounter,
}

#[async_trait]
impl ActionHandler for Approval {
    fn name(&self) -> &'static str {
        "approval"
    }

    fn display_name(&self) -> &'static str {
        "Approval"
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        self.counter.record(&ctx.run.step_name);
        if ctx.run.execution_type == ExecutionType::Resume {
            return Ok(ActionOutcome::output(json!({
                "approved": ctx.run.resume_payload.unwrap_or(Value::Null),
            })));
        }
        Ok(ActionOutcome::pause(
            json!({}),
            PauseMetadata::Webhook {
                request_id: format!("req-{}", ctx.run.step_name),
                response: json!({}),
            },
        ))
    }
}

/// Adds a tag and writes to the flow store
pub struct Remember;

#[async_trait]
impl ActionHandler for Remember {
    fn name(&self) -> &'static str {
        "remember"
    }

    fn display_name(&self) -> &'static str {
        "Remember"
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("key".into(), PropertyDefinition::new("Key", PropertyKind::ShortText).required());
        props.insert("value".into(), PropertyDefinition::new("Value", PropertyKind::Json));
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let key = ctx.props["key"].as_str().unwrap_or_default().to_string();
        let value = ctx.props.get("value").cloned().unwrap_or(Value::Null);
        ctx.tags.add(format!("remembered:{}", key));
        let stored = ctx
            .store
            .put(&key, value, autoflow::services::StoreScope::Project)
            .await?;
        Ok(ActionOutcome::output(stored))
    }
}

/// Accepts only the key "valid-key"
pub struct CrmAuthValidator;

#[async_trait]
impl AuthValidator for CrmAuthValidator {
    async fn validate(&self, auth: &Value) -> AuthValidation {
        match auth.get("apiKey").and_then(Value::as_str) {
            Some("valid-key") => AuthValidation::valid(),
            _ => AuthValidation::invalid("Invalid API key"),
        }
    }
}

fn crm_auth() -> PieceAuth {
    let mut props = PropertyMap::new();
    props.insert(
        "apiKey".into(),
        PropertyDefinition::new("API key", PropertyKind::SecretText).required(),
    );
    props.insert(
        "region".into(),
        PropertyDefinition::new(
            "Region",
            PropertyKind::StaticDropdown {
                options: DropdownState::new(vec![
                    DropdownOption::new("EU", json!("eu")),
                    DropdownOption::new("US", json!("us")),
                ]),
            },
        )
        .default_value(json!("eu")),
    );
    PieceAuth {
        definition: PropertyDefinition::new("CRM account", PropertyKind::CustomAuth { props }).required(),
        validator: Some(Arc::new(CrmAuthValidator)),
    }
}

/// Action with a dropdown computed from the connection
pub struct ListContacts;

#[async_trait]
impl ActionHandler for ListContacts {
    fn name(&self) -> &'static str {
        "list_contacts"
    }

    fn display_name(&self) -> &'static str {
        "List contacts"
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            "list".into(),
            PropertyDefinition::new(
                "List",
                PropertyKind::Dropdown {
                    refreshers: vec!["auth".to_string()],
                },
            )
            .required(),
        );
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        Ok(ActionOutcome::output(json!({
            "list": ctx.props["list"],
            "region": ctx.auth.as_ref().and_then(|auth| auth.get("region").cloned()),
        })))
    }

    async fn options(&self, property: &str, ctx: PropertyContext) -> Result<DropdownState> {
        if property != "list" {
            return Err(anyhow::anyhow!("Unknown property: {}", property));
        }
        let Some(auth) = ctx.auth else {
            return Ok(DropdownState {
                disabled: true,
                placeholder: Some("Connect your account first".to_string()),
                options: Vec::new(),
            });
        };
        let region = auth.get("region").and_then(Value::as_str).unwrap_or("eu");
        Ok(DropdownState::new(vec![DropdownOption::new(
            &format!("{} customers", region.to_uppercase()),
            json!(format!("{}-customers", region)),
        )]))
    }
}

/// Polling trigger emitting one contact per run
pub struct NewContact;

#[async_trait]
impl TriggerHandler for NewContact {
    fn name(&self) -> &'static str {
        "new_contact"
    }

    fn display_name(&self) -> &'static str {
        "New contact"
    }

    fn strategy(&self) -> TriggerStrategy {
        TriggerStrategy::Polling
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("list".into(), PropertyDefinition::new("List", PropertyKind::ShortText).required());
        props
    }

    async fn on_enable(&self, _ctx: TriggerContext) -> Result<TriggerRegistration> {
        Ok(TriggerRegistration {
            schedule: Some("*/5 * * * *".to_string()),
            listeners: Vec::new(),
        })
    }

    async fn run(&self, ctx: TriggerContext) -> Result<Vec<Value>> {
        if ctx.payload.get("fail").is_some() {
            return Err(anyhow::anyhow!("CRM is unavailable"));
        }
        Ok(vec![json!({ "id": 1, "list": ctx.props["list"] })])
    }

    async fn test(&self, _ctx: TriggerContext) -> Result<Vec<Value>> {
        Ok(vec![json!({ "id": "sample" })])
    }
}

/// Registry with the built-in pieces plus the `test` and `crm` pieces
pub fn registry(counter: &RunCounter) -> PieceRegistry {
    builtin::builder()
        .register(
            Piece::new("test", "Test", "0.0.1")
                .action(Echo {
                    counter: counter.clone(),
                })
                .action(Greet)
                .action(Fail)
                .action(Explode)
                .action(Halt)
                .action(Approval {
                    counter: counter.clone(),
                })
                .action(Remember),
        )
        .register(
            Piece::new("crm", "CRM", "1.0.0")
                .auth(crm_auth())
                .action(ListContacts)
                .trigger(NewContact),
        )
        .build()
}

pub struct TestEngine {
    pub services: EngineServices,
    pub counter: RunCounter,
    pub store: Arc<MemoryStore>,
    _files: tempfile::TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        let counter = RunCounter::default();
        let store = Arc::new(MemoryStore::new());
        let files = tempfile::tempdir().expect("tempdir");
        let connections = StaticConnections::new(HashMap::new())
            .with("gmail", json!({ "access_token": "secret-token", "email": "me@example.com" }));

        let services = EngineServices {
            pieces: registry(&counter),
            store: store.clone(),
            connections: Arc::new(connections),
            files: Arc::new(LocalFileService::new(files.path())),
            sandbox: Arc::new(LuaSandbox::default()),
        };

        Self {
            services,
            counter,
            store,
            _files: files,
        }
    }

    pub async fn execute(&self, operation: EngineOperationType, input: Value) -> EngineResponse {
        operations::execute(operation, input, &self.services).await
    }

    /// Run a BEGIN invocation and return the execution output
    pub async fn begin(&self, flow: Value, payload: Value) -> Value {
        let response = self
            .execute(
                EngineOperationType::ExecuteFlow,
                json!({
                    "flowVersion": flow,
                    "flowRunId": "run-1",
                    "projectId": "project-1",
                    "executionType": "BEGIN",
                    "triggerPayload": payload,
                }),
            )
            .await;
        assert_eq!(
            response.status,
            operations::EngineResponseStatus::Ok,
            "unexpected envelope: {}",
            response.response
        );
        response.response
    }

    /// Resume a paused run from its previous execution output
    pub async fn resume(&self, flow: Value, previous: &Value, resume_payload: Value) -> Value {
        let response = self
            .execute(
                EngineOperationType::ExecuteFlow,
                json!({
                    "flowVersion": flow,
                    "flowRunId": "run-1",
                    "projectId": "project-1",
                    "executionType": "RESUME",
                    "executionState": {
                        "steps": previous["steps"],
                        "tags": previous["tags"],
                        "tasks": previous["tasks"],
                    },
                    "resumePayload": resume_payload,
                }),
            )
            .await;
        assert_eq!(
            response.status,
            operations::EngineResponseStatus::Ok,
            "unexpected envelope: {}",
            response.response
        );
        response.response
    }
}

/// Flow version whose trigger is followed by `first`
pub fn flow(first: Value) -> Value {
    json!({
        "id": "version-1",
        "flowId": "flow-1",
        "displayName": "Test flow",
        "trigger": {
            "name": "trigger",
            "type": "WEBHOOK",
            "sampleData": { "sample": true },
            "nextAction": first,
        }
    })
}

/// Piece step of the `test` piece
pub fn step(name: &str, action: &str, input: Value) -> Value {
    json!({
        "type": "PIECE",
        "name": name,
        "displayName": name,
        "settings": {
            "pieceName": "test",
            "pieceVersion": "0.0.1",
            "actionName": action,
            "input": input,
        }
    })
}

/// Set `next` as the `nextAction` of `action` and return it
pub fn then(mut action: Value, next: Value) -> Value {
    action["nextAction"] = next;
    action
}

/// Link actions into one chain
pub fn chain(actions: Vec<Value>) -> Value {
    let mut iter = actions.into_iter().rev();
    let mut current = iter.next().expect("chain needs at least one action");
    for action in iter {
        current = then(action, current);
    }
    current
}

pub fn code_step(name: &str, input: Value, code: &str) -> Value {
    json!({
        "type": "CODE",
        "name": name,
        "settings": {
            "input": input,
            "sourceCode": { "code": code },
        }
    })
}

pub fn branch(name: &str, conditions: Value, on_success: Option<Value>, on_failure: Option<Value>) -> Value {
    let mut action = json!({
        "type": "BRANCH",
        "name": name,
        "settings": { "conditions": conditions },
    });
    if let Some(on_success) = on_success {
        action["onSuccessAction"] = on_success;
    }
    if let Some(on_failure) = on_failure {
        action["onFailureAction"] = on_failure;
    }
    action
}

pub fn loop_on_items(name: &str, items: Value, body: Value) -> Value {
    json!({
        "type": "LOOP_ON_ITEMS",
        "name": name,
        "settings": { "items": items },
        "firstLoopAction": body,
    })
}
