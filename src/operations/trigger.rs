/// EXECUTE_TRIGGER_HOOK
///
/// Calls one lifecycle hook of the flow's piece trigger. Trigger props are
/// resolved (connections and store only; there are no step outputs yet) and
/// validated against the trigger's schema before the hook runs.

use crate::context::FlowExecutorContext;
use crate::error::EngineError;
use crate::flow::{FlowVersion, TriggerKind};
use crate::operations::to_response;
use crate::pieces::{split_auth, TriggerContext};
use crate::runtime::EngineServices;
use crate::services::ScopedStore;
use crate::variables::process_and_validate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerHookType {
    OnEnable,
    OnDisable,
    Run,
    Test,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTriggerHookInput {
    pub hook_type: TriggerHookType,
    pub flow_version: FlowVersion,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub trigger_payload: Value,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

pub async fn execute_trigger_hook(input: ExecuteTriggerHookInput, services: &EngineServices) -> Result<Value, EngineError> {
    let flow = &input.flow_version;
    let trigger = &flow.trigger;
    if trigger.kind != TriggerKind::PieceTrigger {
        return Err(EngineError::InvalidInput(format!(
            "Trigger '{}' is not a piece trigger",
            trigger.name
        )));
    }
    let piece_name = trigger
        .settings
        .piece_name
        .as_deref()
        .ok_or_else(|| EngineError::InvalidInput("Trigger settings are missing pieceName".to_string()))?;
    let trigger_name = trigger
        .settings
        .trigger_name
        .as_deref()
        .ok_or_else(|| EngineError::InvalidInput("Trigger settings are missing triggerName".to_string()))?;

    let handler = services.pieces.trigger(piece_name, trigger_name)?;

    let resolved = services
        .variables()
        .resolve(&trigger.settings.input, &FlowExecutorContext::empty())
        .await?;
    let mut props = resolved.resolved;
    let auth = split_auth(&mut props);
    let (props, errors) = process_and_validate(&handler.props(), &props);
    if !errors.is_empty() {
        return Err(EngineError::Internal(anyhow::anyhow!("{}", json!(errors))));
    }

    let ctx = TriggerContext {
        props,
        auth,
        store: ScopedStore::new(services.store.clone(), flow.flow_id.clone()),
        flow_id: flow.flow_id.clone(),
        project_id: input.project_id.clone(),
        payload: input.trigger_payload.clone(),
        webhook_url: input.webhook_url.clone(),
    };

    tracing::info!("🪝 Trigger hook {:?} for {}.{}", input.hook_type, piece_name, trigger_name);

    match input.hook_type {
        TriggerHookType::OnEnable => to_response(&handler.on_enable(ctx).await?),
        TriggerHookType::OnDisable => {
            handler.on_disable(ctx).await?;
            Ok(json!({}))
        }
        TriggerHookType::Run | TriggerHookType::Test => {
            let result = if input.hook_type == TriggerHookType::Run {
                handler.run(ctx).await
            } else {
                handler.test(ctx).await
            };
            // RUN/TEST report trigger errors in the payload instead of failing the operation
            Ok(match result {
                Ok(output) => json!({ "success": true, "output": output }),
                Err(e) => json!({ "success": false, "message": e.to_string(), "output": [] }),
            })
        }
    }
}
