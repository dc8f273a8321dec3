/// Webhook piece
///
/// - `catch_webhook` trigger: the incoming request payload starts the flow
/// - `return_response` action: stops the run and answers the waiting caller
/// - `wait_for_request` action: pauses until a request with the issued id arrives

use crate::pieces::{
    ActionContext, ActionHandler, Piece, PropertyDefinition, PropertyKind, PropertyMap, TriggerContext,
    TriggerHandler, TriggerStrategy,
};
use crate::runtime::constants::ExecutionType;
use crate::runtime::hooks::{ActionOutcome, PauseMetadata, StopResponse};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn piece() -> Piece {
    Piece::new("webhook", "Webhook", "0.1.0")
        .description("Receive and answer HTTP requests")
        .trigger(CatchWebhook)
        .action(ReturnResponse)
        .action(WaitForRequest)
}

pub struct CatchWebhook;

#[async_trait]
impl TriggerHandler for CatchWebhook {
    fn name(&self) -> &'static str {
        "catch_webhook"
    }

    fn display_name(&self) -> &'static str {
        "Catch webhook"
    }

    fn strategy(&self) -> TriggerStrategy {
        TriggerStrategy::Webhook
    }

    fn props(&self) -> PropertyMap {
        PropertyMap::new()
    }

    async fn run(&self, ctx: TriggerContext) -> Result<Vec<Value>> {
        Ok(vec![ctx.payload])
    }
}

pub struct ReturnResponse;

#[async_trait]
impl ActionHandler for ReturnResponse {
    fn name(&self) -> &'static str {
        "return_response"
    }

    fn display_name(&self) -> &'static str {
        "Return response"
    }

    fn description(&self) -> &'static str {
        "Stop the flow and return a response to the webhook caller"
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            "status".into(),
            PropertyDefinition::new("Status", PropertyKind::Number).default_value(json!(200)),
        );
        props.insert("headers".into(), PropertyDefinition::new("Headers", PropertyKind::Object));
        props.insert("body".into(), PropertyDefinition::new("Body", PropertyKind::Json));
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let status = ctx.props.get("status").and_then(Value::as_u64).unwrap_or(200);
        let status = u16::try_from(status).map_err(|_| anyhow::anyhow!("Invalid status code: {}", status))?;
        let body = ctx.props.get("body").cloned().unwrap_or(Value::Null);
        let headers: BTreeMap<String, String> = ctx
            .props
            .get("headers")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let response = StopResponse { status, body, headers };
        Ok(ActionOutcome::stop(json!(response), response))
    }
}

pub struct WaitForRequest;

#[async_trait]
impl ActionHandler for WaitForRequest {
    fn name(&self) -> &'static str {
        "wait_for_request"
    }

    fn display_name(&self) -> &'static str {
        "Wait for request"
    }

    fn description(&self) -> &'static str {
        "Pause the flow until a request with the issued id is received"
    }

    fn props(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            "response".into(),
            PropertyDefinition::new("Response", PropertyKind::Json)
                .description("Returned to the caller that started the run while it waits"),
        );
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        if ctx.run.execution_type == ExecutionType::Resume {
            return Ok(ActionOutcome::output(ctx.run.resume_payload.unwrap_or(Value::Null)));
        }
        if ctx.run.test_mode {
            return Ok(ActionOutcome::output(json!({})));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let response = ctx.props.get("response").cloned().unwrap_or_else(|| json!({}));
        tracing::info!("⏸️ Waiting for request: {}", request_id);
        Ok(ActionOutcome::pause(
            json!({ "requestId": request_id }),
            PauseMetadata::Webhook { request_id, response },
        ))
    }
}
