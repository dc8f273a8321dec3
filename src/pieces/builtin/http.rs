/// HTTP piece
///
/// `send_request` performs one HTTP call with reqwest. Non-2xx responses and
/// transport errors fail the step; the failure message carries the status and
/// response body.

use crate::pieces::{
    ActionContext, ActionHandler, DropdownOption, DropdownState, Piece, PropertyDefinition, PropertyKind, PropertyMap,
};
use crate::runtime::hooks::ActionOutcome;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub fn piece() -> Piece {
    Piece::new("http", "HTTP", "0.1.0")
        .description("Send HTTP requests to any API")
        .action(SendRequest)
}

pub struct SendRequest;

#[async_trait]
impl ActionHandler for SendRequest {
    fn name(&self) -> &'static str {
        "send_request"
    }

    fn display_name(&self) -> &'static str {
        "Send HTTP request"
    }

    fn description(&self) -> &'static str {
        "Send an HTTP request and return the response"
    }

    fn props(&self) -> PropertyMap {
        let methods = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"]
            .iter()
            .map(|m| DropdownOption::new(m, json!(m)))
            .collect();

        let mut props = PropertyMap::new();
        props.insert(
            "method".into(),
            PropertyDefinition::new(
                "Method",
                PropertyKind::StaticDropdown {
                    options: DropdownState::new(methods),
                },
            )
            .required()
            .default_value(json!("GET")),
        );
        props.insert("url".into(), PropertyDefinition::new("URL", PropertyKind::ShortText).required());
        props.insert("headers".into(), PropertyDefinition::new("Headers", PropertyKind::Object));
        props.insert("queryParams".into(), PropertyDefinition::new("Query parameters", PropertyKind::Object));
        props.insert("body".into(), PropertyDefinition::new("Body", PropertyKind::Json));
        props.insert(
            "timeout".into(),
            PropertyDefinition::new("Timeout (seconds)", PropertyKind::Number).default_value(json!(30)),
        );
        props
    }

    async fn run(&self, ctx: ActionContext) -> Result<ActionOutcome> {
        let props = &ctx.props;
        let url = props
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("HTTP request is missing 'url'"))?;
        let method = props.get("method").and_then(Value::as_str).unwrap_or("GET");
        let timeout = props.get("timeout").and_then(Value::as_f64).unwrap_or(30.0);

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout.max(0.001)))
            .build()?;

        let mut request = match method.to_uppercase().as_str() {
            "GET" => client.get(url),
            "POST" => client.post(url),
            "PUT" => client.put(url),
            "PATCH" => client.patch(url),
            "DELETE" => client.delete(url),
            "HEAD" => client.head(url),
            _ => return Err(anyhow::anyhow!("Unsupported HTTP method: {}", method)),
        };

        for (key, value) in string_pairs(props.get("headers")) {
            request = request.header(&key, value);
        }
        let query: Vec<(String, String)> = string_pairs(props.get("queryParams"));
        if !query.is_empty() {
            request = request.query(&query);
        }

        match props.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => {
                request = request.body(text.clone());
            }
            Some(body) => {
                request = request.json(body);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("HTTP request failed: {}", e))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        tracing::debug!("📡 Response status: {}", status);

        if !status.is_success() {
            // JSON message so callers see the structured failure
            return Err(anyhow::anyhow!(
                "{}",
                json!({ "status": status.as_u16(), "body": body })
            ));
        }

        tracing::info!("✅ HTTP request completed: {} {} (status: {})", method, url, status);

        Ok(ActionOutcome::output(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        })))
    }
}

/// Flatten an object prop into string pairs (non-string values are JSON-encoded)
fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    let empty = Map::new();
    let map = value.and_then(Value::as_object).unwrap_or(&empty);
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}
