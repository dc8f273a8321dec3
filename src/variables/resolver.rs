/// Variable resolution service
///
/// Resolves `{{ }}` templates in step settings against the execution context.
/// Resolution happens in two passes: the input is scanned for every template
/// root that needs a collaborator (`connections`, `store`) and those values are
/// fetched once, then the input is rendered twice from the same lookups, once
/// with connection values in the clear and once with every connection leaf masked.

use crate::context::FlowExecutorContext;
use crate::services::{ConnectionService, StoreService};
use crate::variables::template::{find_templates, parse_path, select, single_template, Accessor};
use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Replacement for every leaf of a connection value in censored output
pub const REDACTED: &str = "**REDACTED**";

const CONNECTIONS_ROOT: &str = "connections";
const STORE_ROOT: &str = "store";

/// Result of resolving one input value
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    /// Value handed to the step
    pub resolved: Value,
    /// Same shape as `resolved`, safe to log and persist
    pub censored: Value,
}

/// Template resolver bound to the run's collaborators
#[derive(Clone)]
pub struct VariableService {
    connections: Arc<dyn ConnectionService>,
    store: Arc<dyn StoreService>,
}

/// Collaborator values fetched for one `resolve` call
#[derive(Default)]
struct Lookups {
    connections: HashMap<String, Option<Value>>,
    store: HashMap<String, Option<Value>>,
}

impl VariableService {
    pub fn new(connections: Arc<dyn ConnectionService>, store: Arc<dyn StoreService>) -> Self {
        Self { connections, store }
    }

    /// Resolve every template in `unresolved` against `context`
    ///
    /// Missing references resolve to null (whole-string templates) or to an empty
    /// string (inside mixed text). A failing store read is an error.
    pub async fn resolve(&self, unresolved: &Value, context: &FlowExecutorContext) -> Result<ResolvedInput> {
        let mut expressions = Vec::new();
        collect_expressions(unresolved, &mut expressions);

        let mut lookups = Lookups::default();
        for expression in &expressions {
            let Ok(path) = parse_path(expression) else {
                continue;
            };
            match (path.first(), path.get(1)) {
                (Some(Accessor::Key(root)), Some(Accessor::Key(name))) if root == CONNECTIONS_ROOT => {
                    if !lookups.connections.contains_key(name) {
                        tracing::debug!("🔐 Loading connection: {}", name);
                        let value = self.connections.get(name).await;
                        lookups.connections.insert(name.clone(), value);
                    }
                }
                (Some(Accessor::Key(root)), Some(Accessor::Key(key))) if root == STORE_ROOT => {
                    if !lookups.store.contains_key(key) {
                        tracing::debug!("🗄️ Reading store key for template: {}", key);
                        let value = self.store.get(key).await?;
                        lookups.store.insert(key.clone(), value);
                    }
                }
                _ => {}
            }
        }

        let state = context.current_state();
        Ok(ResolvedInput {
            resolved: render(unresolved, state, &lookups, false),
            censored: render(unresolved, state, &lookups, true),
        })
    }

    /// Resolve a single connection name directly (piece auth without a template)
    pub async fn connection(&self, name: &str) -> Option<Value> {
        self.connections.get(name).await
    }
}

fn collect_expressions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(find_templates(text).into_iter().map(|span| span.expression)),
        Value::Array(items) => items.iter().for_each(|item| collect_expressions(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_expressions(item, out)),
        _ => {}
    }
}

fn render(value: &Value, state: &Map<String, Value>, lookups: &Lookups, censor: bool) -> Value {
    match value {
        Value::String(text) => render_string(text, state, lookups, censor),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| render(item, state, lookups, censor))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), render(item, state, lookups, censor)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_string(text: &str, state: &Map<String, Value>, lookups: &Lookups, censor: bool) -> Value {
    if let Some(expression) = single_template(text) {
        return lookup(&expression, state, lookups, censor).unwrap_or(Value::Null);
    }

    let spans = find_templates(text);
    if spans.is_empty() {
        return Value::String(text.to_string());
    }

    let mut rendered = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        rendered.push_str(&text[cursor..span.start]);
        match lookup(&span.expression, state, lookups, censor) {
            Some(Value::String(s)) => rendered.push_str(&s),
            Some(Value::Null) | None => {}
            Some(other) => rendered.push_str(&other.to_string()),
        }
        cursor = span.end;
    }
    rendered.push_str(&text[cursor..]);
    Value::String(rendered)
}

fn lookup(expression: &str, state: &Map<String, Value>, lookups: &Lookups, censor: bool) -> Option<Value> {
    let path = match parse_path(expression) {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!("⚠️ Unresolvable template '{}': {}", expression, e);
            return None;
        }
    };

    let Some(Accessor::Key(root)) = path.first() else {
        return None;
    };

    match root.as_str() {
        CONNECTIONS_ROOT => {
            let Some(Accessor::Key(name)) = path.get(1) else {
                return None;
            };
            let connection = lookups.connections.get(name)?.as_ref()?;
            if censor {
                select(&redact(connection), &path[2..])
            } else {
                select(connection, &path[2..])
            }
        }
        STORE_ROOT => {
            let Some(Accessor::Key(key)) = path.get(1) else {
                return None;
            };
            let value = lookups.store.get(key)?.as_ref()?;
            select(value, &path[2..])
        }
        step_name => select(state.get(step_name)?, &path[1..]),
    }
}

/// Mask every leaf of a value, keeping its shape
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), redact(v))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        _ => Value::String(REDACTED.to_string()),
    }
}
