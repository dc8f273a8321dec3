/// Connection lookup backends
///
/// A connection is a named credential bundle (API key, OAuth tokens, ...). The
/// engine resolves `{{connections['name']}}` templates through these services and
/// hands the value to the piece as its `auth`.

use crate::services::{ConnectionService, WorkerApi};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Worker API connection lookup (`/v1/worker/app-connections/{name}`)
#[derive(Debug, Clone)]
pub struct HttpConnectionService {
    api: WorkerApi,
}

impl HttpConnectionService {
    pub fn new(api: WorkerApi) -> Self {
        Self { api }
    }

    async fn fetch(&self, name: &str) -> anyhow::Result<Option<Value>> {
        let url = self.api.url(&["v1", "worker", "app-connections", name])?;
        let response = self.api.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Connection lookup failed with status {}", response.status()));
        }

        let body: Value = response.json().await?;
        // The API wraps the credential in a connection record
        Ok(Some(body.get("value").cloned().unwrap_or(body)))
    }
}

#[async_trait]
impl ConnectionService for HttpConnectionService {
    async fn get(&self, name: &str) -> Option<Value> {
        match self.fetch(name).await {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                tracing::warn!("⚠️ Connection '{}' not found", name);
                None
            }
            Err(e) => {
                tracing::warn!("⚠️ Connection '{}' could not be loaded: {}", name, e);
                None
            }
        }
    }
}

/// Fixed set of connections (local runs and tests)
#[derive(Debug, Clone, Default)]
pub struct StaticConnections {
    connections: HashMap<String, Value>,
}

impl StaticConnections {
    pub fn new(connections: HashMap<String, Value>) -> Self {
        Self { connections }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.connections.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl ConnectionService for StaticConnections {
    async fn get(&self, name: &str) -> Option<Value> {
        self.connections.get(name).cloned()
    }
}
