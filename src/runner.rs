/// Engine setup and invocation
///
/// Wires together all components for one invocation: store, connections, step
/// files, code sandbox and the piece registry, then runs the requested
/// operation. The invocation input may override the configured worker API and
/// supply connections for local runs.

use crate::{
    config::EngineConfig,
    operations::{self, EngineOperationType, EngineResponse},
    pieces::builtin,
    runtime::{EngineServices, LuaSandbox},
    services::{
        HttpConnectionService, HttpFileService, HttpStore, LocalFileService, SqliteStore, StaticConnections,
        WorkerApi,
    },
};
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Fields every operation input may carry to select service backends
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceOverrides {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    engine_token: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    connections: Map<String, Value>,
}

/// Initialize structured logging on stderr (stdout carries the response)
pub fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // A second initialization (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init();
}

/// Build the collaborator services for one invocation
pub async fn build_services(config: &EngineConfig, input: &Value) -> Result<EngineServices> {
    let overrides: ServiceOverrides = serde_json::from_value(input.clone()).unwrap_or_default();

    let api_url = overrides.api_url.or_else(|| config.api.url.clone());
    let engine_token = overrides
        .engine_token
        .unwrap_or_else(|| config.api.engine_token.clone());
    let project_id = overrides
        .project_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "default".to_string());

    let sandbox = Arc::new(LuaSandbox::new(config.sandbox.memory_limit));
    let pieces = builtin::registry();

    match api_url {
        Some(url) => {
            tracing::info!("🌐 Using worker API backends: {}", url);
            let api = WorkerApi::new(&url, &engine_token)?;
            Ok(EngineServices {
                pieces,
                store: Arc::new(HttpStore::new(api.clone())),
                connections: Arc::new(HttpConnectionService::new(api.clone())),
                files: Arc::new(HttpFileService::new(api)),
                sandbox,
            })
        }
        None => {
            tracing::info!("📁 Using local backends in {}", config.storage.data_dir);
            let store = SqliteStore::open(&config.storage.data_dir, &project_id)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open project store: {}", e))?;
            let connections = StaticConnections::new(overrides.connections.into_iter().collect());
            let files = LocalFileService::new(Path::new(&config.storage.data_dir).join("files"));
            Ok(EngineServices {
                pieces,
                store: Arc::new(store),
                connections: Arc::new(connections),
                files: Arc::new(files),
                sandbox,
            })
        }
    }
}

/// Run one operation end to end
///
/// Always produces an envelope: failures while wiring services are reported
/// the same way as failures inside the operation.
pub async fn run(config: &EngineConfig, operation: EngineOperationType, input: Value) -> EngineResponse {
    let services = match build_services(config, &input).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!("❌ Failed to initialize services: {}", e);
            return EngineResponse::error(json!(e.to_string()));
        }
    };
    operations::execute(operation, input, &services).await
}
