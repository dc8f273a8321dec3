/// Configuration management for the autoflow engine
///
/// Handles worker API access, local storage and sandbox limits. Every value can
/// be overridden through environment variables for container deployments.

use serde::{Deserialize, Serialize};

/// Default memory ceiling for one code step (64 MiB)
pub const DEFAULT_CODE_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker API configuration
    pub api: ApiConfig,
    /// Local storage used when no worker API is configured
    pub storage: StorageConfig,
    /// Code step sandbox configuration
    pub sandbox: SandboxConfig,
    /// Tracing filter directive (e.g. "info", "autoflow=debug")
    pub log_filter: String,
}

/// Worker API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the worker API; `None` selects the local backends
    pub url: Option<String>,
    /// Bearer token issued by the worker for this engine
    pub engine_token: String,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for project stores and step files (default: "data")
    /// Creates: {project_id}/store.db, files/{flow_id}/{step_name}/...
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Memory ceiling in bytes for a single code step
    pub memory_limit: usize,
}

impl Default for EngineConfig {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            api: ApiConfig {
                url: std::env::var("AUTOFLOW_API_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
                engine_token: std::env::var("AUTOFLOW_ENGINE_TOKEN").unwrap_or_default(),
            },
            storage: StorageConfig {
                data_dir: std::env::var("AUTOFLOW_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            sandbox: SandboxConfig {
                memory_limit: std::env::var("AUTOFLOW_CODE_MEMORY_LIMIT")
                    .ok()
                    .and_then(|limit| limit.parse().ok())
                    .unwrap_or(DEFAULT_CODE_MEMORY_LIMIT),
            },
            log_filter: std::env::var("AUTOFLOW_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
