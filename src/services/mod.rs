/// External collaborator services
///
/// The engine never performs storage or network I/O for its own state: steps read
/// and write through these interfaces. Each service has an HTTP backend that
/// talks to the worker API with the engine token, plus local backends for runs
/// without an API (SQLite/in-memory store, static connections, files on disk).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

// Authenticated HTTP client for the worker API
pub mod api;

// Key-value store backends and scoping
pub mod store;

// Connection lookup backends
pub mod connections;

// Step file backends
pub mod files;

pub use api::WorkerApi;
pub use connections::{HttpConnectionService, StaticConnections};
pub use files::{HttpFileService, LocalFileService, StepFiles};
pub use store::{store_key, HttpStore, MemoryStore, ScopedStore, SqliteStore, StoreScope};

/// Key-value store collaborator (keys are already scoped)
#[async_trait]
pub trait StoreService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key` and return the stored value
    async fn put(&self, key: &str, value: Value) -> Result<Value>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Connection lookup collaborator
///
/// Lookups never fail: an unknown connection or a transport error yields `None`.
#[async_trait]
pub trait ConnectionService: Send + Sync {
    async fn get(&self, name: &str) -> Option<Value>;
}

/// Where a step file belongs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub flow_id: String,
    pub step_name: String,
}

/// Files collaborator, keyed by flow id and step name
#[async_trait]
pub trait FileService: Send + Sync {
    /// Persist `data` and return a reference (URL or path) to it
    async fn write(&self, location: &FileLocation, file_name: &str, data: Vec<u8>) -> Result<String>;
}
