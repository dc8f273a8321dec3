/// Key-value store backends
///
/// Keys are scoped before they reach a backend: PROJECT-scoped keys are used
/// as-is, FLOW-scoped keys are prefixed with `flow_<flowId>/`. Three backends:
/// - `HttpStore`: worker API store entries (bearer token)
/// - `SqliteStore`: local SQLite file, used when no worker API is configured
/// - `MemoryStore`: process-local map for tests and single-step runs

use crate::services::{StoreService, WorkerApi};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Visibility of a store entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreScope {
    /// Shared by every flow of the project
    Project,
    /// Private to one flow
    #[default]
    Flow,
}

/// Derive the backend key for `key` in `scope`
pub fn store_key(key: &str, scope: StoreScope, flow_id: &str) -> String {
    match scope {
        StoreScope::Project => key.to_string(),
        StoreScope::Flow => format!("flow_{}/{}", flow_id, key),
    }
}

/// Store handle given to piece actions and triggers, bound to one flow
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn StoreService>,
    flow_id: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn StoreService>, flow_id: impl Into<String>) -> Self {
        Self {
            inner,
            flow_id: flow_id.into(),
        }
    }

    pub async fn get(&self, key: &str, scope: StoreScope) -> Result<Option<Value>> {
        self.inner.get(&store_key(key, scope, &self.flow_id)).await
    }

    pub async fn put(&self, key: &str, value: Value, scope: StoreScope) -> Result<Value> {
        self.inner.put(&store_key(key, scope, &self.flow_id), value).await
    }

    pub async fn delete(&self, key: &str, scope: StoreScope) -> Result<()> {
        self.inner.delete(&store_key(key, scope, &self.flow_id)).await
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreService for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<Value> {
        self.entries.write().await.insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// SQLite-backed store for local runs
///
/// Entries live in `{data_dir}/{project_id}/store.db`, one row per key with the
/// value kept as JSON text.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store database of a project
    pub async fn open(data_dir: &str, project_id: &str) -> Result<Self> {
        let project_dir = Path::new(data_dir).join(project_id);
        std::fs::create_dir_all(&project_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create project directory '{}': {}", project_dir.display(), e))?;
        let db_path = project_dir.join("store.db");

        tracing::info!("🗄️ Opening store database: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection so the schema survives)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Safe to call multiple times (uses IF NOT EXISTS)
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_entries (
                key TEXT PRIMARY KEY,
                value JSON NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreService for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM store_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Value) -> Result<Value> {
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO store_entries (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(&raw)
        .execute(&self.pool)
        .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM store_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Worker API store (`/v1/store-entries`)
#[derive(Debug, Clone)]
pub struct HttpStore {
    api: WorkerApi,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    #[serde(default)]
    value: Value,
}

impl HttpStore {
    pub fn new(api: WorkerApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StoreService for HttpStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let url = self.api.url(&["v1", "store-entries"])?;
        let response = self
            .api
            .get(url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Store request failed: {}", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Store read of '{}' failed with status {}", key, response.status()));
        }

        // An empty body means the entry does not exist
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let entry: StoreEntry = serde_json::from_str(&body)?;
        Ok(Some(entry.value))
    }

    async fn put(&self, key: &str, value: Value) -> Result<Value> {
        let url = self.api.url(&["v1", "store-entries"])?;
        let response = self
            .api
            .post(url)
            .json(&json!({ "key": key, "value": value }))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Store request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Store write of '{}' failed with status {}", key, response.status()));
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.api.url(&["v1", "store-entries"])?;
        let response = self
            .api
            .delete(url)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Store request failed: {}", e))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow::anyhow!("Store delete of '{}' failed with status {}", key, response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_per_scope() {
        assert_eq!(store_key("counter", StoreScope::Project, "f1"), "counter");
        assert_eq!(store_key("counter", StoreScope::Flow, "f1"), "flow_f1/counter");
    }

    #[tokio::test]
    async fn scoped_store_separates_flows() {
        let backend: Arc<dyn StoreService> = Arc::new(MemoryStore::new());
        let a = ScopedStore::new(backend.clone(), "a");
        let b = ScopedStore::new(backend.clone(), "b");

        a.put("k", json!(1), StoreScope::Flow).await.unwrap();
        b.put("k", json!(2), StoreScope::Flow).await.unwrap();
        a.put("shared", json!("x"), StoreScope::Project).await.unwrap();

        assert_eq!(a.get("k", StoreScope::Flow).await.unwrap(), Some(json!(1)));
        assert_eq!(b.get("k", StoreScope::Flow).await.unwrap(), Some(json!(2)));
        assert_eq!(b.get("shared", StoreScope::Project).await.unwrap(), Some(json!("x")));

        a.delete("k", StoreScope::Flow).await.unwrap();
        assert_eq!(a.get("k", StoreScope::Flow).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_store_upserts() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", json!({"n": 1})).await.unwrap();
        store.put("k", json!({"n": 2})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"n": 2})));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
