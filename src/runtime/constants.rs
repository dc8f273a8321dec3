/// Per-invocation engine constants
///
/// Identity of the run plus the collaborator services. Built once by the
/// operation layer and shared read-only by every step executor.

use crate::pieces::{PieceRegistry, RunInfo};
use crate::runtime::sandbox::CodeSandbox;
use crate::services::{ConnectionService, FileService, ScopedStore, StepFiles, StoreService};
use crate::variables::VariableService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Whether the run starts fresh or continues a paused run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    #[default]
    Begin,
    Resume,
}

/// Collaborators available to step executors
#[derive(Clone)]
pub struct EngineServices {
    pub pieces: PieceRegistry,
    pub store: Arc<dyn StoreService>,
    pub connections: Arc<dyn ConnectionService>,
    pub files: Arc<dyn FileService>,
    pub sandbox: Arc<dyn CodeSandbox>,
}

impl EngineServices {
    pub fn variables(&self) -> VariableService {
        VariableService::new(self.connections.clone(), self.store.clone())
    }
}

/// Read-only inputs shared by every step of one invocation
#[derive(Clone)]
pub struct EngineConstants {
    pub flow_id: String,
    pub flow_version_id: String,
    pub flow_run_id: String,
    pub project_id: String,
    pub execution_type: ExecutionType,
    pub resume_payload: Option<Value>,
    /// Single-step test runs never pause: delays and waits complete immediately
    pub test_single_step_mode: bool,
    pub services: EngineServices,
}

impl EngineConstants {
    pub fn new(flow_id: &str, flow_version_id: &str, flow_run_id: &str, project_id: &str, services: EngineServices) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            flow_version_id: flow_version_id.to_string(),
            flow_run_id: flow_run_id.to_string(),
            project_id: project_id.to_string(),
            execution_type: ExecutionType::Begin,
            resume_payload: None,
            test_single_step_mode: false,
            services,
        }
    }

    pub fn resuming(mut self, resume_payload: Option<Value>) -> Self {
        self.execution_type = ExecutionType::Resume;
        self.resume_payload = resume_payload;
        self
    }

    pub fn single_step_test(mut self) -> Self {
        self.test_single_step_mode = true;
        self
    }

    pub fn variables(&self) -> VariableService {
        self.services.variables()
    }

    /// Store handle scoped to this flow
    pub fn scoped_store(&self) -> ScopedStore {
        ScopedStore::new(self.services.store.clone(), self.flow_id.clone())
    }

    pub fn step_files(&self, step_name: &str) -> StepFiles {
        StepFiles::new(self.services.files.clone(), &self.flow_id, step_name)
    }

    pub fn run_info(&self, step_name: &str) -> RunInfo {
        RunInfo {
            id: self.flow_run_id.clone(),
            flow_id: self.flow_id.clone(),
            project_id: self.project_id.clone(),
            step_name: step_name.to_string(),
            execution_type: self.execution_type,
            resume_payload: self.resume_payload.clone(),
            test_mode: self.test_single_step_mode,
        }
    }
}
