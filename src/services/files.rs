/// Step file backends
///
/// Piece actions that produce binary output (downloads, generated documents)
/// write it through the files service instead of embedding it in the step output.

use crate::services::{FileLocation, FileService, WorkerApi};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Files handle given to a piece action, bound to its flow and step
#[derive(Clone)]
pub struct StepFiles {
    inner: Arc<dyn FileService>,
    location: FileLocation,
}

impl StepFiles {
    pub fn new(inner: Arc<dyn FileService>, flow_id: &str, step_name: &str) -> Self {
        Self {
            inner,
            location: FileLocation {
                flow_id: flow_id.to_string(),
                step_name: step_name.to_string(),
            },
        }
    }

    pub async fn write(&self, file_name: &str, data: Vec<u8>) -> Result<String> {
        self.inner.write(&self.location, file_name, data).await
    }
}

/// Files under `{root}/{flow_id}/{step_name}/`
#[derive(Debug, Clone)]
pub struct LocalFileService {
    root: PathBuf,
}

impl LocalFileService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileService for LocalFileService {
    async fn write(&self, location: &FileLocation, file_name: &str, data: Vec<u8>) -> Result<String> {
        // File names come from piece code; keep them inside the step directory
        let safe_name: String = file_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let dir = self.root.join(&location.flow_id).join(&location.step_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create file directory '{}': {}", dir.display(), e))?;

        let path = dir.join(safe_name);
        tokio::fs::write(&path, data).await?;
        tracing::debug!("📁 Wrote step file: {}", path.display());
        Ok(path.display().to_string())
    }
}

/// Worker API step files (`/v1/step-files`)
#[derive(Debug, Clone)]
pub struct HttpFileService {
    api: WorkerApi,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    url: String,
}

impl HttpFileService {
    pub fn new(api: WorkerApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FileService for HttpFileService {
    async fn write(&self, location: &FileLocation, file_name: &str, data: Vec<u8>) -> Result<String> {
        let url = self.api.url(&["v1", "step-files"])?;
        let response = self
            .api
            .post(url)
            .query(&[
                ("flowId", location.flow_id.as_str()),
                ("stepName", location.step_name.as_str()),
                ("fileName", file_name),
            ])
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("File upload failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("File upload of '{}' failed with status {}", file_name, response.status()));
        }
        let uploaded: UploadedFile = response.json().await?;
        Ok(uploaded.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_files_are_grouped_by_flow_and_step() {
        let dir = tempfile::tempdir().unwrap();
        let files = StepFiles::new(Arc::new(LocalFileService::new(dir.path())), "flow-1", "download");

        let written = files.write("../report.txt", b"hello".to_vec()).await.unwrap();

        let expected = dir.path().join("flow-1").join("download").join(".._report.txt");
        assert_eq!(written, expected.display().to_string());
        assert_eq!(std::fs::read(expected).unwrap(), b"hello");
    }
}
