//! Filesystem change sink.
//!
//! Writes approved file sets under `{output_dir}/{workflow_id}/`. Paths are
//! validated up front so a rejected path leaves nothing half-written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use reforge_core::workflow::node::ChangeSink;
use reforge_types::error::CollaboratorError;
use reforge_types::workflow::{CommitReceipt, WorkflowId};

use crate::filesystem::is_safe_relative;

pub struct FileSystemSink {
    output_dir: PathBuf,
    backup: bool,
}

impl FileSystemSink {
    pub fn new(output_dir: impl Into<PathBuf>, backup: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            backup,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory a workflow's files are written to.
    pub fn workflow_dir(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.output_dir.join(workflow_id.to_string())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> CollaboratorError {
    CollaboratorError::Unavailable(format!("failed to write {}: {e}", path.display()))
}

impl ChangeSink for FileSystemSink {
    async fn apply(
        &self,
        workflow_id: &WorkflowId,
        files: &BTreeMap<String, String>,
    ) -> Result<CommitReceipt, CollaboratorError> {
        if let Some(bad) = files.keys().find(|p| !is_safe_relative(p)) {
            return Err(CollaboratorError::Rejected(format!(
                "refusing to write outside the output directory: {bad}"
            )));
        }

        let root = self.workflow_dir(workflow_id);
        for (path, content) in files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            if self.backup && tokio::fs::try_exists(&target).await.unwrap_or(false) {
                let mut backup = target.clone().into_os_string();
                backup.push(".orig");
                tokio::fs::copy(&target, &backup)
                    .await
                    .map_err(|e| io_error(Path::new(&backup), e))?;
            }
            tokio::fs::write(&target, content)
                .await
                .map_err(|e| io_error(&target, e))?;
        }

        tracing::info!(
            workflow_id = %workflow_id,
            location = %root.display(),
            files = files.len(),
            "committed approved changes"
        );
        Ok(CommitReceipt {
            location: root.display().to_string(),
            files_written: files.len(),
            committed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("a.py".to_string(), "def f(x: int) -> int:\n    return x\n".to_string()),
            ("pkg/b.py".to_string(), "y: int = 2\n".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_apply_writes_under_workflow_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSystemSink::new(dir.path(), false);
        let id = WorkflowId::new();

        let receipt = sink.apply(&id, &files()).await.unwrap();
        assert_eq!(receipt.files_written, 2);
        assert_eq!(receipt.location, sink.workflow_dir(&id).display().to_string());

        let written = tokio::fs::read_to_string(sink.workflow_dir(&id).join("pkg/b.py"))
            .await
            .unwrap();
        assert_eq!(written, "y: int = 2\n");
    }

    #[tokio::test]
    async fn test_apply_keeps_backup_of_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSystemSink::new(dir.path(), true);
        let id = WorkflowId::new();
        let target = sink.workflow_dir(&id).join("a.py");
        tokio::fs::create_dir_all(target.parent().unwrap()).await.unwrap();
        tokio::fs::write(&target, "old\n").await.unwrap();

        sink.apply(&id, &files()).await.unwrap();

        let backup = tokio::fs::read_to_string(sink.workflow_dir(&id).join("a.py.orig"))
            .await
            .unwrap();
        assert_eq!(backup, "old\n");
        assert!(!sink.workflow_dir(&id).join("pkg/b.py.orig").exists());
    }

    #[tokio::test]
    async fn test_apply_rejects_escaping_paths_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSystemSink::new(dir.path(), false);
        let id = WorkflowId::new();
        let mut bad = files();
        bad.insert("../../etc/passwd".to_string(), "x".to_string());

        let err = sink.apply(&id, &bad).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));
        assert!(!sink.workflow_dir(&id).exists());
    }
}
