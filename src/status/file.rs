use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::WorkflowId;
use crate::status::{Status, StatusStore, StatusStoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One JSON file per (workflow, subject) under the state root. Writes go
/// through an atomic replace, so a reader sees either the former or the
/// new status, never a torn record.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    state_root: PathBuf,
}

impl FileStatusStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn status_path(&self, workflow_id: &WorkflowId, subject_id: &str) -> PathBuf {
        // Subject ids come from the embedding application and may contain
        // path separators; encode them before they touch the filesystem.
        let encoded = urlencoding::encode(subject_id);
        self.state_root
            .join("status")
            .join(workflow_id.as_str())
            .join(format!("{encoded}.json"))
    }
}

impl StatusStore for FileStatusStore {
    fn get(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
    ) -> Result<Option<Status>, StatusStoreError> {
        let path = self.status_path(workflow_id, subject_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StatusStoreError::Read {
                    path: path.display().to_string(),
                    source: err,
                })
            }
        };
        let status = serde_json::from_slice(&raw).map_err(|source| StatusStoreError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(status))
    }

    fn set(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
        status: &Status,
    ) -> Result<(), StatusStoreError> {
        let path = self.status_path(workflow_id, subject_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StatusStoreError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let payload =
            serde_json::to_vec_pretty(status).map_err(|source| StatusStoreError::Serialize {
                subject_id: subject_id.to_string(),
                source,
            })?;
        atomic_write_file(&path, &payload).map_err(|source| StatusStoreError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}
