use crate::shared::ids::WorkflowId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub mod file;
pub mod sqlite;

pub use file::FileStatusStore;
pub use sqlite::SqliteStatusStore;

/// Persisted variable values for one subject within one workflow. The
/// state variable lives in here alongside ordinary variables.
pub type Status = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StatusStoreError {
    #[error("failed to read status at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write status at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse status at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize status for subject `{subject_id}`: {source}")]
    Serialize {
        subject_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
}

/// Storage seam for status records, keyed by (workflow id, subject id).
/// The engine writes a complete mapping per transition; partial updates
/// are never issued.
pub trait StatusStore: Send + Sync {
    fn get(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
    ) -> Result<Option<Status>, StatusStoreError>;

    fn set(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
        status: &Status,
    ) -> Result<(), StatusStoreError>;
}

/// Process-local store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: Mutex<BTreeMap<(String, String), Status>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn get(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
    ) -> Result<Option<Status>, StatusStoreError> {
        let records = self.records.lock().expect("status store lock poisoned");
        Ok(records
            .get(&(workflow_id.to_string(), subject_id.to_string()))
            .cloned())
    }

    fn set(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
        status: &Status,
    ) -> Result<(), StatusStoreError> {
        let mut records = self.records.lock().expect("status store lock poisoned");
        records.insert(
            (workflow_id.to_string(), subject_id.to_string()),
            status.clone(),
        );
        Ok(())
    }
}
