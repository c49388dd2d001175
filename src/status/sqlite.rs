use crate::shared::ids::WorkflowId;
use crate::status::{Status, StatusStore, StatusStoreError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite-backed store. One row per (workflow, subject); the status
/// mapping is stored as a JSON column and replaced wholesale on write.
pub struct SqliteStatusStore {
    connection: Mutex<Connection>,
}

impl SqliteStatusStore {
    pub fn open(db_path: &Path) -> Result<Self, StatusStoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StatusStoreError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let connection = Connection::open(db_path).map_err(|source| StatusStoreError::Open {
            path: db_path.display().to_string(),
            source,
        })?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StatusStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|source| StatusStoreError::Open {
                path: PathBuf::from(":memory:").display().to_string(),
                source,
            })?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StatusStoreError> {
        let connection = self.connection.lock().expect("sqlite lock poisoned");
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workflow_status (
                    workflow_id TEXT NOT NULL,
                    subject_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (workflow_id, subject_id)
                );
                ",
            )
            .map_err(|source| StatusStoreError::Sql { source })
    }
}

impl StatusStore for SqliteStatusStore {
    fn get(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
    ) -> Result<Option<Status>, StatusStoreError> {
        let connection = self.connection.lock().expect("sqlite lock poisoned");
        let raw: Option<String> = connection
            .query_row(
                "SELECT status FROM workflow_status
                 WHERE workflow_id = ?1 AND subject_id = ?2",
                params![workflow_id.as_str(), subject_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| StatusStoreError::Sql { source })?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let status =
                    serde_json::from_str(&raw).map_err(|source| StatusStoreError::Parse {
                        path: format!("workflow_status/{workflow_id}/{subject_id}"),
                        source,
                    })?;
                Ok(Some(status))
            }
        }
    }

    fn set(
        &self,
        workflow_id: &WorkflowId,
        subject_id: &str,
        status: &Status,
    ) -> Result<(), StatusStoreError> {
        let payload =
            serde_json::to_string(status).map_err(|source| StatusStoreError::Serialize {
                subject_id: subject_id.to_string(),
                source,
            })?;
        let connection = self.connection.lock().expect("sqlite lock poisoned");
        connection
            .execute(
                "INSERT INTO workflow_status (workflow_id, subject_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (workflow_id, subject_id)
                 DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
                params![
                    workflow_id.as_str(),
                    subject_id,
                    payload,
                    Utc::now().timestamp()
                ],
            )
            .map_err(|source| StatusStoreError::Sql { source })?;
        Ok(())
    }
}
