//! SQLite checkpoint store.
//!
//! Implements `CheckpointStore` from `reforge-core`. The full workflow state
//! is stored as a JSON blob next to a few denormalised summary columns used
//! for listing. Each save replaces the current row and appends a history row
//! in one transaction, so a reader never sees one without the other.

use reforge_core::repository::checkpoint::CheckpointStore;
use reforge_types::error::RepositoryError;
use reforge_types::workflow::{
    CheckpointRecord, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct StateRow {
    state_json: String,
}

impl StateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            state_json: row.try_get("state_json")?,
        })
    }

    fn into_state(self) -> Result<WorkflowState, RepositoryError> {
        serde_json::from_str(&self.state_json)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow state JSON: {e}")))
    }
}

struct SummaryRow {
    id: String,
    status: String,
    goal: String,
    iteration_count: i64,
    max_iterations: i64,
    files_total: i64,
    error_message: Option<String>,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            goal: row.try_get("goal")?,
            iteration_count: row.try_get("iteration_count")?,
            max_iterations: row.try_get("max_iterations")?,
            files_total: row.try_get("files_total")?,
            error_message: row.try_get("error_message")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_summary(self) -> Result<WorkflowSummary, RepositoryError> {
        Ok(WorkflowSummary {
            workflow_id: parse_id(&self.id)?,
            status: parse_status(&self.status)?,
            goal: self.goal,
            iteration_count: self.iteration_count as u32,
            max_iterations: self.max_iterations as u32,
            files_total: self.files_total as usize,
            error_message: self.error_message,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct CheckpointRow {
    workflow_id: String,
    version: i64,
    status: String,
    iteration_count: i64,
    recorded_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            version: row.try_get("version")?,
            status: row.try_get("status")?,
            iteration_count: row.try_get("iteration_count")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_record(self) -> Result<CheckpointRecord, RepositoryError> {
        Ok(CheckpointRecord {
            workflow_id: parse_id(&self.workflow_id)?,
            version: self.version as u64,
            status: parse_status(&self.status)?,
            iteration_count: self.iteration_count as u32,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_id(s: &str) -> Result<WorkflowId, RepositoryError> {
    s.parse::<Uuid>()
        .map(WorkflowId::from_uuid)
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_status(s: &str) -> Result<WorkflowStatus, RepositoryError> {
    s.parse::<WorkflowStatus>()
        .map_err(|_| RepositoryError::Query(format!("invalid workflow status: {s}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::Query(format!("serialize workflow state: {e}")))?;
        let id = state.workflow_id.to_string();
        let updated_at = format_datetime(&state.updated_at);

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Stale writes (version not ahead of the stored one) update nothing.
        let result = sqlx::query(
            r#"INSERT INTO workflows
               (id, status, goal, iteration_count, max_iterations, files_total,
                error_message, state_json, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 iteration_count = excluded.iteration_count,
                 files_total = excluded.files_total,
                 error_message = excluded.error_message,
                 state_json = excluded.state_json,
                 version = excluded.version,
                 updated_at = excluded.updated_at
               WHERE excluded.version > workflows.version"#,
        )
        .bind(&id)
        .bind(state.status.as_str())
        .bind(&state.goal)
        .bind(state.iteration_count as i64)
        .bind(state.max_iterations as i64)
        .bind(state.files.len() as i64)
        .bind(&state.error_message)
        .bind(&state_json)
        .bind(state.version as i64)
        .bind(format_datetime(&state.created_at))
        .bind(&updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "workflow {id} already has a checkpoint at or beyond version {}",
                state.version
            )));
        }

        sqlx::query(
            r#"INSERT INTO workflow_checkpoints
               (workflow_id, version, status, iteration_count, state_json, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(state.version as i64)
        .bind(state.status.as_str())
        .bind(state.iteration_count as i64)
        .bind(&state_json)
        .bind(&updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowState>, RepositoryError> {
        let row = sqlx::query("SELECT state_json FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = StateRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_state()?))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowSummary>, RepositoryError> {
        const COLUMNS: &str = "id, status, goal, iteration_count, max_iterations, files_total, error_message, updated_at";

        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM workflows WHERE status = ? ORDER BY updated_at DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM workflows ORDER BY updated_at DESC"
                ))
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = SummaryRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            summaries.push(r.into_summary()?);
        }
        Ok(summaries)
    }

    async fn history(&self, id: &WorkflowId) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT workflow_id, version, status, iteration_count, recorded_at
               FROM workflow_checkpoints WHERE workflow_id = ? ORDER BY version ASC"#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let r =
                CheckpointRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(r.into_record()?);
        }
        Ok(records)
    }

    async fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> Result<Option<WorkflowState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state_json FROM workflow_checkpoints WHERE workflow_id = ? AND version = ?",
        )
        .bind(id.to_string())
        .bind(version as i64)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = StateRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_state()?))
            }
            None => Ok(None),
        }
    }
}
