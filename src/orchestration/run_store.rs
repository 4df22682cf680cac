use crate::orchestration::routing::NodeId;
use crate::orchestration::state::WorkflowState;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    AwaitingSelection,
    Executing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Running)
                | (RunStatus::Created, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Running)
                | (RunStatus::Running, RunStatus::AwaitingSelection)
                | (RunStatus::Running, RunStatus::Executing)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::AwaitingSelection, RunStatus::Running)
                | (RunStatus::AwaitingSelection, RunStatus::Failed)
                | (RunStatus::Executing, RunStatus::Executing)
                | (RunStatus::Executing, RunStatus::Completed)
                | (RunStatus::Executing, RunStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::AwaitingSelection => "awaiting_selection",
            RunStatus::Executing => "executing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "created" => Ok(RunStatus::Created),
            "running" => Ok(RunStatus::Running),
            "awaiting_selection" => Ok(RunStatus::AwaitingSelection),
            "executing" => Ok(RunStatus::Executing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub objective: String,
    pub status: RunStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Immutable snapshot written after a node (or execution step) completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub sequence: u64,
    /// Node whose completion produced this snapshot; `None` for the initial one.
    pub node: Option<NodeId>,
    pub status: RunStatus,
    pub next_node: Option<NodeId>,
    pub suspended: bool,
    pub state: WorkflowState,
    pub created_at: i64,
}

impl Checkpoint {
    pub fn initial(run_id: impl Into<String>, state: WorkflowState, now: i64) -> Self {
        Self {
            run_id: run_id.into(),
            sequence: 0,
            node: None,
            status: RunStatus::Created,
            next_node: Some(NodeId::Clarify),
            suspended: false,
            state,
            created_at: now,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create state directory {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("checkpoint json for run `{run_id}` failed: {source}")]
    Json {
        run_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("run `{run_id}` already exists")]
    DuplicateRun { run_id: String },
    #[error("run `{run_id}` not found")]
    UnknownRun { run_id: String },
    #[error("stale checkpoint for run `{run_id}`: expected sequence {expected}, got {actual}")]
    StaleCheckpoint {
        run_id: String,
        expected: u64,
        actual: u64,
    },
    #[error("invalid `{column}` value `{value}` in database")]
    Corrupt { column: String, value: String },
}

/// Durable record of workflow progress. Implementations must give per-run
/// atomicity: a checkpoint write either lands completely or not at all.
pub trait StateStore: Send + Sync {
    fn create_run(&self, record: &RunRecord, initial: &Checkpoint) -> Result<(), StoreError>;
    fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError>;
    fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, StoreError>;
    fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError>;
    fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError>;
}

/// SQLite-backed store: `runs` indexes the latest status per run, `checkpoints`
/// is the append-only log.
#[derive(Debug, Clone)]
pub struct SqliteRunStore {
    db_path: PathBuf,
}

impl SqliteRunStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    objective TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    latest_sequence INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS checkpoints (
                    run_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    node TEXT,
                    status TEXT NOT NULL,
                    next_node TEXT,
                    suspended INTEGER NOT NULL,
                    state_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (run_id, sequence)
                );

                CREATE INDEX IF NOT EXISTS idx_runs_updated
                    ON runs(updated_at DESC);
                ",
            )
            .map_err(|source| StoreError::Sql { source })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| StoreError::Sql { source })?;
        Ok(connection)
    }
}

impl StateStore for SqliteRunStore {
    fn create_run(&self, record: &RunRecord, initial: &Checkpoint) -> Result<(), StoreError> {
        let state_json = encode_state(&record.run_id, &initial.state)?;
        let mut connection = self.connect()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| StoreError::Sql { source })?;

        let inserted = tx
            .execute(
                "
                INSERT INTO runs (run_id, objective, status, created_at, updated_at, latest_sequence)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(run_id) DO NOTHING
                ",
                params![
                    record.run_id,
                    record.objective,
                    record.status.as_str(),
                    record.created_at,
                    record.updated_at,
                    initial.sequence as i64,
                ],
            )
            .map_err(|source| StoreError::Sql { source })?;
        if inserted == 0 {
            return Err(StoreError::DuplicateRun {
                run_id: record.run_id.clone(),
            });
        }
        insert_checkpoint_row(&tx, initial, &state_json)?;
        tx.commit().map_err(|source| StoreError::Sql { source })
    }

    fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let state_json = encode_state(&checkpoint.run_id, &checkpoint.state)?;
        let mut connection = self.connect()?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| StoreError::Sql { source })?;

        let latest: Option<i64> = tx
            .query_row(
                "SELECT latest_sequence FROM runs WHERE run_id = ?1",
                params![checkpoint.run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        let Some(latest) = latest else {
            return Err(StoreError::UnknownRun {
                run_id: checkpoint.run_id.clone(),
            });
        };
        let expected = latest as u64 + 1;
        if checkpoint.sequence != expected {
            return Err(StoreError::StaleCheckpoint {
                run_id: checkpoint.run_id.clone(),
                expected,
                actual: checkpoint.sequence,
            });
        }

        insert_checkpoint_row(&tx, checkpoint, &state_json)?;
        tx.execute(
            "
            UPDATE runs
            SET status = ?2, updated_at = ?3, latest_sequence = ?4
            WHERE run_id = ?1
            ",
            params![
                checkpoint.run_id,
                checkpoint.status.as_str(),
                checkpoint.created_at,
                checkpoint.sequence as i64,
            ],
        )
        .map_err(|source| StoreError::Sql { source })?;
        tx.commit().map_err(|source| StoreError::Sql { source })
    }

    fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "
                SELECT run_id, objective, status, created_at, updated_at
                FROM runs WHERE run_id = ?1
                ",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        row.map(run_record_from_row).transpose()
    }

    fn latest_checkpoint(&self, run_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                "
                SELECT run_id, sequence, node, status, next_node, suspended, state_json, created_at
                FROM checkpoints
                WHERE run_id = ?1
                ORDER BY sequence DESC
                LIMIT 1
                ",
                params![run_id],
                CheckpointRow::from_row,
            )
            .optional()
            .map_err(|source| StoreError::Sql { source })?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    fn list_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT run_id, sequence, node, status, next_node, suspended, state_json, created_at
                FROM checkpoints
                WHERE run_id = ?1
                ORDER BY sequence ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map(params![run_id], CheckpointRow::from_row)
            .map_err(|source| StoreError::Sql { source })?;

        let mut checkpoints = Vec::new();
        for row in rows {
            let row = row.map_err(|source| StoreError::Sql { source })?;
            checkpoints.push(row.into_checkpoint()?);
        }
        Ok(checkpoints)
    }

    fn list_runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT run_id, objective, status, created_at, updated_at
                FROM runs
                ORDER BY updated_at DESC, run_id ASC
                ",
            )
            .map_err(|source| StoreError::Sql { source })?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|source| StoreError::Sql { source })?;

        let mut runs = Vec::new();
        for row in rows {
            let row = row.map_err(|source| StoreError::Sql { source })?;
            runs.push(run_record_from_row(row)?);
        }
        Ok(runs)
    }
}

struct CheckpointRow {
    run_id: String,
    sequence: i64,
    node: Option<String>,
    status: String,
    next_node: Option<String>,
    suspended: i64,
    state_json: String,
    created_at: i64,
}

impl CheckpointRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            sequence: row.get(1)?,
            node: row.get(2)?,
            status: row.get(3)?,
            next_node: row.get(4)?,
            suspended: row.get(5)?,
            state_json: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, StoreError> {
        let state = serde_json::from_str(&self.state_json).map_err(|source| StoreError::Json {
            run_id: self.run_id.clone(),
            source,
        })?;
        Ok(Checkpoint {
            sequence: self.sequence as u64,
            node: parse_node_column("node", self.node)?,
            status: parse_status_column(&self.status)?,
            next_node: parse_node_column("next_node", self.next_node)?,
            suspended: self.suspended != 0,
            state,
            created_at: self.created_at,
            run_id: self.run_id,
        })
    }
}

fn insert_checkpoint_row(
    tx: &rusqlite::Transaction<'_>,
    checkpoint: &Checkpoint,
    state_json: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "
        INSERT INTO checkpoints (
            run_id, sequence, node, status, next_node, suspended, state_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            checkpoint.run_id,
            checkpoint.sequence as i64,
            checkpoint.node.map(NodeId::as_str),
            checkpoint.status.as_str(),
            checkpoint.next_node.map(NodeId::as_str),
            checkpoint.suspended as i64,
            state_json,
            checkpoint.created_at,
        ],
    )
    .map(|_| ())
    .map_err(|source| StoreError::Sql { source })
}

fn encode_state(run_id: &str, state: &WorkflowState) -> Result<String, StoreError> {
    serde_json::to_string(state).map_err(|source| StoreError::Json {
        run_id: run_id.to_string(),
        source,
    })
}

fn run_record_from_row(
    (run_id, objective, status, created_at, updated_at): (String, String, String, i64, i64),
) -> Result<RunRecord, StoreError> {
    Ok(RunRecord {
        run_id,
        objective,
        status: parse_status_column(&status)?,
        created_at,
        updated_at,
    })
}

fn parse_status_column(value: &str) -> Result<RunStatus, StoreError> {
    RunStatus::parse(value).map_err(|_| StoreError::Corrupt {
        column: "status".to_string(),
        value: value.to_string(),
    })
}

fn parse_node_column(column: &str, value: Option<String>) -> Result<Option<NodeId>, StoreError> {
    value
        .map(|raw| {
            NodeId::parse(&raw).map_err(|_| StoreError::Corrupt {
                column: column.to_string(),
                value: raw,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_the_state_machine() {
        assert!(RunStatus::Created.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::AwaitingSelection));
        assert!(RunStatus::AwaitingSelection.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Executing.can_transition_to(RunStatus::Executing));
        assert!(RunStatus::Executing.can_transition_to(RunStatus::Completed));

        assert!(!RunStatus::AwaitingSelection.can_transition_to(RunStatus::Executing));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Created.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            RunStatus::Created,
            RunStatus::Running,
            RunStatus::AwaitingSelection,
            RunStatus::Executing,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Ok(status));
            assert_eq!(
                serde_json::to_string(&status).expect("serialize"),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
