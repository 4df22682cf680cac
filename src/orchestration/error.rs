use crate::orchestration::run_store::{RunStatus, StoreError};

/// Caller-facing precondition failures. Raised before any state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("objective must be non-empty")]
    EmptyObjective,
    #[error("invalid run id `{run_id}`: {reason}")]
    InvalidRunId { run_id: String, reason: String },
    #[error("workflow run `{run_id}` not found")]
    UnknownRun { run_id: String },
    #[error("workflow run `{run_id}` is not awaiting selection (status `{status}`)")]
    NotAwaitingSelection { run_id: String, status: RunStatus },
    #[error("workflow run `{run_id}` has no plan options to select from")]
    NoPlanOptions { run_id: String },
    #[error("selection {index} is out of range; run `{run_id}` has {len} options")]
    SelectionOutOfRange {
        run_id: String,
        index: usize,
        len: usize,
    },
    #[error("workflow run `{run_id}` is awaiting selection; use select instead")]
    AwaitingSelection { run_id: String },
    #[error("workflow run `{run_id}` already finished with status `{status}`")]
    AlreadyTerminal { run_id: String, status: RunStatus },
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("state store failed: {0}")]
    Store(#[from] StoreError),
    #[error("failed to generate run id: {0}")]
    RunId(String),
    #[error("workflow run `{run_id}` state transition `{from}` -> `{to}` is invalid")]
    InvalidRunTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },
}

impl OrchestratorError {
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}
