pub mod error;
pub mod progress;
pub mod retry;
pub mod routing;
pub mod run_store;
pub mod state;
pub mod step_execution;
pub mod workflow_engine;

pub use error::{OrchestratorError, ValidationError};
pub use progress::PollView;
pub use run_store::{Checkpoint, RunRecord, RunStatus, SqliteRunStore, StateStore, StoreError};
pub use state::WorkflowState;
pub use workflow_engine::{CancelOutcome, WorkflowEngine};
