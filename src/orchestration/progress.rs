use crate::orchestration::run_store::{Checkpoint, RunStatus};
use crate::orchestration::state::PlanOption;
use serde::Serialize;

/// What a caller polling a run gets back: the options while the run waits on a
/// human, otherwise the status and the log trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PollView {
    Options {
        run_id: String,
        options: Vec<PlanOption>,
    },
    Status {
        run_id: String,
        status: RunStatus,
        logs: Vec<String>,
        errors: Vec<String>,
        completed_steps: Vec<String>,
    },
}

impl PollView {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        if checkpoint.status == RunStatus::AwaitingSelection {
            return Self::Options {
                run_id: checkpoint.run_id.clone(),
                options: checkpoint.state.plan_options.clone(),
            };
        }
        Self::Status {
            run_id: checkpoint.run_id.clone(),
            status: checkpoint.status,
            logs: checkpoint.state.logs.clone(),
            errors: checkpoint.state.errors.clone(),
            completed_steps: checkpoint.state.completed_steps.clone(),
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Self::Options { .. } => RunStatus::AwaitingSelection,
            Self::Status { status, .. } => *status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::routing::NodeId;
    use crate::orchestration::state::WorkflowState;

    fn checkpoint(status: RunStatus, state: WorkflowState) -> Checkpoint {
        Checkpoint {
            run_id: "run-1".to_string(),
            sequence: 4,
            node: Some(NodeId::GenerateOptions),
            status,
            next_node: Some(NodeId::AwaitSelection),
            suspended: status == RunStatus::AwaitingSelection,
            state,
            created_at: 10,
        }
    }

    #[test]
    fn awaiting_runs_expose_only_options() {
        let mut state = WorkflowState::new("x");
        state.plan_options.push(
            PlanOption::new("Rust", "fast", vec![], vec![], "medium").expect("option"),
        );
        state.log("ignored while waiting");

        let view = PollView::from_checkpoint(&checkpoint(RunStatus::AwaitingSelection, state));
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["options"][0]["tech_stack"], "Rust");
        assert!(json.get("logs").is_none());
        assert_eq!(view.status(), RunStatus::AwaitingSelection);
    }

    #[test]
    fn other_runs_expose_status_and_logs() {
        let mut state = WorkflowState::new("x");
        state.log("Research complete");
        let view = PollView::from_checkpoint(&checkpoint(RunStatus::Completed, state));
        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["logs"][0], "Research complete");
    }
}
