use crate::orchestration::state::WorkflowState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Clarify,
    Research,
    GenerateOptions,
    AwaitSelection,
    Execute,
}

impl NodeId {
    pub const ALL: [NodeId; 5] = [
        NodeId::Clarify,
        NodeId::Research,
        NodeId::GenerateOptions,
        NodeId::AwaitSelection,
        NodeId::Execute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Research => "research",
            Self::GenerateOptions => "generate_options",
            Self::AwaitSelection => "await_selection",
            Self::Execute => "execute",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|node| node.as_str() == raw)
            .ok_or_else(|| format!("unknown node `{raw}`"))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Next(NodeId),
    /// Stop advancing until an external selection arrives; the cursor points at `NodeId`.
    Suspend(NodeId),
    /// Re-enter the same node on the next drive.
    Repeat(NodeId),
    End,
}

/// Edge table of the workflow graph, evaluated after `completed` ran.
pub fn route_after(completed: NodeId, state: &WorkflowState) -> Route {
    match completed {
        NodeId::Clarify => Route::Next(NodeId::Research),
        NodeId::Research => Route::Next(NodeId::GenerateOptions),
        NodeId::GenerateOptions => {
            if should_wait_for_selection(state) {
                Route::Suspend(NodeId::AwaitSelection)
            } else {
                Route::Next(NodeId::Execute)
            }
        }
        NodeId::AwaitSelection => Route::Next(NodeId::Execute),
        NodeId::Execute => {
            if state.all_steps_terminal() && state.has_completed("execution") {
                Route::End
            } else {
                Route::Repeat(NodeId::Execute)
            }
        }
    }
}

pub fn should_wait_for_selection(state: &WorkflowState) -> bool {
    state.selected_plan.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::state::{ExecutionStep, PlanOption, StepStatus};

    fn option() -> PlanOption {
        PlanOption::new("Rust + clap", "fits", vec![], vec![], "low").expect("option")
    }

    #[test]
    fn linear_edges_before_the_fork() {
        let state = WorkflowState::new("x");
        assert_eq!(
            route_after(NodeId::Clarify, &state),
            Route::Next(NodeId::Research)
        );
        assert_eq!(
            route_after(NodeId::Research, &state),
            Route::Next(NodeId::GenerateOptions)
        );
    }

    #[test]
    fn fork_suspends_without_selection_and_skips_with_one() {
        let mut state = WorkflowState::new("x");
        state.plan_options = vec![option(), option(), option()];
        assert_eq!(
            route_after(NodeId::GenerateOptions, &state),
            Route::Suspend(NodeId::AwaitSelection)
        );

        state.selected_plan = Some(option());
        assert_eq!(
            route_after(NodeId::GenerateOptions, &state),
            Route::Next(NodeId::Execute)
        );
    }

    #[test]
    fn execute_repeats_until_every_step_is_terminal() {
        let mut state = WorkflowState::new("x");
        state.execution_steps.push(ExecutionStep::pending(1, "Run tests"));
        assert_eq!(
            route_after(NodeId::Execute, &state),
            Route::Repeat(NodeId::Execute)
        );

        state.execution_steps[0].status = StepStatus::Completed;
        state.mark_completed("execution");
        assert_eq!(route_after(NodeId::Execute, &state), Route::End);
    }

    #[test]
    fn node_names_round_trip() {
        for node in NodeId::ALL {
            assert_eq!(NodeId::parse(node.as_str()), Ok(node));
        }
        assert!(NodeId::parse("deploy").is_err());
    }
}
