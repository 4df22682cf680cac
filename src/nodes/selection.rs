use super::{NodeContext, NodeError, TaskNode};
use crate::orchestration::routing::NodeId;
use crate::orchestration::state::WorkflowState;

/// Runs once the human selection has been persisted; it only validates.
pub struct AwaitSelectionNode;

impl TaskNode for AwaitSelectionNode {
    fn id(&self) -> NodeId {
        NodeId::AwaitSelection
    }

    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError> {
        match state.selected_plan.as_ref() {
            Some(plan) => {
                let message = format!("Selected plan validated: {}", plan.tech_stack);
                state.log(message);
                state.mark_completed("human_selection");
            }
            None => {
                ctx.log_event("warn", "selection.missing", "no plan selected");
                state.log("warning: awaiting human selection but no plan is set");
                state.record_error("No plan selected");
            }
        }
        Ok(())
    }
}
