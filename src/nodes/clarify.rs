use super::{NodeContext, NodeError, TaskNode};
use crate::orchestration::routing::NodeId;
use crate::orchestration::state::WorkflowState;
use crate::provider::output_parse::parse_clarification;
use crate::provider::prompts::{self, clip};

/// Asks whether the objective is ambiguous. Informational only: the run
/// proceeds to research either way.
pub struct ClarifyNode;

impl TaskNode for ClarifyNode {
    fn id(&self) -> NodeId {
        NodeId::Clarify
    }

    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError> {
        state.log("Analyzing objective for clarification needs...");
        let reply = match ctx.reasoning.invoke(&prompts::clarification(&state.objective)) {
            Ok(reply) => reply,
            Err(err) => {
                state.clarification_needed = false;
                state.record_error(format!("Clarification error: {err}"));
                ctx.log_event("warn", "clarify.failed", &err.to_string());
                return Ok(());
            }
        };
        state.log(format!("Clarification analysis: {}...", clip(&reply, 200)));

        match parse_clarification(&reply) {
            None => {
                state.clarification_needed = false;
                state.clarifications.clear();
                state.mark_completed("clarification");
            }
            Some(questions) => {
                state.clarification_needed = true;
                state.log(format!("{} clarification question(s) noted", questions.len()));
                state.clarifications = questions;
                state.mark_completed("clarification_requested");
            }
        }
        Ok(())
    }
}
