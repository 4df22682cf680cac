use super::{NodeContext, NodeError, TaskNode};
use crate::orchestration::routing::NodeId;
use crate::orchestration::state::{ExecutionStep, StepStatus, WorkflowState};
use crate::orchestration::step_execution::execute_step;
use crate::provider::output_parse::parse_plan_steps;
use crate::provider::prompts;

/// Executes the selected plan a bounded number of steps per entry. The engine
/// re-enters it until every step is terminal.
pub struct ExecuteNode;

/// Plan used when the reasoning service yields no parsable steps.
pub fn fallback_plan() -> Vec<ExecutionStep> {
    vec![
        ExecutionStep::pending(1, "Create file README.md describing the selected plan"),
        ExecutionStep::pending(2, "Run command `ls -la` to verify the workspace"),
    ]
}

impl TaskNode for ExecuteNode {
    fn id(&self) -> NodeId {
        NodeId::Execute
    }

    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError> {
        let plan = state
            .selected_plan
            .clone()
            .ok_or(NodeError::MissingSelection)?;

        if state.execution_steps.is_empty() && !state.has_completed("execution") {
            state.log("Generating execution plan...");
            let prompt = prompts::execution_plan(
                &state.objective,
                &plan,
                ctx.workflow.max_execution_steps,
            );
            let mut steps = match ctx.reasoning.invoke(&prompt) {
                Ok(reply) => parse_plan_steps(&reply, ctx.workflow.max_execution_steps),
                Err(err) => {
                    state.record_error(format!("Execution plan generation failed: {err}"));
                    Vec::new()
                }
            };
            if steps.is_empty() {
                state.log("Using fallback execution plan");
                steps = fallback_plan();
                steps.truncate(ctx.workflow.max_execution_steps);
            }
            state.log(format!("Created execution plan with {} steps", steps.len()));
            state.execution_steps = steps;
            state.current_step_index = 0;
            (ctx.checkpoint)(state)?;
        }

        if state.next_open_step().is_some() {
            if ctx.cancel.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            if let Some(container_id) = state.container_ref.clone() {
                ctx.sandbox.restore(ctx.run_id, &container_id);
            }
            let handle = match ctx.sandbox.acquire(ctx.run_id) {
                Ok(handle) => handle,
                Err(err) => {
                    ctx.log_event("error", "sandbox.unavailable", &err.to_string());
                    state.record_error(format!("Sandbox unavailable: {err}"));
                    for step in state
                        .execution_steps
                        .iter_mut()
                        .filter(|step| !step.status.is_terminal())
                    {
                        step.status = StepStatus::Failed;
                        step.result = Some(format!("Sandbox unavailable: {err}"));
                    }
                    state.container_ref = None;
                    finish(state);
                    return Ok(());
                }
            };
            if state.container_ref.as_deref() != Some(handle.container_id.as_str()) {
                state.log(format!("Sandbox ready: {}", handle.container_id));
                state.container_ref = Some(handle.container_id.clone());
            }

            for _ in 0..ctx.workflow.steps_per_pass {
                let Some(index) = state.next_open_step() else {
                    break;
                };
                if ctx.cancel.is_cancelled() {
                    return Err(NodeError::Cancelled);
                }
                state.current_step_index = index;
                let report = execute_step(ctx, &handle, &plan, state, index);
                state.current_step_index = index + 1;
                (ctx.checkpoint)(state)?;
                if report.cancelled {
                    return Err(NodeError::Cancelled);
                }
            }
        }

        if state.all_steps_terminal() && !state.has_completed("execution") {
            finish(state);
            match ctx.sandbox.release_run(ctx.run_id) {
                Ok(()) => {
                    if let Some(container_id) = state.container_ref.as_deref() {
                        state.log(format!("Sandbox released: {container_id}"));
                    }
                }
                Err(err) => ctx.log_event("warn", "sandbox.release_failed", &err.to_string()),
            }
        }
        Ok(())
    }
}

fn finish(state: &mut WorkflowState) {
    let succeeded = state
        .execution_steps
        .iter()
        .filter(|step| step.status == StepStatus::Completed)
        .count();
    state.log(format!(
        "Execution completed: {succeeded}/{} steps succeeded",
        state.execution_steps.len()
    ));
    state.current_step_index = state.execution_steps.len();
    state.mark_completed("execution");
}
