use crate::nodes::NodeContext;
use crate::orchestration::retry::{run_with_retry, AttemptOutcome, RetryPolicy, RetryReport};
use crate::orchestration::state::{ExecutionStep, PlanOption, StepStatus, WorkflowState};
use crate::provider::output_parse::{
    first_backticked, parse_file_block, parse_shell_command, GeneratedFile,
};
use crate::provider::prompts;
use crate::sandbox::SandboxHandle;

pub const GENERIC_STEP_RESULT: &str = "Step completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    FileWrite,
    Command,
    Generic,
}

pub fn classify_step(action: &str) -> StepKind {
    let lowered = action.to_ascii_lowercase();
    if lowered.contains("create") && lowered.contains("file") {
        StepKind::FileWrite
    } else if lowered.contains("run") || lowered.contains("command") {
        StepKind::Command
    } else {
        StepKind::Generic
    }
}

/// Interpreter invocation for files the sandbox can execute directly.
pub fn script_command(relative_path: &str) -> Option<String> {
    let interpreter = match relative_path.rsplit_once('.')?.1 {
        "py" => "python3",
        "sh" => "sh",
        "js" => "node",
        _ => return None,
    };
    Some(format!("{interpreter} {}", shell_quote(relative_path)))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn placeholder_file(step: &ExecutionStep) -> GeneratedFile {
    GeneratedFile {
        path: format!("generated_file_{}.txt", step.step_number),
        content: format!(
            "# Generated content for step {}\n{}\n",
            step.step_number, step.action
        ),
    }
}

/// Executes `state.execution_steps[index]` through the retry executor and
/// folds its outcome back into the state.
pub fn execute_step(
    ctx: &NodeContext<'_>,
    handle: &SandboxHandle,
    plan: &PlanOption,
    state: &mut WorkflowState,
    index: usize,
) -> RetryReport {
    let mut step = state.execution_steps[index].clone();
    let preview: String = step.action.chars().take(50).collect();
    state.log(format!("Executing step {}: {preview}...", step.step_number));

    let policy = RetryPolicy::from_settings(ctx.workflow);
    let report = match classify_step(&step.action) {
        StepKind::FileWrite => run_file_step(ctx, handle, plan, state, &mut step, &policy),
        StepKind::Command => run_command_step(ctx, handle, state, &mut step, &policy),
        StepKind::Generic => {
            step.attempts = step.attempts.saturating_add(1);
            step.status = StepStatus::Completed;
            step.result = Some(GENERIC_STEP_RESULT.to_string());
            RetryReport {
                status: StepStatus::Completed,
                attempts: 1,
                cancelled: false,
                exhausted: None,
            }
        }
    };

    match (&report.status, &report.exhausted) {
        (StepStatus::Completed, _) => state.log(format!("Completed step {}", step.step_number)),
        (_, Some(exhausted)) => state.record_error(exhausted.to_string()),
        _ => state.log(format!("Step {} failed", step.step_number)),
    }
    ctx.log_event(
        if report.status == StepStatus::Completed {
            "info"
        } else {
            "warn"
        },
        "execute.step",
        &format!(
            "step {} {} after {} attempt(s)",
            step.step_number, report.status, report.attempts
        ),
    );
    state.execution_steps[index] = step;
    report
}

fn run_file_step(
    ctx: &NodeContext<'_>,
    handle: &SandboxHandle,
    plan: &PlanOption,
    state: &mut WorkflowState,
    step: &mut ExecutionStep,
    policy: &RetryPolicy,
) -> RetryReport {
    let file = match ctx
        .reasoning
        .invoke(&prompts::file_content(&state.objective, plan, step))
    {
        Ok(reply) => parse_file_block(&reply).unwrap_or_else(|| {
            state.log(format!(
                "Step {}: reply had no FILE block, using placeholder",
                step.step_number
            ));
            placeholder_file(step)
        }),
        Err(err) => {
            state.record_error(format!(
                "File content generation failed for step {}: {err}",
                step.step_number
            ));
            placeholder_file(step)
        }
    };

    let run = script_command(&file.path);
    let mut written: Option<String> = None;
    let timeout = ctx.sandbox.command_timeout();
    let report = run_with_retry(step, policy, ctx.cancel, |_| {
        let relative = match ctx.sandbox.write_file(handle, &file.path, &file.content) {
            Ok(relative) => relative,
            Err(err) => return AttemptOutcome::failed(format!("write failed: {err}")),
        };
        written = Some(relative.clone());
        let Some(command) = run.as_deref() else {
            return AttemptOutcome::succeeded(format!("Created {relative}"));
        };
        match ctx.sandbox.exec(handle, command, timeout, ctx.cancel) {
            Ok(output) if output.success() => AttemptOutcome::succeeded(format!(
                "Created {relative}; ran `{command}`: {}",
                output.summary()
            )),
            Ok(output) => AttemptOutcome::failed(format!(
                "Created {relative}; `{command}` failed: {}",
                output.summary()
            )),
            Err(err) => AttemptOutcome::failed(format!("Created {relative}; exec failed: {err}")),
        }
    });

    if let Some(relative) = written {
        state.log(format!("Created file: {relative}"));
        state.created_files.insert(relative);
    }
    if run.is_some() {
        step.command = run;
    }
    report
}

fn run_command_step(
    ctx: &NodeContext<'_>,
    handle: &SandboxHandle,
    state: &mut WorkflowState,
    step: &mut ExecutionStep,
    policy: &RetryPolicy,
) -> RetryReport {
    let command = resolve_command(ctx, state, step);
    step.command = Some(command.clone());

    let timeout = ctx.sandbox.command_timeout();
    let report = run_with_retry(step, policy, ctx.cancel, |_| {
        match ctx.sandbox.exec(handle, &command, timeout, ctx.cancel) {
            Ok(output) if output.success() => AttemptOutcome::succeeded(output.summary()),
            Ok(output) => AttemptOutcome::failed(output.summary()),
            Err(err) => AttemptOutcome::failed(format!("exec failed: {err}")),
        }
    });
    if let Some(result) = step.result.as_deref() {
        let preview: String = result.chars().take(100).collect();
        state.log(format!("Command result: {preview}"));
    }
    report
}

/// The step's own command, else a backticked span in the action, else one
/// asked from the reasoning service, else an echo of the action.
fn resolve_command(ctx: &NodeContext<'_>, state: &mut WorkflowState, step: &ExecutionStep) -> String {
    if let Some(command) = step.command.as_deref().filter(|c| !c.trim().is_empty()) {
        return command.to_string();
    }
    if let Some(command) = first_backticked(&step.action) {
        return command;
    }
    match ctx
        .reasoning
        .invoke(&prompts::shell_command(&state.objective, step))
    {
        Ok(reply) => {
            if let Some(command) = parse_shell_command(&reply) {
                return command;
            }
        }
        Err(err) => state.record_error(format!(
            "Command generation failed for step {}: {err}",
            step.step_number
        )),
    }
    format!("echo {}", shell_quote(&step.action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_steps_need_both_create_and_file() {
        assert_eq!(classify_step("Create file main.py"), StepKind::FileWrite);
        assert_eq!(classify_step("CREATE the config FILE"), StepKind::FileWrite);
        assert_eq!(classify_step("Create main.py"), StepKind::Generic);
        assert_eq!(classify_step("Write the config file"), StepKind::Generic);
        assert_eq!(classify_step("Run the test file"), StepKind::Command);
        assert_eq!(classify_step("Create and run tests"), StepKind::Command);
        assert_eq!(classify_step("Create project directory"), StepKind::Generic);
        assert_eq!(classify_step("Run `pytest`"), StepKind::Command);
        assert_eq!(classify_step("Execute command ls"), StepKind::Command);
        assert_eq!(classify_step("Review the design"), StepKind::Generic);
    }

    #[test]
    fn scripts_get_an_interpreter() {
        assert_eq!(
            script_command("src/app.py"),
            Some("python3 'src/app.py'".to_string())
        );
        assert_eq!(script_command("it's.sh"), Some(r"sh 'it'\''s.sh'".to_string()));
        assert_eq!(script_command("README.md"), None);
        assert_eq!(script_command("Makefile"), None);
    }

    #[test]
    fn placeholder_is_named_after_the_step() {
        let step = ExecutionStep::pending(4, "Create file for config");
        let file = placeholder_file(&step);
        assert_eq!(file.path, "generated_file_4.txt");
        assert!(file.content.contains("Create file for config"));
    }
}
