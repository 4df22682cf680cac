use crate::orchestration::{CancelOutcome, WorkflowEngine};
use serde::Serialize;
use serde_json::json;

fn single_run_id<'a>(args: &'a [String], usage: &str) -> Result<&'a str, String> {
    match args {
        [run_id] => Ok(run_id.as_str()),
        _ => Err(format!("usage: {usage}")),
    }
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode {what}: {e}"))
}

pub fn cmd_start(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let objective = args.join(" ");
    if objective.trim().is_empty() {
        return Err("usage: start <objective...>".to_string());
    }
    let run_id = engine.start(&objective).map_err(|e| e.to_string())?;
    let record = engine.run_record(&run_id).map_err(|e| e.to_string())?;
    Ok(format!("run_id={run_id} status={}", record.status))
}

pub fn cmd_poll(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "poll <run_id>")?;
    let view = engine.poll(run_id).map_err(|e| e.to_string())?;
    to_json(&view, "poll view")
}

pub fn cmd_select(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let [run_id, index] = args else {
        return Err("usage: select <run_id> <option_index>".to_string());
    };
    let index: usize = index
        .parse()
        .map_err(|_| format!("option_index must be a non-negative integer, got `{index}`"))?;
    let status = engine.resume(run_id, index).map_err(|e| e.to_string())?;
    to_json(
        &json!({
            "status": "resumed",
            "run_id": run_id,
            "selected": index,
            "run_status": status,
        }),
        "selection result",
    )
}

pub fn cmd_advance(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "advance <run_id>")?;
    let status = engine.advance(run_id).map_err(|e| e.to_string())?;
    Ok(format!("run_id={run_id} status={status}"))
}

pub fn cmd_cancel(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "cancel <run_id>")?;
    let outcome = engine.cancel(run_id).map_err(|e| e.to_string())?;
    Ok(match outcome {
        CancelOutcome::Canceled => format!("run canceled\nrun_id={run_id}\nstatus=failed"),
        CancelOutcome::Requested => format!("cancel requested\nrun_id={run_id}"),
    })
}

pub fn cmd_show(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "show <run_id>")?;
    let state = engine.get_snapshot(run_id).map_err(|e| e.to_string())?;
    to_json(&state, "workflow state")
}

pub fn cmd_runs(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: runs".to_string());
    }
    let runs = engine.list_runs().map_err(|e| e.to_string())?;
    if runs.is_empty() {
        return Ok("no runs".to_string());
    }
    Ok(runs
        .iter()
        .map(|run| format!("{}\t{}\t{}", run.run_id, run.status, run.objective))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn cmd_checkpoints(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "checkpoints <run_id>")?;
    let checkpoints = engine.checkpoints(run_id).map_err(|e| e.to_string())?;
    Ok(checkpoints
        .iter()
        .map(|checkpoint| {
            format!(
                "{}\t{}\tnode={}\tnext={}{}",
                checkpoint.sequence,
                checkpoint.status,
                checkpoint.node.map(|n| n.as_str()).unwrap_or("-"),
                checkpoint.next_node.map(|n| n.as_str()).unwrap_or("-"),
                if checkpoint.suspended { "\tsuspended" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}
