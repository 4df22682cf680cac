use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::config::{load_settings, Settings};
use crate::orchestration::run_store::SqliteRunStore;
use crate::orchestration::WorkflowEngine;
use crate::provider::{build_reasoning, build_search};
use crate::sandbox::{DockerCli, SandboxManager};
use std::sync::Arc;

pub mod runs;

/// Wires the production collaborators: SQLite store, configured reasoning and
/// search adapters, and the docker CLI sandbox runtime.
pub fn build_engine(settings: Settings) -> Result<WorkflowEngine, String> {
    let store = SqliteRunStore::open(&settings.database_path()).map_err(|e| e.to_string())?;
    let reasoning = build_reasoning(&settings);
    let search = build_search(&settings);
    let sandbox = SandboxManager::new(
        Arc::new(DockerCli::new(settings.sandbox.docker_binary.clone())),
        settings.sandbox.clone(),
        settings.resolve_workspace_root(),
    );
    Ok(WorkflowEngine::new(
        Arc::new(store),
        reasoning,
        search,
        Arc::new(sandbox),
        settings,
    ))
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }
    if matches!(parse_cli_verb(&args[0]), CliVerb::Help) {
        return Ok(help_text());
    }
    if matches!(parse_cli_verb(&args[0]), CliVerb::Unknown) {
        return Err(format!("unknown command `{}`", args[0]));
    }

    let settings = load_settings().map_err(|e| e.to_string())?;
    let engine = build_engine(settings)?;
    execute_command(&engine, &args)
}

/// Dispatches one CLI invocation against an already built engine.
pub fn execute_command(engine: &WorkflowEngine, args: &[String]) -> Result<String, String> {
    let Some(verb) = args.first() else {
        return Ok(help_text());
    };
    let rest = &args[1..];
    match parse_cli_verb(verb) {
        CliVerb::Start => runs::cmd_start(engine, rest),
        CliVerb::Poll => runs::cmd_poll(engine, rest),
        CliVerb::Select => runs::cmd_select(engine, rest),
        CliVerb::Advance => runs::cmd_advance(engine, rest),
        CliVerb::Cancel => runs::cmd_cancel(engine, rest),
        CliVerb::Show => runs::cmd_show(engine, rest),
        CliVerb::Runs => runs::cmd_runs(engine, rest),
        CliVerb::Checkpoints => runs::cmd_checkpoints(engine, rest),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{verb}`")),
    }
}
