use crate::config::Settings;
use crate::nodes::{default_nodes, NodeContext, NodeError, TaskNode};
use crate::orchestration::error::{OrchestratorError, ValidationError};
use crate::orchestration::progress::PollView;
use crate::orchestration::routing::{route_after, NodeId, Route};
use crate::orchestration::run_store::{Checkpoint, RunRecord, RunStatus, StateStore, StoreError};
use crate::orchestration::state::WorkflowState;
use crate::provider::{ReasoningService, SearchService};
use crate::sandbox::SandboxManager;
use crate::shared::cancel::{CancelRegistry, CancelToken};
use crate::shared::ids::{generate_run_id, validate_run_id};
use crate::shared::logging::append_log;
use crate::shared::now_secs;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, TryLockError};

pub const RUN_CANCELED: &str = "run canceled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// No drive was in flight; the run is now `failed`.
    Canceled,
    /// A drive holds the run; it stops at the next step boundary.
    Requested,
}

/// Last persisted position of a run while a node is in flight.
struct Cursor {
    sequence: Cell<u64>,
    status: Cell<RunStatus>,
}

/// Durable state machine over the node graph. Every transition is written to
/// the injected store before the next node runs, so any process can pick a
/// run up from its latest checkpoint.
pub struct WorkflowEngine {
    store: Arc<dyn StateStore>,
    reasoning: Arc<dyn ReasoningService>,
    search: Arc<dyn SearchService>,
    sandbox: Arc<SandboxManager>,
    nodes: Vec<Box<dyn TaskNode>>,
    settings: Settings,
    cancels: CancelRegistry,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        reasoning: Arc<dyn ReasoningService>,
        search: Arc<dyn SearchService>,
        sandbox: Arc<SandboxManager>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            reasoning,
            search,
            sandbox,
            nodes: default_nodes(),
            settings,
            cancels: CancelRegistry::default(),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the node implementations; nodes are looked up by `TaskNode::id`.
    pub fn with_nodes(mut self, nodes: Vec<Box<dyn TaskNode>>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn start(&self, objective: &str) -> Result<String, OrchestratorError> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(ValidationError::EmptyObjective.into());
        }

        let now = now_secs();
        let run_id = generate_run_id(now).map_err(OrchestratorError::RunId)?;
        let record = RunRecord {
            run_id: run_id.clone(),
            objective: objective.to_string(),
            status: RunStatus::Created,
            created_at: now,
            updated_at: now,
        };
        let mut state = WorkflowState::new(objective);
        state.log(format!("Run created for objective: {objective}"));
        let initial = Checkpoint::initial(&run_id, state, now);
        self.store.create_run(&record, &initial)?;
        self.log(&run_id, "info", "run.started", objective);

        let lock = self.run_lock(&run_id);
        let _guard = lock.lock().unwrap_or_else(|err| err.into_inner());
        self.drive(&run_id)?;
        Ok(run_id)
    }

    /// Persists the human's choice for a suspended run and drives it onward.
    pub fn resume(&self, run_id: &str, selection: usize) -> Result<RunStatus, OrchestratorError> {
        check_run_id(run_id)?;
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().unwrap_or_else(|err| err.into_inner());

        let head = self.latest(run_id)?;
        if head.status != RunStatus::AwaitingSelection {
            return Err(ValidationError::NotAwaitingSelection {
                run_id: run_id.to_string(),
                status: head.status,
            }
            .into());
        }
        let options = &head.state.plan_options;
        if options.is_empty() {
            return Err(ValidationError::NoPlanOptions {
                run_id: run_id.to_string(),
            }
            .into());
        }
        let Some(choice) = options.get(selection).cloned() else {
            return Err(ValidationError::SelectionOutOfRange {
                run_id: run_id.to_string(),
                index: selection,
                len: options.len(),
            }
            .into());
        };

        let mut state = head.state.clone();
        state.log(format!(
            "Human selected option {}: {}",
            selection + 1,
            choice.tech_stack
        ));
        state.selected_plan = Some(choice);
        self.commit(
            run_id,
            head.sequence,
            head.status,
            state,
            None,
            RunStatus::Running,
            head.next_node.or(Some(NodeId::AwaitSelection)),
            false,
        )?;
        self.log(run_id, "info", "run.resumed", &format!("selection {selection}"));
        self.drive(run_id)
    }

    /// Continues a run that is mid-execution or was interrupted by a restart.
    pub fn advance(&self, run_id: &str) -> Result<RunStatus, OrchestratorError> {
        check_run_id(run_id)?;
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().unwrap_or_else(|err| err.into_inner());

        let head = self.latest(run_id)?;
        if head.status.is_terminal() {
            return Ok(head.status);
        }
        if head.status == RunStatus::AwaitingSelection {
            return Err(ValidationError::AwaitingSelection {
                run_id: run_id.to_string(),
            }
            .into());
        }
        self.drive(run_id)
    }

    pub fn cancel(&self, run_id: &str) -> Result<CancelOutcome, OrchestratorError> {
        check_run_id(run_id)?;
        let head = self.latest(run_id)?;
        if head.status.is_terminal() {
            return Err(ValidationError::AlreadyTerminal {
                run_id: run_id.to_string(),
                status: head.status,
            }
            .into());
        }

        self.cancels.cancel(run_id);
        self.log(run_id, "info", "run.cancel_requested", RUN_CANCELED);
        let lock = self.run_lock(run_id);
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(CancelOutcome::Requested),
        };

        let head = self.latest(run_id)?;
        if head.status.is_terminal() {
            self.finish_run(run_id);
            return Ok(CancelOutcome::Canceled);
        }
        let state = head.state.clone();
        self.fail(run_id, head.sequence, head.status, state, head.node, RUN_CANCELED)?;
        self.finish_run(run_id);
        Ok(CancelOutcome::Canceled)
    }

    pub fn get_snapshot(&self, run_id: &str) -> Result<WorkflowState, OrchestratorError> {
        check_run_id(run_id)?;
        Ok(self.latest(run_id)?.state)
    }

    pub fn poll(&self, run_id: &str) -> Result<PollView, OrchestratorError> {
        check_run_id(run_id)?;
        Ok(PollView::from_checkpoint(&self.latest(run_id)?))
    }

    pub fn run_record(&self, run_id: &str) -> Result<RunRecord, OrchestratorError> {
        check_run_id(run_id)?;
        self.store.load_run(run_id)?.ok_or_else(|| {
            ValidationError::UnknownRun {
                run_id: run_id.to_string(),
            }
            .into()
        })
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>, OrchestratorError> {
        Ok(self.store.list_runs()?)
    }

    pub fn checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, OrchestratorError> {
        check_run_id(run_id)?;
        let checkpoints = self.store.list_checkpoints(run_id)?;
        if checkpoints.is_empty() {
            return Err(ValidationError::UnknownRun {
                run_id: run_id.to_string(),
            }
            .into());
        }
        Ok(checkpoints)
    }

    fn latest(&self, run_id: &str) -> Result<Checkpoint, OrchestratorError> {
        self.store.latest_checkpoint(run_id)?.ok_or_else(|| {
            ValidationError::UnknownRun {
                run_id: run_id.to_string(),
            }
            .into()
        })
    }

    fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().unwrap_or_else(|err| err.into_inner());
        locks.entry(run_id.to_string()).or_default().clone()
    }

    /// Runs nodes from the persisted cursor until the run suspends, ends, or
    /// spends its execution pass budget. Caller holds the run lock.
    fn drive(&self, run_id: &str) -> Result<RunStatus, OrchestratorError> {
        let cancel = self.cancels.token(run_id);
        let mut head = self.latest(run_id)?;
        let mut execute_passes = 0usize;

        loop {
            if head.status.is_terminal() {
                self.finish_run(run_id);
                return Ok(head.status);
            }
            if cancel.is_cancelled() {
                let state = head.state.clone();
                head = self.fail(run_id, head.sequence, head.status, state, head.node, RUN_CANCELED)?;
                continue;
            }
            if head.suspended {
                self.finish_run(run_id);
                return Ok(head.status);
            }
            let Some(node_id) = head.next_node else {
                let state = head.state.clone();
                head = self.fail(
                    run_id,
                    head.sequence,
                    head.status,
                    state,
                    head.node,
                    "checkpoint has no next node",
                )?;
                continue;
            };
            if node_id == NodeId::Execute {
                if execute_passes >= self.settings.workflow.execution_passes_per_drive {
                    self.log(run_id, "info", "run.pass_budget", "execution pass budget spent");
                    return Ok(head.status);
                }
                execute_passes += 1;
            }
            head = self.run_node(run_id, head, node_id, &cancel)?;
        }
    }

    fn run_node(
        &self,
        run_id: &str,
        head: Checkpoint,
        node_id: NodeId,
        cancel: &CancelToken,
    ) -> Result<Checkpoint, OrchestratorError> {
        let cursor = Cursor {
            sequence: Cell::new(head.sequence),
            status: Cell::new(head.status),
        };
        let mut state = head.state;

        let Some(node) = self.nodes.iter().find(|node| node.id() == node_id) else {
            return self.fail(
                run_id,
                cursor.sequence.get(),
                cursor.status.get(),
                state,
                Some(node_id),
                &format!("no node registered for `{node_id}`"),
            );
        };

        let step_checkpoint = |snapshot: &WorkflowState| -> Result<(), StoreError> {
            let checkpoint = Checkpoint {
                run_id: run_id.to_string(),
                sequence: cursor.sequence.get() + 1,
                node: Some(node_id),
                status: RunStatus::Executing,
                next_node: Some(node_id),
                suspended: false,
                state: snapshot.clone(),
                created_at: now_secs(),
            };
            self.store.write_checkpoint(&checkpoint)?;
            cursor.sequence.set(checkpoint.sequence);
            cursor.status.set(checkpoint.status);
            Ok(())
        };
        let ctx = NodeContext {
            run_id,
            reasoning: self.reasoning.as_ref(),
            search: self.search.as_ref(),
            sandbox: self.sandbox.as_ref(),
            workflow: &self.settings.workflow,
            search_max_results: self.settings.search.max_results,
            cancel,
            state_root: &self.settings.state_root,
            checkpoint: &step_checkpoint,
        };

        self.log(run_id, "info", "node.started", node_id.as_str());
        let outcome = node.run(&ctx, &mut state);
        match outcome {
            Ok(()) => {
                let (status, next_node, suspended) = match route_after(node_id, &state) {
                    Route::Next(NodeId::Execute) | Route::Repeat(NodeId::Execute) => {
                        (RunStatus::Executing, Some(NodeId::Execute), false)
                    }
                    Route::Next(next) | Route::Repeat(next) => (RunStatus::Running, Some(next), false),
                    Route::Suspend(next) => (RunStatus::AwaitingSelection, Some(next), true),
                    Route::End => (RunStatus::Completed, None, false),
                };
                if suspended {
                    state.log("Awaiting human selection");
                }
                if status == RunStatus::Completed {
                    state.log("Workflow completed");
                }
                self.log(run_id, "info", "node.completed", node_id.as_str());
                self.commit(
                    run_id,
                    cursor.sequence.get(),
                    cursor.status.get(),
                    state,
                    Some(node_id),
                    status,
                    next_node,
                    suspended,
                )
            }
            Err(NodeError::Checkpoint(err)) => {
                self.log(run_id, "error", "node.checkpoint_failed", &err.to_string());
                Err(err.into())
            }
            Err(NodeError::Cancelled) => self.fail(
                run_id,
                cursor.sequence.get(),
                cursor.status.get(),
                state,
                Some(node_id),
                RUN_CANCELED,
            ),
            Err(err) => {
                let reason = format!("node `{node_id}` failed: {err}");
                state.record_error(reason.clone());
                self.fail(
                    run_id,
                    cursor.sequence.get(),
                    cursor.status.get(),
                    state,
                    Some(node_id),
                    &reason,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        run_id: &str,
        prev_sequence: u64,
        prev_status: RunStatus,
        state: WorkflowState,
        node: Option<NodeId>,
        status: RunStatus,
        next_node: Option<NodeId>,
        suspended: bool,
    ) -> Result<Checkpoint, OrchestratorError> {
        if !prev_status.can_transition_to(status) {
            return Err(OrchestratorError::InvalidRunTransition {
                run_id: run_id.to_string(),
                from: prev_status,
                to: status,
            });
        }
        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            sequence: prev_sequence + 1,
            node,
            status,
            next_node,
            suspended,
            state,
            created_at: now_secs(),
        };
        self.store.write_checkpoint(&checkpoint)?;
        Ok(checkpoint)
    }

    /// Moves the run to `failed`, keeping state and logs, and frees its sandbox.
    fn fail(
        &self,
        run_id: &str,
        prev_sequence: u64,
        prev_status: RunStatus,
        mut state: WorkflowState,
        node: Option<NodeId>,
        reason: &str,
    ) -> Result<Checkpoint, OrchestratorError> {
        if let Some(container_id) = state.container_ref.clone() {
            self.sandbox.restore(run_id, &container_id);
        }
        match self.sandbox.release_run(run_id) {
            Ok(()) => {
                if let Some(container_id) = state.container_ref.as_deref() {
                    state.log(format!("Sandbox released: {container_id}"));
                }
            }
            Err(err) => self.log(run_id, "warn", "sandbox.release_failed", &err.to_string()),
        }
        state.log(format!("Run failed: {reason}"));
        self.log(run_id, "error", "run.failed", reason);
        self.commit(
            run_id,
            prev_sequence,
            prev_status,
            state,
            node,
            RunStatus::Failed,
            None,
            false,
        )
    }

    /// Drops in-memory bookkeeping for a run that is terminal or parked at its
    /// suspension point. The lock entry stays while another caller is queued on
    /// it; the map and the caller's guard account for two references.
    fn finish_run(&self, run_id: &str) {
        self.cancels.forget(run_id);
        let mut locks = self.run_locks.lock().unwrap_or_else(|err| err.into_inner());
        if locks
            .get(run_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(run_id);
        }
    }

    /// Run ids that currently hold a lock or cancel token in this process.
    pub fn tracked_runs(&self) -> Vec<String> {
        let locks = self.run_locks.lock().unwrap_or_else(|err| err.into_inner());
        let mut runs: Vec<String> = locks.keys().cloned().collect();
        runs.extend(self.cancels.run_ids());
        runs.sort();
        runs.dedup();
        runs
    }

    fn log(&self, run_id: &str, level: &str, event: &str, message: &str) {
        append_log(&self.settings.state_root, level, event, Some(run_id), message);
    }
}

fn check_run_id(run_id: &str) -> Result<(), ValidationError> {
    validate_run_id(run_id).map_err(|reason| ValidationError::InvalidRunId {
        run_id: run_id.to_string(),
        reason,
    })
}
