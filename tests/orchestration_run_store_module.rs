use planforge::orchestration::routing::NodeId;
use planforge::orchestration::{
    Checkpoint, RunRecord, RunStatus, SqliteRunStore, StateStore, StoreError, WorkflowState,
};
use tempfile::tempdir;

fn record(run_id: &str, updated_at: i64) -> RunRecord {
    RunRecord {
        run_id: run_id.to_string(),
        objective: "Build a CLI todo app".to_string(),
        status: RunStatus::Created,
        created_at: 10,
        updated_at,
    }
}

fn next(previous: &Checkpoint, status: RunStatus, node: NodeId, at: i64) -> Checkpoint {
    let mut state = previous.state.clone();
    state.log(format!("{node} done"));
    Checkpoint {
        run_id: previous.run_id.clone(),
        sequence: previous.sequence + 1,
        node: Some(node),
        status,
        next_node: None,
        suspended: false,
        state,
        created_at: at,
    }
}

#[test]
fn run_store_module_persists_runs_and_checkpoints() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteRunStore::open(&temp.path().join("nested/planforge.db")).expect("open");

    let initial = Checkpoint::initial("run-1", WorkflowState::new("Build a CLI todo app"), 10);
    store
        .create_run(&record("run-1", 10), &initial)
        .expect("create run");

    let clarified = next(&initial, RunStatus::Running, NodeId::Clarify, 11);
    store.write_checkpoint(&clarified).expect("write 1");

    let loaded = store.load_run("run-1").expect("load").expect("run exists");
    assert_eq!(loaded.status, RunStatus::Running);
    assert_eq!(loaded.updated_at, 11);
    assert_eq!(loaded.created_at, 10);

    let latest = store
        .latest_checkpoint("run-1")
        .expect("latest")
        .expect("checkpoint exists");
    assert_eq!(latest, clarified);

    let all = store.list_checkpoints("run-1").expect("list");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], initial);
    assert_eq!(all[0].next_node, Some(NodeId::Clarify));

    assert!(store.load_run("run-missing").expect("load").is_none());
    assert!(store
        .latest_checkpoint("run-missing")
        .expect("latest")
        .is_none());
}

#[test]
fn run_store_module_rejects_stale_and_skipped_sequences() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteRunStore::open(&temp.path().join("planforge.db")).expect("open");
    let initial = Checkpoint::initial("run-1", WorkflowState::new("x"), 10);
    store.create_run(&record("run-1", 10), &initial).expect("create");

    let first = next(&initial, RunStatus::Running, NodeId::Clarify, 11);
    store.write_checkpoint(&first).expect("first write");

    let err = store.write_checkpoint(&first).expect_err("replayed sequence");
    assert!(matches!(
        err,
        StoreError::StaleCheckpoint {
            expected: 2,
            actual: 1,
            ..
        }
    ));

    let mut skipped = next(&first, RunStatus::Running, NodeId::Research, 12);
    skipped.sequence = 5;
    let err = store.write_checkpoint(&skipped).expect_err("gap");
    assert!(matches!(err, StoreError::StaleCheckpoint { expected: 2, .. }));

    assert_eq!(store.list_checkpoints("run-1").expect("list").len(), 2);
    assert_eq!(
        store.load_run("run-1").expect("load").expect("run").status,
        RunStatus::Running
    );
}

#[test]
fn run_store_module_rejects_duplicates_and_unknown_runs() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteRunStore::open(&temp.path().join("planforge.db")).expect("open");
    let initial = Checkpoint::initial("run-1", WorkflowState::new("x"), 10);
    store.create_run(&record("run-1", 10), &initial).expect("create");

    let err = store
        .create_run(&record("run-1", 10), &initial)
        .expect_err("duplicate");
    assert!(matches!(err, StoreError::DuplicateRun { .. }));

    let orphan = Checkpoint::initial("run-2", WorkflowState::new("x"), 10);
    let err = store
        .write_checkpoint(&next(&orphan, RunStatus::Running, NodeId::Clarify, 11))
        .expect_err("unknown run");
    assert!(matches!(err, StoreError::UnknownRun { .. }));
}

#[test]
fn run_store_module_lists_runs_most_recent_first_and_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("planforge.db");
    {
        let store = SqliteRunStore::open(&db_path).expect("open");
        for (run_id, updated_at) in [("run-a", 30), ("run-b", 50), ("run-c", 40)] {
            let initial = Checkpoint::initial(run_id, WorkflowState::new("x"), 10);
            store
                .create_run(&record(run_id, updated_at), &initial)
                .expect("create");
        }
    }

    let reopened = SqliteRunStore::open(&db_path).expect("reopen");
    let ids: Vec<_> = reopened
        .list_runs()
        .expect("list")
        .into_iter()
        .map(|run| run.run_id)
        .collect();
    assert_eq!(ids, vec!["run-b", "run-c", "run-a"]);
}

#[test]
fn run_store_module_round_trips_full_state() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteRunStore::open(&temp.path().join("planforge.db")).expect("open");
    let mut state = WorkflowState::new("Build a CLI todo app");
    state.created_files.insert("todo.py".to_string());
    state.container_ref = Some("ctr-1".to_string());
    state.record_error("Search error for 'x': HTTP 401");
    let initial = Checkpoint::initial("run-1", state, 10);
    store.create_run(&record("run-1", 10), &initial).expect("create");

    let mut suspended = next(&initial, RunStatus::Running, NodeId::Clarify, 11);
    suspended.status = RunStatus::AwaitingSelection;
    suspended.next_node = Some(NodeId::AwaitSelection);
    suspended.suspended = true;
    store.write_checkpoint(&suspended).expect("write");

    let latest = store
        .latest_checkpoint("run-1")
        .expect("latest")
        .expect("checkpoint");
    assert!(latest.suspended);
    assert_eq!(latest.next_node, Some(NodeId::AwaitSelection));
    assert_eq!(latest.state, suspended.state);
}
