use planforge::config::SandboxSettings;
use planforge::sandbox::{
    ContainerSpec, ExecOutput, SandboxError, SandboxManager, SandboxRuntime,
};
use planforge::shared::cancel::CancelToken;
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[derive(Default)]
struct CountingRuntime {
    created: Mutex<Vec<ContainerSpec>>,
    running: Mutex<HashSet<String>>,
    starts: Mutex<Vec<String>>,
    stops: Mutex<Vec<String>>,
    refuse_start: bool,
}

impl SandboxRuntime for CountingRuntime {
    fn create(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        thread::sleep(Duration::from_millis(20));
        let mut created = self.created.lock().expect("created");
        created.push(spec.clone());
        let id = format!("ctr-{}", created.len());
        self.running.lock().expect("running").insert(id.clone());
        Ok(id)
    }

    fn is_running(&self, container_id: &str) -> Result<bool, SandboxError> {
        Ok(self.running.lock().expect("running").contains(container_id))
    }

    fn start(&self, container_id: &str) -> Result<(), SandboxError> {
        self.starts.lock().expect("starts").push(container_id.to_string());
        if self.refuse_start {
            return Err(SandboxError::Command {
                action: "start".to_string(),
                container_id: container_id.to_string(),
                reason: "container was removed".to_string(),
            });
        }
        self.running
            .lock()
            .expect("running")
            .insert(container_id.to_string());
        Ok(())
    }

    fn exec(
        &self,
        _container_id: &str,
        command: &str,
        _workdir: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<ExecOutput, SandboxError> {
        Ok(ExecOutput {
            stdout: command.to_string(),
            exit_code: Some(0),
            ..ExecOutput::default()
        })
    }

    fn stop(&self, container_id: &str) -> Result<(), SandboxError> {
        self.running.lock().expect("running").remove(container_id);
        self.stops.lock().expect("stops").push(container_id.to_string());
        Ok(())
    }
}

impl CountingRuntime {
    fn kill(&self, container_id: &str) {
        self.running.lock().expect("running").remove(container_id);
    }
}

fn manager(runtime: Arc<CountingRuntime>, root: &std::path::Path) -> SandboxManager {
    SandboxManager::new(runtime, SandboxSettings::default(), root.join("workspaces"))
}

#[test]
fn sandbox_module_concurrent_acquires_share_one_container() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    let sandbox = Arc::new(manager(runtime.clone(), temp.path()));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sandbox = sandbox.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                sandbox.acquire("run-shared").expect("acquire")
            })
        })
        .collect();
    let ids: HashSet<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread").container_id)
        .collect();

    assert_eq!(ids.len(), 1);
    assert_eq!(runtime.created.lock().expect("created").len(), 1);
    assert_eq!(sandbox.active_runs(), vec!["run-shared".to_string()]);
}

#[test]
fn sandbox_module_runs_get_distinct_workspaces_and_names() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    let sandbox = manager(runtime.clone(), temp.path());

    let first = sandbox.acquire("run-a").expect("acquire a");
    let second = sandbox.acquire("run-b").expect("acquire b");
    assert_ne!(first.container_id, second.container_id);
    assert_ne!(first.workspace, second.workspace);
    assert!(first.workspace.is_dir());
    assert_eq!(first.workdir, "/workspace");

    let created = runtime.created.lock().expect("created");
    assert!(created[0].name.starts_with("planforge-run-a-"));
    assert_eq!(created[0].image, "python:3.11-slim");
    assert_eq!(created[0].host_workspace, first.workspace);
}

#[test]
fn sandbox_module_restarts_a_stopped_container() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    let sandbox = manager(runtime.clone(), temp.path());

    let handle = sandbox.acquire("run-a").expect("acquire");
    runtime.kill(&handle.container_id);
    let again = sandbox.acquire("run-a").expect("acquire after stop");

    assert_eq!(again.container_id, handle.container_id);
    assert_eq!(*runtime.starts.lock().expect("starts"), vec!["ctr-1".to_string()]);
    assert_eq!(runtime.created.lock().expect("created").len(), 1);
}

#[test]
fn sandbox_module_replaces_a_container_that_cannot_be_revived() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime {
        refuse_start: true,
        ..CountingRuntime::default()
    });
    let sandbox = manager(runtime.clone(), temp.path());

    let handle = sandbox.acquire("run-a").expect("acquire");
    runtime.kill(&handle.container_id);
    let replacement = sandbox.acquire("run-a").expect("replacement");

    assert_eq!(replacement.container_id, "ctr-2");
    assert_eq!(replacement.workspace, handle.workspace);
    assert_eq!(*runtime.stops.lock().expect("stops"), vec!["ctr-1".to_string()]);
}

#[test]
fn sandbox_module_restore_adopts_a_recorded_container() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    runtime
        .running
        .lock()
        .expect("running")
        .insert("ctr-from-checkpoint".to_string());
    let sandbox = manager(runtime.clone(), temp.path());

    sandbox.restore("run-a", "ctr-from-checkpoint");
    let handle = sandbox.acquire("run-a").expect("acquire");
    assert_eq!(handle.container_id, "ctr-from-checkpoint");
    assert_eq!(handle.workspace, sandbox.workspace_path("run-a"));
    assert!(runtime.created.lock().expect("created").is_empty());

    sandbox.release_run("run-a").expect("release");
    assert_eq!(
        *runtime.stops.lock().expect("stops"),
        vec!["ctr-from-checkpoint".to_string()]
    );
    assert!(sandbox.active_runs().is_empty());
    sandbox.release_run("run-a").expect("second release is a no-op");
}

#[test]
fn sandbox_module_write_file_stays_inside_the_workspace() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    let sandbox = manager(runtime, temp.path());
    let handle = sandbox.acquire("run-a").expect("acquire");

    let relative = sandbox
        .write_file(&handle, "./src/app.py", "print('hi')\n")
        .expect("write");
    assert_eq!(relative, "src/app.py");
    assert_eq!(
        std::fs::read_to_string(handle.workspace.join("src/app.py")).expect("read"),
        "print('hi')\n"
    );

    for bad in ["../escape.txt", "/etc/passwd", "  ", "src/../../x"] {
        let err = sandbox
            .write_file(&handle, bad, "nope")
            .expect_err("rejected path");
        assert!(matches!(err, SandboxError::WorkspacePath { .. }), "{bad}");
    }
    assert!(!temp.path().join("workspaces/escape.txt").exists());

    let output = sandbox
        .exec(&handle, "ls", sandbox.command_timeout(), &CancelToken::new())
        .expect("exec");
    assert!(output.success());
    assert_eq!(output.summary(), "ls");
}

#[cfg(unix)]
#[test]
fn sandbox_module_write_file_refuses_to_follow_planted_symlinks() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(CountingRuntime::default());
    let sandbox = manager(runtime, temp.path());
    let handle = sandbox.acquire("run-a").expect("acquire");
    let outside = temp.path().join("outside");
    std::fs::create_dir_all(&outside).expect("outside dir");
    std::fs::write(outside.join("secret.txt"), "keep").expect("secret");

    std::os::unix::fs::symlink(&outside, handle.workspace.join("src")).expect("dir link");
    let err = sandbox
        .write_file(&handle, "src/pwned.txt", "nope")
        .expect_err("symlinked directory");
    assert!(matches!(err, SandboxError::WorkspacePath { .. }), "{err}");
    assert!(!outside.join("pwned.txt").exists());

    std::os::unix::fs::symlink(outside.join("secret.txt"), handle.workspace.join("notes.txt"))
        .expect("file link");
    let err = sandbox
        .write_file(&handle, "notes.txt", "overwritten")
        .expect_err("symlinked file");
    assert!(matches!(err, SandboxError::WorkspacePath { .. }), "{err}");
    assert_eq!(
        std::fs::read_to_string(outside.join("secret.txt")).expect("read secret"),
        "keep"
    );

    sandbox
        .write_file(&handle, "app/main.py", "print('ok')\n")
        .expect("regular write still works");
}
