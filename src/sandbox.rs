use crate::config::SandboxSettings;
use crate::shared::cancel::CancelToken;
use crate::shared::fs_atomic::atomic_write_file;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub mod docker;
pub mod runtime;
pub mod workspace;

pub use docker::DockerCli;
pub use runtime::{ContainerSpec, ExecOutput, SandboxRuntime};
pub use workspace::{
    ensure_no_link_escape, resolve_in_workspace, workspace_dir_name, workspace_path,
};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("container runtime binary `{binary}` not found")]
    MissingBinary { binary: String },
    #[error("failed to create sandbox `{name}`: {reason}")]
    Create { name: String, reason: String },
    #[error("container `{container_id}` {action} failed: {reason}")]
    Command {
        action: String,
        container_id: String,
        reason: String,
    },
    #[error("workspace path `{path}` rejected: {reason}")]
    WorkspacePath { path: String, reason: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> SandboxError {
    SandboxError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub run_id: String,
    pub container_id: String,
    pub workspace: PathBuf,
    pub workdir: String,
}

type Slot = Arc<Mutex<Option<SandboxHandle>>>;

/// Owns at most one container per run id. Every operation on a run goes
/// through that run's slot lock, so concurrent callers for the same run share
/// one container while other runs proceed independently.
pub struct SandboxManager {
    runtime: Arc<dyn SandboxRuntime>,
    settings: SandboxSettings,
    workspace_root: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SandboxManager {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        settings: SandboxSettings,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            runtime,
            settings,
            workspace_root,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace_path(&self, run_id: &str) -> PathBuf {
        workspace_path(&self.workspace_root, run_id)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_seconds)
    }

    fn slot(&self, run_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        slots.entry(run_id.to_string()).or_default().clone()
    }

    /// Returns the run's live sandbox, restarting a stopped one, and creates a
    /// fresh container only when none can be revived.
    pub fn acquire(&self, run_id: &str) -> Result<SandboxHandle, SandboxError> {
        let slot = self.slot(run_id);
        let mut current = slot.lock().unwrap_or_else(|err| err.into_inner());

        if let Some(handle) = current.as_ref() {
            if self.revive(&handle.container_id) {
                return Ok(handle.clone());
            }
            let _ = self.runtime.stop(&handle.container_id);
            *current = None;
        }

        let workspace = self.workspace_path(run_id);
        fs::create_dir_all(&workspace).map_err(|err| io_error(&workspace, err))?;
        let spec = ContainerSpec {
            name: format!(
                "{}-{}",
                self.settings.container_prefix,
                workspace_dir_name(run_id)
            ),
            image: self.settings.image.clone(),
            host_workspace: workspace.clone(),
            workdir: self.settings.container_workdir.clone(),
        };
        let container_id = self.runtime.create(&spec)?;
        let handle = SandboxHandle {
            run_id: run_id.to_string(),
            container_id,
            workspace,
            workdir: spec.workdir,
        };
        *current = Some(handle.clone());
        Ok(handle)
    }

    fn revive(&self, container_id: &str) -> bool {
        match self.runtime.is_running(container_id) {
            Ok(true) => true,
            Ok(false) => {
                self.runtime.start(container_id).is_ok()
                    && self.runtime.is_running(container_id).unwrap_or(false)
            }
            Err(_) => false,
        }
    }

    /// Re-registers a container recorded in a checkpoint, typically after a
    /// process restart. A slot that already holds a handle is left alone.
    pub fn restore(&self, run_id: &str, container_id: &str) {
        let slot = self.slot(run_id);
        let mut current = slot.lock().unwrap_or_else(|err| err.into_inner());
        if current.is_none() {
            *current = Some(SandboxHandle {
                run_id: run_id.to_string(),
                container_id: container_id.to_string(),
                workspace: self.workspace_path(run_id),
                workdir: self.settings.container_workdir.clone(),
            });
        }
    }

    pub fn exec(
        &self,
        handle: &SandboxHandle,
        command: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ExecOutput, SandboxError> {
        self.runtime
            .exec(&handle.container_id, command, &handle.workdir, timeout, cancel)
    }

    /// Writes `content` at `relative_path` inside the run workspace and returns
    /// the normalized relative path.
    pub fn write_file(
        &self,
        handle: &SandboxHandle,
        relative_path: &str,
        content: &str,
    ) -> Result<String, SandboxError> {
        let target = resolve_in_workspace(&handle.workspace, relative_path)?;
        ensure_no_link_escape(&handle.workspace, &target, relative_path)?;
        atomic_write_file(&target, content.as_bytes()).map_err(|err| io_error(&target, err))?;
        let relative = target
            .strip_prefix(&handle.workspace)
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| relative_path.trim().to_string());
        Ok(relative)
    }

    pub fn release(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.release_run(&handle.run_id)
    }

    /// Stops the run's container if the manager knows one. Unknown runs are a no-op.
    pub fn release_run(&self, run_id: &str) -> Result<(), SandboxError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
            slots.remove(run_id)
        };
        let Some(slot) = slot else {
            return Ok(());
        };
        let handle = slot.lock().unwrap_or_else(|err| err.into_inner()).take();
        match handle {
            Some(handle) => self.runtime.stop(&handle.container_id),
            None => Ok(()),
        }
    }

    pub fn active_runs(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        let mut runs: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| {
                slot.lock()
                    .unwrap_or_else(|err| err.into_inner())
                    .is_some()
            })
            .map(|(run_id, _)| run_id.clone())
            .collect();
        runs.sort();
        runs
    }
}
