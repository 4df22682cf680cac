use super::SandboxError;
use crate::shared::cancel::CancelToken;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub host_workspace: PathBuf,
    pub workdir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }

    /// One-line description used as a step result.
    pub fn summary(&self) -> String {
        if self.cancelled {
            return "command canceled".to_string();
        }
        if self.timed_out {
            return "command timed out".to_string();
        }
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match self.exit_code {
            Some(0) if stdout.is_empty() => "exit 0".to_string(),
            Some(0) => stdout.to_string(),
            Some(code) if stderr.is_empty() => format!("exit {code}: {stdout}"),
            Some(code) => format!("exit {code}: {stderr}"),
            None => format!("terminated by signal: {stderr}"),
        }
    }
}

/// Container lifecycle operations the sandbox manager relies on.
pub trait SandboxRuntime: Send + Sync {
    /// Creates and starts a long-lived container; returns its id.
    fn create(&self, spec: &ContainerSpec) -> Result<String, SandboxError>;
    fn is_running(&self, container_id: &str) -> Result<bool, SandboxError>;
    fn start(&self, container_id: &str) -> Result<(), SandboxError>;
    fn exec(
        &self,
        container_id: &str,
        command: &str,
        workdir: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ExecOutput, SandboxError>;
    fn stop(&self, container_id: &str) -> Result<(), SandboxError>;
}
