use super::runtime::{ContainerSpec, ExecOutput, SandboxRuntime};
use super::SandboxError;
use crate::shared::cancel::CancelToken;
use std::io::{BufReader, Read};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Drives the `docker` binary. Containers idle on `tail -f /dev/null` and
/// receive work through `docker exec`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output, SandboxError> {
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|err| self.spawn_error(err))
    }

    fn spawn_error(&self, err: std::io::Error) -> SandboxError {
        if err.kind() == std::io::ErrorKind::NotFound {
            SandboxError::MissingBinary {
                binary: self.binary.clone(),
            }
        } else {
            SandboxError::Io {
                path: self.binary.clone(),
                source: err,
            }
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl SandboxRuntime for DockerCli {
    fn create(&self, spec: &ContainerSpec) -> Result<String, SandboxError> {
        // A container left behind by a crashed process would hold the name.
        let _ = self.output(&["rm", "-f", spec.name.as_str()]);

        let mount = format!("{}:{}", spec.host_workspace.display(), spec.workdir);
        let output = self.output(&[
            "run",
            "-d",
            "--name",
            spec.name.as_str(),
            "-v",
            mount.as_str(),
            "-w",
            spec.workdir.as_str(),
            spec.image.as_str(),
            "tail",
            "-f",
            "/dev/null",
        ])?;
        if !output.status.success() {
            return Err(SandboxError::Create {
                name: spec.name.clone(),
                reason: command_output_stderr(&output),
            });
        }
        let container_id = command_output_stdout(&output);
        if container_id.is_empty() {
            return Err(SandboxError::Create {
                name: spec.name.clone(),
                reason: "docker run returned no container id".to_string(),
            });
        }
        Ok(container_id)
    }

    fn is_running(&self, container_id: &str) -> Result<bool, SandboxError> {
        let output = self.output(&["inspect", "--format", "{{.State.Running}}", container_id])?;
        if !output.status.success() {
            let stderr = command_output_stderr(&output);
            if stderr.contains("No such") {
                return Ok(false);
            }
            return Err(SandboxError::Command {
                action: "inspect".to_string(),
                container_id: container_id.to_string(),
                reason: stderr,
            });
        }
        Ok(command_output_stdout(&output) == "true")
    }

    fn start(&self, container_id: &str) -> Result<(), SandboxError> {
        let output = self.output(&["start", container_id])?;
        if !output.status.success() {
            return Err(SandboxError::Command {
                action: "start".to_string(),
                container_id: container_id.to_string(),
                reason: command_output_stderr(&output),
            });
        }
        Ok(())
    }

    fn exec(
        &self,
        container_id: &str,
        command: &str,
        workdir: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ExecOutput, SandboxError> {
        let timeout_secs = timeout.as_secs().max(1).to_string();
        let mut child = Command::new(&self.binary)
            .args([
                "exec",
                "-w",
                workdir,
                container_id,
                "timeout",
                timeout_secs.as_str(),
                "sh",
                "-c",
                command,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        let stdout = child.stdout.take().ok_or_else(|| SandboxError::Io {
            path: self.binary.clone(),
            source: std::io::Error::other("missing stdout pipe"),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| SandboxError::Io {
            path: self.binary.clone(),
            source: std::io::Error::other("missing stderr pipe"),
        })?;
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let start = Instant::now();
        let mut timed_out = false;
        let mut cancelled = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if cancel.is_cancelled() || start.elapsed() > timeout {
                        cancelled = cancel.is_cancelled();
                        timed_out = !cancelled;
                        let _ = child.kill();
                        let status = child.wait().map_err(|source| SandboxError::Io {
                            path: self.binary.clone(),
                            source,
                        })?;
                        break status;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(SandboxError::Io {
                        path: self.binary.clone(),
                        source,
                    })
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        // coreutils `timeout` exits 124 when it fires inside the container
        let exit_code = status.code();
        if exit_code == Some(124) {
            timed_out = true;
        }
        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
            cancelled,
        })
    }

    fn stop(&self, container_id: &str) -> Result<(), SandboxError> {
        let output = self.output(&["rm", "-f", container_id])?;
        if !output.status.success() {
            let stderr = command_output_stderr(&output);
            if stderr.contains("No such") {
                return Ok(());
            }
            return Err(SandboxError::Command {
                action: "rm".to_string(),
                container_id: container_id.to_string(),
                reason: stderr,
            });
        }
        Ok(())
    }
}

fn read_pipe<R: Read>(pipe: R) -> String {
    let mut buf = String::new();
    let mut reader = BufReader::new(pipe);
    let _ = reader.read_to_string(&mut buf);
    buf
}

fn command_output_stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn command_output_stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
