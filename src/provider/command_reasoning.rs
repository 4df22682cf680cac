use super::{CollaboratorError, Prompt, ReasoningService};
use crate::config::ReasoningSettings;
use std::io::{BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Runs a local model CLI (for example `ollama run llama2`), writing the
/// rendered prompt to stdin and taking stdout as the reply.
#[derive(Debug, Clone)]
pub struct CommandReasoning {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandReasoning {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    pub fn from_settings(settings: &ReasoningSettings) -> Self {
        Self::new(
            settings.command.clone(),
            Duration::from_secs(settings.timeout_seconds),
        )
    }
}

fn io_error(path: &str, source: std::io::Error) -> CollaboratorError {
    CollaboratorError::Io {
        path: path.to_string(),
        source,
    }
}

impl ReasoningService for CommandReasoning {
    fn invoke(&self, prompt: &Prompt) -> Result<String, CollaboratorError> {
        let Some((binary, args)) = self.argv.split_first() else {
            return Err(CollaboratorError::NotConfigured {
                service: "reasoning",
                reason: "reasoning command is empty".to_string(),
            });
        };

        let mut child = match Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollaboratorError::MissingBinary {
                    binary: binary.clone(),
                })
            }
            Err(err) => return Err(io_error(binary, err)),
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error(binary, std::io::Error::other("missing stdout pipe")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error(binary, std::io::Error::other("missing stderr pipe")))?;
        let stdout_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stdout).read_to_string(&mut buf);
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf);
            buf
        });

        if let Some(mut stdin) = child.stdin.take() {
            let rendered = prompt.render();
            // Dropping stdin after the write closes the pipe so the model sees EOF.
            if let Err(err) = stdin.write_all(rendered.as_bytes()) {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(io_error(binary, err));
                }
            }
        }

        let start = Instant::now();
        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(CollaboratorError::Timeout {
                            timeout_ms: self.timeout.as_millis() as u64,
                        });
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) => return Err(io_error(binary, err)),
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if !exit_status.success() {
            return Err(CollaboratorError::NonZeroExit {
                exit_code: exit_status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        let reply = stdout.trim();
        if reply.is_empty() {
            return Err(CollaboratorError::Response {
                service: "reasoning",
                reason: "command produced no output".to_string(),
            });
        }
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandReasoning {
        CommandReasoning::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout,
        )
    }

    #[test]
    fn prompt_is_piped_through_stdin() {
        let reasoning = sh("cat", Duration::from_secs(5));
        let reply = reasoning
            .invoke(&Prompt::new("system text", "user text"))
            .expect("cat echoes the prompt");
        assert_eq!(reply, "system text\n\nuser text");
    }

    #[test]
    fn nonzero_exit_and_timeout_are_errors() {
        let failing = sh("echo boom >&2; exit 3", Duration::from_secs(5));
        let err = failing
            .invoke(&Prompt::new("s", "u"))
            .expect_err("exit 3 must fail");
        assert!(matches!(err, CollaboratorError::NonZeroExit { exit_code: 3, ref stderr } if stderr == "boom"));

        let slow = sh("exec sleep 5", Duration::from_millis(100));
        let err = slow
            .invoke(&Prompt::new("s", "u"))
            .expect_err("sleep must time out");
        assert!(matches!(err, CollaboratorError::Timeout { .. }));
    }

    #[test]
    fn missing_binary_is_reported() {
        let reasoning = CommandReasoning::new(
            vec!["planforge-no-such-model-cli".to_string()],
            Duration::from_secs(1),
        );
        let err = reasoning
            .invoke(&Prompt::new("s", "u"))
            .expect_err("missing binary");
        assert!(matches!(err, CollaboratorError::MissingBinary { .. }));
    }
}
