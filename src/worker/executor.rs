use std::io::Read;
use std::process::{ExitStatus, Stdio};

use base64::prelude::*;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::config::ExecutorConfig;
use crate::error::ExecError;
use crate::job::JobStatus;

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `Succeeded` on exit 0, otherwise `Failed`
    pub status: JobStatus,
    /// Base64 of the combined stdout+stderr on success, empty on failure
    pub output: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

/// Runs shell commands with `HOME` redirected to a scratch directory.
///
/// stdout and stderr share one pipe, so the captured bytes are the combined
/// output in the order the child wrote them.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    config: ExecutorConfig,
}

impl JobExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `command` under `<shell> -c` and wait for it to exit.
    ///
    /// A non-zero exit is an `Ok` outcome with a failed status. An `Err` means
    /// no status could be produced: the shell failed to start, waiting on it
    /// failed, or the configured timeout expired.
    pub async fn execute(&self, command: &str) -> Result<CommandOutcome, ExecError> {
        tracing::info!(
            command,
            shell = %self.config.shell.display(),
            home = %self.config.scratch_dir.display(),
            "Executing command"
        );

        self.prepare_scratch().await;

        let (mut reader, writer) = std::io::pipe().map_err(ExecError::Launch)?;
        let stderr_writer = writer.try_clone().map_err(ExecError::Launch)?;

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command)
            .env("HOME", &self.config.scratch_dir)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            // Own process group, so a timeout can kill everything the shell forked
            .process_group(0)
            .kill_on_drop(true);

        let spawned = cmd.spawn();
        // Close our copies of the write end, otherwise the reader never sees EOF
        drop(cmd);

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(command, error = %e, "Failed to launch command");
                return Err(ExecError::Launch(e));
            }
        };

        let collector = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).map(|_| buf)
        });

        let waited = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(command, timeout = ?limit, "Command timed out, killing");
                    Self::kill_process_group(command, &mut child).await;
                    // The collector finishes on its own once the group's pipe ends close
                    drop(collector);
                    return Err(ExecError::TimedOut(limit));
                }
            },
            None => child.wait().await,
        };

        let status = waited.map_err(|e| {
            tracing::error!(command, error = %e, "Failed waiting for command");
            ExecError::Wait(e)
        })?;

        let captured = collector
            .await
            .map_err(|e| ExecError::Wait(std::io::Error::other(e)))?
            .map_err(ExecError::Wait)?;

        Ok(Self::derive_outcome(command, status, captured))
    }

    /// SIGKILL the child's whole process group and reap the shell.
    async fn kill_process_group(command: &str, child: &mut Child) {
        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::error!(command, pid, error = %e, "Failed to kill process group");
            }
        }
        if let Err(e) = child.kill().await {
            tracing::error!(command, error = %e, "Failed to kill timed out command");
        }
    }

    /// Make sure the scratch config directory exists. Failure is logged and
    /// execution continues without it.
    async fn prepare_scratch(&self) {
        let dir = self.config.config_dir();
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!(dir = %dir.display(), error = %e, "Failed to create scratch config directory");
        }
    }

    fn derive_outcome(command: &str, status: ExitStatus, captured: Vec<u8>) -> CommandOutcome {
        let exit_code = status.code();

        if status.success() {
            tracing::info!(command, exit_code = ?exit_code, output_bytes = captured.len(), "Command succeeded");
            tracing::debug!(command, output = %String::from_utf8_lossy(&captured), "Command output");
            CommandOutcome {
                status: JobStatus::Succeeded,
                output: BASE64_STANDARD.encode(&captured),
                exit_code,
            }
        } else {
            tracing::error!(
                command,
                exit_code = ?exit_code,
                output = %String::from_utf8_lossy(&captured),
                "Command failed"
            );
            CommandOutcome {
                status: JobStatus::Failed,
                output: String::new(),
                exit_code,
            }
        }
    }
}
