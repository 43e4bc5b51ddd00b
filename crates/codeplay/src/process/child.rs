//! Spawned child with piped standard streams

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tracing::{debug, instrument};

use crate::process::{ProcessCommand, ProcessError};

/// Process handle for interactive execution
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ChildProcess {
    /// Spawn a child with stdin, stdout and stderr piped
    #[instrument(skip(command), fields(program = command.program()))]
    pub fn spawn(command: &ProcessCommand) -> Result<Self, ProcessError> {
        let program = command
            .program()
            .ok_or(ProcessError::EmptyCommand)?
            .to_string();

        let mut cmd = command.to_command()?;
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::SpawnFailed { program, source })?;

        debug!(pid = child.id(), argv = ?command.argv(), "spawned child process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
        })
    }

    /// OS process id, if the child has not been reaped yet
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take ownership of stdin
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take ownership of stdout
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take ownership of stderr
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.stdin = None;
        self.child.wait().await
    }

    /// Forcibly terminate the process and reap it
    ///
    /// Does nothing if the process already exited.
    pub async fn kill(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }
        self.stdin = None;
        self.child.start_kill()?;
        self.child.wait().await
    }
}
