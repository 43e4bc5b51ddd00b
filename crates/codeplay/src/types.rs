use std::fmt;

use serde::{Deserialize, Serialize};

/// Output pipe a chunk was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered fragment of child output, tagged with its origin
///
/// Chunks from the same stream are delivered in production order; no order
/// is promised between stdout and stderr chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub data: String,
}

impl OutputChunk {
    pub fn new(stream: StreamKind, data: impl Into<String>) -> Self {
        Self {
            stream,
            data: data.into(),
        }
    }
}

/// Completion status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, not yet spawned
    Pending,

    /// Child process is alive
    Running,

    /// Exited with code 0 (and, by default, wrote nothing to stderr)
    Succeeded,

    /// Exited non-zero, died from a signal, or wrote to stderr
    Failed,

    /// Terminated by a kill request or by a newer run
    Killed,
}

impl RunStatus {
    /// Whether the run has reached its final state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Killed
        )
    }

    /// Banner shown to the user when the run stops
    pub fn marker(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "[Execution Successful]",
            RunStatus::Killed => "[Execution Killed]",
            _ => "[Execution Failed]",
        }
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,

    /// Exit code if the program exited normally
    pub exit_code: Option<i32>,

    /// Whether anything was read from the child's stderr
    pub had_stderr: bool,
}

impl RunReport {
    /// Classify a natural exit
    ///
    /// A missing exit code means the child died from a signal.
    pub fn from_exit(exit_code: Option<i32>, had_stderr: bool, stderr_marks_failure: bool) -> Self {
        let failed = exit_code != Some(0) || (stderr_marks_failure && had_stderr);
        Self {
            status: if failed {
                RunStatus::Failed
            } else {
                RunStatus::Succeeded
            },
            exit_code,
            had_stderr,
        }
    }

    pub fn killed(exit_code: Option<i32>) -> Self {
        Self {
            status: RunStatus::Killed,
            exit_code,
            had_stderr: false,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Lifecycle state of a session's supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    #[default]
    Idle,
    Starting,
    Running,
    Terminating,
}
