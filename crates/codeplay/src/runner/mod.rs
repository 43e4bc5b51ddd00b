//! Build and supervise user programs
//!
//! [`build`] turns a language recipe into a runnable command, compiling first
//! when needed. [`Supervisor`] owns the one live child of a session and relays
//! its output.

use std::time::Duration;

use thiserror::Error;

pub use crate::runner::build::{RunCommand, build};
pub use crate::runner::relay::{RelayPolicy, StreamSummary, relay_stream};
pub use crate::runner::supervisor::{InputOutcome, Supervisor, SupervisorOptions};

mod build;
mod relay;
mod supervisor;

use crate::config::ConfigError;
use crate::process::ProcessError;
use crate::workspace::WorkspaceError;

/// Errors that occur during the build step
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("compilation failed: {diagnostic}")]
    Failed {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("compiler not found: {0}")]
    ToolNotFound(String),

    #[error("compilation timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("process error: {0}")]
    Process(ProcessError),
}

/// Anything that stops a run before or while it starts
///
/// Every variant is recoverable; the session stays usable for the next run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),

    #[error("'{0}' was not found on this host")]
    ToolNotFound(String),

    #[error("compilation failed")]
    BuildFailure {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("compilation timed out after {0:?}")]
    BuildTimeout(Duration),

    #[error("failed to start '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl RunError {
    /// Text shown in the user's terminal
    ///
    /// Compiler diagnostics are passed through untouched.
    pub fn user_message(&self) -> String {
        match self {
            RunError::BuildFailure {
                exit_code,
                diagnostic,
            } => {
                if diagnostic.trim().is_empty() {
                    format!("compiler exited with code {}", display_code(*exit_code))
                } else {
                    diagnostic.clone()
                }
            }
            other => format!("Error: {other}"),
        }
    }

    /// Whether the submitted code or request caused this, not the host
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RunError::UnsupportedLanguage(_)
                | RunError::BuildFailure { .. }
                | RunError::BuildTimeout(_)
        )
    }
}

impl From<BuildError> for RunError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Failed {
                exit_code,
                diagnostic,
            } => RunError::BuildFailure {
                exit_code,
                diagnostic,
            },
            BuildError::ToolNotFound(tool) => RunError::ToolNotFound(tool),
            BuildError::Timeout(duration) => RunError::BuildTimeout(duration),
            BuildError::Io(e) => RunError::Io(e),
            BuildError::Process(e) => e.into(),
        }
    }
}

impl From<ProcessError> for RunError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ToolNotFound(tool) => RunError::ToolNotFound(tool),
            ProcessError::SpawnFailed { program, source } => {
                RunError::SpawnFailed { program, source }
            }
            other @ ProcessError::EmptyCommand => RunError::InvalidCommand(other.to_string()),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnsupportedLanguage(id) => RunError::UnsupportedLanguage(id),
            other => RunError::InvalidCommand(other.to_string()),
        }
    }
}

fn display_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
