//! Child process plumbing
//!
//! Builds host commands with a sanitized environment, resolves programs on
//! the search path, and wraps spawned children with piped standard streams.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::process::child::ChildProcess;
pub use crate::process::command::{ProcessCommand, UNBUFFERED_ENV};

mod child;
mod command;

/// Errors that occur while starting a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("'{0}' was not found in PATH")]
    ToolNotFound(String),

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve a program name to the path that will be executed.
///
/// Names containing a path separator are taken as paths; relative ones are
/// anchored at `working_dir` so they do not depend on the host's current
/// directory. Bare names (like `g++`) are searched for in the host's `PATH`.
pub fn resolve_program(program: &str, working_dir: Option<&Path>) -> Result<PathBuf, ProcessError> {
    if program.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }

    let as_path = Path::new(program);
    if program.chars().any(std::path::is_separator) {
        return Ok(match working_dir {
            Some(dir) if as_path.is_relative() => dir.join(as_path),
            _ => as_path.to_path_buf(),
        });
    }

    let Some(path_var) = std::env::var_os("PATH") else {
        return Err(ProcessError::ToolNotFound(program.to_string()));
    };

    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !std::env::consts::EXE_SUFFIX.is_empty() {
            let with_suffix = dir.join(format!("{program}{}", std::env::consts::EXE_SUFFIX));
            if with_suffix.is_file() {
                return Ok(with_suffix);
            }
        }
    }

    Err(ProcessError::ToolNotFound(program.to_string()))
}
