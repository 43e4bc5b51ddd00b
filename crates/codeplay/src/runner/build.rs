//! Build step
//!
//! Turns a recipe into a runnable command, invoking the compiler first for
//! compiled languages.

use std::collections::HashMap;
use std::process::Stdio;

use tracing::{debug, instrument};

use crate::config::{Config, Language};
use crate::process::{ProcessCommand, ProcessError};
use crate::runner::BuildError;
use crate::workspace::Workspace;

/// A command ready to hand to the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// Expanded argv
    pub argv: Vec<String>,

    /// Recipe-specific environment
    pub env: HashMap<String, String>,
}

impl RunCommand {
    /// Build the process command for running inside `workspace`
    pub fn to_process(&self, config: &Config, workspace: &Workspace) -> ProcessCommand {
        ProcessCommand::new(self.argv.iter().cloned())
            .working_dir(workspace.path())
            .inherit(&config.env)
            .envs(&self.env)
    }
}

/// Compile the workspace's source if the language needs it
///
/// Interpreted languages return their run command directly. The source must
/// already be written to the workspace.
#[instrument(skip(config, workspace), fields(language = %language.name))]
pub async fn build(
    config: &Config,
    language: &Language,
    workspace: &Workspace,
) -> Result<RunCommand, BuildError> {
    let run = RunCommand {
        argv: language.run_command(),
        env: language.run.env.clone(),
    };

    let (Some(compile_config), Some(argv)) = (&language.compile, language.compile_command()) else {
        return Ok(run);
    };

    let command = ProcessCommand::new(argv)
        .working_dir(workspace.path())
        .inherit(&config.env)
        .envs(&compile_config.env);

    let mut cmd = command.to_command().map_err(|e| match e {
        ProcessError::ToolNotFound(tool) => BuildError::ToolNotFound(tool),
        other => BuildError::Process(other),
    })?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(argv = ?command.argv(), "running compiler");

    let timeout = config.compile_timeout();
    // kill_on_drop reaps the compiler if the timeout drops the future
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result?,
        Err(_) => return Err(BuildError::Timeout(timeout)),
    };

    debug!(
        exit_code = ?output.status.code(),
        stdout_len = output.stdout.len(),
        stderr_len = output.stderr.len(),
        "compilation complete"
    );

    if !output.status.success() {
        return Err(BuildError::Failed {
            exit_code: output.status.code(),
            diagnostic: combine_diagnostics(&output.stdout, &output.stderr),
        });
    }

    Ok(run)
}

/// Compiler stdout then stderr, verbatim
fn combine_diagnostics(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    let mut diagnostic = String::with_capacity(stdout.len() + stderr.len() + 1);
    diagnostic.push_str(&stdout);
    if !diagnostic.is_empty() && !stderr.is_empty() && !diagnostic.ends_with('\n') {
        diagnostic.push('\n');
    }
    diagnostic.push_str(&stderr);
    diagnostic
}
