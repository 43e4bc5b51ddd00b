//! Command builder for child processes
//!
//! Collects argv, working directory and environment, then produces a
//! `tokio::process::Command` with a sanitized environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::EnvConfig;
use crate::process::{ProcessError, resolve_program};

/// Variables forced on every child so output is unbuffered and UTF-8
pub const UNBUFFERED_ENV: &[(&str, &str)] = &[
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
];

/// Builder for a child process invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessCommand {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    /// Explicit variables, applied last
    env: BTreeMap<String, String>,
    /// Parent variables to keep
    env_inherit: Vec<String>,
    /// Keep the whole parent environment
    full_env: bool,
}

impl ProcessCommand {
    /// Create a command from an argv list
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Inherit an environment variable from the parent process
    pub fn env_inherit(mut self, key: impl Into<String>) -> Self {
        self.env_inherit.push(key.into());
        self
    }

    /// Apply an inheritance policy from configuration
    pub fn inherit(mut self, policy: &EnvConfig) -> Self {
        self.full_env = policy.full_env;
        self.env_inherit.extend(policy.passthrough.iter().cloned());
        self
    }

    /// Program name as written in the recipe
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    pub fn argv(&self) -> &[String] {
        &self.command
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Resolve the program to the path that will be executed
    pub fn resolve_program(&self) -> Result<PathBuf, ProcessError> {
        let program = self.program().ok_or(ProcessError::EmptyCommand)?;
        resolve_program(program, self.working_dir.as_deref())
    }

    /// Environment the child will see
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();

        for (key, value) in std::env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            if self.full_env || self.inherits(key) {
                vars.insert(key.to_string(), value.to_string());
            }
        }

        for (key, value) in UNBUFFERED_ENV {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        vars.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    fn inherits(&self, key: &str) -> bool {
        self.env_inherit.iter().any(|name| {
            if cfg!(windows) {
                name.eq_ignore_ascii_case(key)
            } else {
                name == key
            }
        })
    }

    /// Build the tokio command
    ///
    /// Standard streams are left to the caller. The child is killed if the
    /// returned command's child handle is dropped.
    pub fn to_command(&self) -> Result<Command, ProcessError> {
        let program = self.resolve_program()?;

        let mut command = Command::new(program);
        command
            .args(self.args())
            .env_clear()
            .envs(self.environment())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        Ok(command)
    }
}
