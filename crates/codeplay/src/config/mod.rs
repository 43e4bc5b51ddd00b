use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{CompileConfig, FileExtension, Language, RunConfig};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codeplay.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Codeplay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Parent directory of the per-session scratch workspaces.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Upper bound on a single compiler invocation, in seconds.
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout: f64,

    /// Treat any stderr output as a failed run even when the exit code is 0.
    #[serde(default = "default_true")]
    pub stderr_marks_failure: bool,

    /// Capacity of the per-session outbound event queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Output relay tuning
    #[serde(default)]
    pub relay: RelayConfig,

    /// Environment handed to compilers and programs
    #[serde(default)]
    pub env: EnvConfig,

    /// Language recipes keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

/// Output relay tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Partial-line pieces coalesced before a forced flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Idle time in milliseconds before a pending partial line is flushed
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Bytes requested per read
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,

    /// How long to keep draining pipes after the child exited, in milliseconds
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,

    /// Undelivered output held per stream while the client is not reading;
    /// output beyond it is discarded
    #[serde(default = "default_max_backlog")]
    pub max_backlog: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            flush_interval_ms: default_flush_interval_ms(),
            read_buffer: default_read_buffer(),
            drain_grace_ms: default_drain_grace_ms(),
            max_backlog: default_max_backlog(),
        }
    }
}

/// Which parent environment variables children inherit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvConfig {
    /// Inherit everything
    #[serde(default)]
    pub full_env: bool,

    /// Variables inherited when `full_env` is off
    #[serde(default)]
    pub passthrough: Vec<String>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            compile_timeout: default_compile_timeout(),
            stderr_marks_failure: true,
            event_buffer: default_event_buffer(),
            relay: RelayConfig::default(),
            env: EnvConfig::default(),
            languages: HashMap::new(),
        }
    }

    /// Resolve a language ID to its recipe
    pub fn resolve(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::UnsupportedLanguage(id.to_string()))
    }

    /// Configured language IDs, sorted
    pub fn language_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Upper bound on one compiler run
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.compile_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("codeplay")
}

fn default_compile_timeout() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    256
}

fn default_flush_threshold() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    50
}

fn default_read_buffer() -> usize {
    4096
}

fn default_drain_grace_ms() -> u64 {
    1000
}

fn default_max_backlog() -> usize {
    1024 * 1024
}
