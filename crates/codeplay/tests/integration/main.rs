//! Integration tests for codeplay
//!
//! Most tests drive real sessions through `sh` recipes and only need a Unix
//! shell. Tests that need language toolchains (python3, g++, rustc, ...) are
//! behind the `integration-tests` feature and marked `#[ignore]`:
//!    cargo test -p codeplay --features integration-tests -- --include-ignored

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use codeplay::config::{CompileConfig, FileExtension, RunConfig};
use codeplay::{Config, Language, ServerEvent, Session, StreamKind, event_channel};
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;

mod config_loading;
mod output_relay;
mod session_lifecycle;
#[cfg(feature = "integration-tests")]
mod toolchains;

pub(crate) const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Helper to get fixture file content
#[allow(dead_code)]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

pub(crate) fn interpreted(name: &str, extension: &str, command: &[&str]) -> Language {
    Language {
        name: name.to_string(),
        extension: FileExtension::new(extension).expect("valid extension"),
        compile: None,
        run: RunConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            source_name: None,
            env: HashMap::new(),
        },
    }
}

pub(crate) fn compiled(
    name: &str,
    extension: &str,
    compile: &[&str],
    output_name: &str,
    run: &[&str],
) -> Language {
    Language {
        name: name.to_string(),
        extension: FileExtension::new(extension).expect("valid extension"),
        compile: Some(CompileConfig {
            command: compile.iter().map(|s| s.to_string()).collect(),
            source_name: format!("main.{extension}"),
            output_name: output_name.to_string(),
            env: HashMap::new(),
        }),
        run: RunConfig {
            command: run.iter().map(|s| s.to_string()).collect(),
            source_name: None,
            env: HashMap::new(),
        },
    }
}

/// Config with shell-backed recipes and a scratch workspace root
///
/// - `sh`: interpreted, runs the source with `sh`
/// - `shc`: "compiled" by copying the source, then run with `sh`
/// - `broken`: compiler always fails with a diagnostic
/// - `ghost`: compiler that does not exist
pub(crate) fn shell_config(root: &TempDir) -> Config {
    let mut config = Config::empty();
    config.workspace_root = root.path().to_path_buf();
    config.env.passthrough = vec!["PATH".to_string()];
    config.relay.drain_grace_ms = 500;

    config
        .languages
        .insert("sh".to_string(), interpreted("Shell", "sh", &["sh", "{source}"]));
    config.languages.insert(
        "shc".to_string(),
        compiled(
            "Copied Shell",
            "shc",
            &["cp", "{source}", "{output}"],
            "program",
            &["sh", "{binary}"],
        ),
    );
    config.languages.insert(
        "broken".to_string(),
        compiled(
            "Broken",
            "x",
            &[
                "sh",
                "-c",
                "echo \"main.x:1:5: error: expected ';' before '}'\" >&2; exit 1",
            ],
            "main",
            &["./{binary}"],
        ),
    );
    config.languages.insert(
        "ghost".to_string(),
        compiled(
            "Ghost",
            "g",
            &["codeplay-no-such-compiler", "{source}"],
            "main",
            &["./{binary}"],
        ),
    );
    config
}

/// Everything a run sent, up to and including its stop event
#[derive(Debug, Default)]
pub(crate) struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub stop: String,
    pub success: bool,
}

/// A live session with its event stream
pub(crate) struct Harness {
    pub session: Session,
    pub events: Receiver<ServerEvent>,
    _root: TempDir,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let config = shell_config(&root);
        Self::with_config(root, config).await
    }

    pub(crate) async fn with_config(root: TempDir, config: Config) -> Self {
        let (tx, events) = event_channel(config.event_buffer);
        let session = Session::open(Arc::new(config), tx)
            .await
            .expect("Failed to open session");
        Self {
            session,
            events,
            _root: root,
        }
    }

    pub(crate) async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Event channel closed")
    }

    /// Collect events until the next stop event
    pub(crate) async fn finish_run(&mut self) -> RunOutput {
        let mut output = RunOutput::default();
        loop {
            match self.next_event().await {
                ServerEvent::TermOutput { data, stream } => match stream {
                    StreamKind::Stdout => output.stdout.push_str(&data),
                    StreamKind::Stderr => output.stderr.push_str(&data),
                },
                ServerEvent::TermStop { data, success } => {
                    output.stop = data;
                    output.success = success;
                    return output;
                }
            }
        }
    }

    /// Run a program to completion
    pub(crate) async fn run(&mut self, language: &str, code: &str) -> RunOutput {
        let _ = self.session.run_code(language, code).await;
        self.finish_run().await
    }
}
