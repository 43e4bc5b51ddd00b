//! An interactive, multi-language code execution engine.
//!
//! Codeplay turns submitted source text into a running, interactive and
//! cancellable child process, and relays its output to a remote client as it
//! is produced. It is the engine behind a browser code playground: one
//! [`Session`] per client connection, at most one live program per session.
//!
//! # Features
//!
//! - **Multi-language**: TOML recipes for compiled and interpreted languages.
//! - **Build step**: bounded compiler invocation with verbatim diagnostics.
//! - **Process supervision**: start/kill/write-input serialized per session.
//! - **Streaming relay**: line-buffered stdout/stderr forwarding with
//!   bounded latency for prompts and other unterminated output.
//! - **Typed failures**: every failure path ends in exactly one stop event.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, EnvConfig, Language, RelayConfig};
pub use process::{ChildProcess, ProcessCommand, ProcessError};
pub use runner::{
    BuildError, InputOutcome, RelayPolicy, RunCommand, RunError, Supervisor, SupervisorOptions,
    build,
};
pub use session::{ClientEvent, EventSender, ServerEvent, Session, TransportError, event_channel};
pub use types::{OutputChunk, RunReport, RunStatus, StreamKind, SupervisorState};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod config;
pub mod process;
pub mod runner;
pub mod session;
pub mod types;
pub mod workspace;
