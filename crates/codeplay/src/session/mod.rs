//! Client sessions
//!
//! A [`Session`] is one client connection: it owns a workspace, a
//! [`Supervisor`] and the outbound event channel, and turns inbound
//! [`ClientEvent`]s into runs.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub use crate::session::event::{
    ClientEvent, EventSender, ServerEvent, TransportError, event_channel,
};

mod event;

use crate::config::{Config, Language};
use crate::runner::{InputOutcome, RunError, Supervisor, SupervisorOptions, build};
use crate::types::{RunStatus, StreamKind};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

/// One connected client
#[derive(Debug)]
pub struct Session {
    id: String,
    config: Arc<Config>,
    workspace: Workspace,
    supervisor: Supervisor,
    events: EventSender,
    /// Held from kill through start so two run requests cannot overlap
    run_lock: Mutex<()>,
}

impl Session {
    /// Open a session with a fresh id and workspace
    pub async fn open(config: Arc<Config>, events: EventSender) -> Result<Self, WorkspaceError> {
        Self::with_id(Uuid::new_v4().to_string(), config, events).await
    }

    /// Open a session under a caller-chosen id
    #[instrument(skip(config, events))]
    pub async fn with_id(
        id: String,
        config: Arc<Config>,
        events: EventSender,
    ) -> Result<Self, WorkspaceError> {
        let workspace = WorkspaceManager::new(&config.workspace_root)
            .prepare(&id)
            .await?;
        let supervisor = Supervisor::new(
            id.clone(),
            events.clone(),
            SupervisorOptions::from_config(&config),
        );

        info!(session = %id, "session opened");

        Ok(Self {
            id,
            config,
            workspace,
            supervisor,
            events,
            run_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Dispatch one inbound event
    ///
    /// Failures have already been reported to the client as events, so
    /// nothing is returned.
    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::RunCode { code, language } => {
                if let Err(e) = self.run_code(&language, &code).await {
                    debug!(session = %self.id, error = %e, "run request ended early");
                }
            }
            ClientEvent::SendInput { input } => {
                self.send_input(&input).await;
            }
        }
    }

    /// Run `code` as `language_id`, replacing the current run
    ///
    /// An unknown language is rejected before anything else happens. Every
    /// error is also reported to the client, ending with a failed stop event.
    #[instrument(skip(self, code), fields(session = %self.id, len = code.len()))]
    pub async fn run_code(&self, language_id: &str, code: &str) -> Result<u64, RunError> {
        let language = match self.config.resolve(language_id) {
            Ok(language) => language,
            Err(e) => {
                let err = RunError::from(e);
                self.report_failure(&err).await;
                return Err(err);
            }
        };

        let _guard = self.run_lock.lock().await;

        let result = self.launch(language, code).await;
        if let Err(ref err) = result {
            self.report_failure(err).await;
        }
        result
    }

    async fn launch(&self, language: &Language, code: &str) -> Result<u64, RunError> {
        self.supervisor.kill().await;

        self.workspace.reset().await?;
        self.workspace
            .write_source(&language.source_name(), code.as_bytes())
            .await?;

        let command = build(&self.config, language, &self.workspace).await?;
        let process = command.to_process(&self.config, &self.workspace);
        let run = self.supervisor.start(&process).await?;

        debug!(run, "run accepted");
        Ok(run)
    }

    /// Forward one line of input to the running program
    ///
    /// A trailing newline is appended. With nothing running this is a no-op.
    #[instrument(skip(self, input), fields(session = %self.id))]
    pub async fn send_input(&self, input: &str) -> InputOutcome {
        let mut line = String::with_capacity(input.len() + 1);
        line.push_str(input);
        line.push('\n');

        let outcome = self.supervisor.write_input(line.as_bytes()).await;
        if !outcome.is_delivered() {
            debug!(?outcome, "input not delivered");
        }
        outcome
    }

    /// Kill the active run, if any
    pub async fn kill(&self) {
        let _guard = self.run_lock.lock().await;
        self.supervisor.kill().await;
    }

    /// Tear the session down: kill the run and delete the workspace
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn close(&self) {
        self.kill().await;
        self.workspace.cleanup().await;
        info!("session closed");
    }

    /// Report an error as output followed by a failed stop event
    async fn report_failure(&self, err: &RunError) {
        if err.is_user_error() {
            info!(session = %self.id, error = %err, "run rejected");
        } else {
            warn!(session = %self.id, error = %err, "run failed before start");
        }

        let output = ServerEvent::TermOutput {
            data: err.user_message(),
            stream: StreamKind::Stderr,
        };
        let stop = ServerEvent::TermStop {
            data: format!("\n{}", RunStatus::Failed.marker()),
            success: false,
        };

        for event in [output, stop] {
            if self.events.send(event).await.is_err() {
                warn!(session = %self.id, error = %TransportError, "failure report not delivered");
                return;
            }
        }
    }
}
