//! Process supervisor
//!
//! Owns the single live child of a session. `start`, `kill` and `write_input`
//! are serialized on one slot lock, so a new run never begins before the
//! previous child has been reaped and its relays have stopped.
//!
//! ```text
//! Idle -> Starting -> Running -> Terminating -> Idle
//!            |           |
//!            +-> Idle    +-> Idle (natural exit)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::process::{ChildProcess, ProcessCommand, ProcessError};
use crate::runner::relay::{RelayPolicy, StreamSummary, relay_stream};
use crate::session::{EventSender, ServerEvent, TransportError};
use crate::types::{RunReport, StreamKind, SupervisorState};

/// Longest a single stdin write may block before it is abandoned
const INPUT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables for a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub relay: RelayPolicy,

    /// How long to keep draining pipes after the child exits
    pub drain_grace: Duration,

    /// Count any stderr output as a failed run
    pub stderr_marks_failure: bool,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            relay: RelayPolicy::from_config(&config.relay),
            drain_grace: Duration::from_millis(config.relay.drain_grace_ms),
            stderr_marks_failure: config.stderr_marks_failure,
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::from_config(&Config::empty())
    }
}

/// Result of forwarding input to the running program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Written and flushed
    Delivered,

    /// Nothing is running; the input was dropped
    NoActiveRun,

    /// The program closed its stdin
    StdinClosed,

    /// The program is not reading; the write was abandoned and stdin closed
    Stalled,
}

impl InputOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, InputOutcome::Delivered)
    }
}

struct ActiveRun {
    id: u64,
    stdin: Option<ChildStdin>,
    cancel: CancellationToken,
    worker: JoinHandle<RunReport>,
}

/// Per-session owner of at most one live child process
pub struct Supervisor {
    session_id: String,
    events: EventSender,
    options: SupervisorOptions,
    slot: Mutex<Option<ActiveRun>>,
    state: Arc<watch::Sender<SupervisorState>>,
    next_run: AtomicU64,
}

impl Supervisor {
    pub fn new(session_id: impl Into<String>, events: EventSender, options: SupervisorOptions) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            session_id: session_id.into(),
            events,
            options,
            slot: Mutex::new(None),
            state: Arc::new(state),
            next_run: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Start `command`, replacing any previous run
    ///
    /// A live predecessor is killed and fully reaped first. Returns the new
    /// run's id. On spawn failure nothing is registered and the state goes
    /// back to `Idle`.
    #[instrument(skip(self, command), fields(session = %self.session_id))]
    pub async fn start(&self, command: &ProcessCommand) -> Result<u64, ProcessError> {
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            self.terminate(previous).await;
        }

        self.state.send_replace(SupervisorState::Starting);

        let mut child = match ChildProcess::spawn(command) {
            Ok(child) => child,
            Err(e) => {
                self.state.send_replace(SupervisorState::Idle);
                return Err(e);
            }
        };

        let id = self.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let stdin = child.take_stdin();
        let stdout = Reader::spawn(
            child.take_stdout(),
            StreamKind::Stdout,
            self.events.clone(),
            self.options.relay,
        );
        let stderr = Reader::spawn(
            child.take_stderr(),
            StreamKind::Stderr,
            self.events.clone(),
            self.options.relay,
        );

        let cancel = CancellationToken::new();
        let worker = Worker {
            run: id,
            child,
            stdout,
            stderr,
            cancel: cancel.clone(),
            events: self.events.clone(),
            options: self.options,
            state: Arc::clone(&self.state),
        };

        self.state.send_replace(SupervisorState::Running);
        info!(run = id, pid = ?worker.child.id(), "run started");

        *slot = Some(ActiveRun {
            id,
            stdin,
            cancel,
            worker: tokio::spawn(worker.supervise()),
        });

        Ok(id)
    }

    /// Write to the running program's stdin and flush
    ///
    /// Never fails: a missing or finished program is reported through the
    /// returned outcome.
    #[instrument(skip(self, data), fields(session = %self.session_id, len = data.len()))]
    pub async fn write_input(&self, data: &[u8]) -> InputOutcome {
        let mut slot = self.slot.lock().await;

        let Some(run) = slot.as_mut() else {
            return InputOutcome::NoActiveRun;
        };
        if run.worker.is_finished() || self.state() != SupervisorState::Running {
            return InputOutcome::NoActiveRun;
        }
        let Some(stdin) = run.stdin.as_mut() else {
            return InputOutcome::StdinClosed;
        };

        let written = tokio::time::timeout(INPUT_WRITE_TIMEOUT, async {
            stdin.write_all(data).await?;
            stdin.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => InputOutcome::Delivered,
            Ok(Err(e)) => {
                debug!(run = run.id, error = %e, "stdin closed by program");
                run.stdin = None;
                InputOutcome::StdinClosed
            }
            Err(_) => {
                // a partial line may already be in the pipe
                warn!(run = run.id, "program is not reading stdin, closing it");
                run.stdin = None;
                InputOutcome::Stalled
            }
        }
    }

    /// Kill the active run, if any
    ///
    /// Returns once the child is reaped and its stop event has been sent.
    /// Calling it with nothing running, or after the program exited, is a
    /// no-op apart from collecting the finished run.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn kill(&self) -> Option<RunReport> {
        let mut slot = self.slot.lock().await;
        let run = slot.take()?;
        self.terminate(run).await
    }

    async fn terminate(&self, run: ActiveRun) -> Option<RunReport> {
        let ActiveRun {
            id,
            stdin,
            cancel,
            worker,
        } = run;

        drop(stdin);
        if !worker.is_finished() {
            self.state.send_replace(SupervisorState::Terminating);
        }
        cancel.cancel();

        let report = match worker.await {
            Ok(report) => {
                debug!(run = id, status = ?report.status, "run collected");
                Some(report)
            }
            Err(e) => {
                warn!(run = id, error = %e, "run worker did not complete");
                None
            }
        };
        self.state.send_replace(SupervisorState::Idle);
        report
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(run) = self.slot.get_mut().take() {
            run.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Owned relay task for one output pipe
struct Reader {
    stream: StreamKind,
    handle: Option<JoinHandle<StreamSummary>>,
    close: CancellationToken,
    summary: StreamSummary,
}

impl Reader {
    fn spawn<R>(pipe: Option<R>, stream: StreamKind, events: EventSender, policy: RelayPolicy) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let close = CancellationToken::new();
        let handle = pipe.map(|pipe| {
            tokio::spawn(relay_stream(pipe, stream, events, policy, close.clone()))
        });
        Self {
            stream,
            handle,
            close,
            summary: StreamSummary::default(),
        }
    }

    /// Wait for end of stream; safe to cancel and call again
    async fn join(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.await {
            Ok(summary) => self.summary = summary,
            Err(e) => warn!(stream = %self.stream, error = %e, "relay task failed"),
        }
        self.handle = None;
    }

    /// Stop reading the pipe; text already read is still delivered
    fn close(&self) {
        self.close.cancel();
    }

    /// Stop relaying and wait until the task is gone
    async fn abort(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
        if let Ok(summary) = handle.await {
            self.summary = summary;
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

/// Task that waits on one child and reports its end
struct Worker {
    run: u64,
    child: ChildProcess,
    stdout: Reader,
    stderr: Reader,
    cancel: CancellationToken,
    events: EventSender,
    options: SupervisorOptions,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl Worker {
    async fn supervise(mut self) -> RunReport {
        let exited = tokio::select! {
            status = self.child.wait() => Some(status),
            () = self.cancel.cancelled() => None,
        };

        let report = match exited {
            Some(status) => {
                let exit_code = match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(run = self.run, error = %e, "failed to wait for child");
                        None
                    }
                };
                self.drain().await;
                RunReport::from_exit(
                    exit_code,
                    self.stderr.summary.bytes > 0,
                    self.options.stderr_marks_failure,
                )
            }
            None => {
                let exit_code = match self.child.kill().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(run = self.run, error = %e, "failed to kill child");
                        None
                    }
                };
                self.stdout.abort().await;
                self.stderr.abort().await;
                RunReport::killed(exit_code)
            }
        };

        info!(
            run = self.run,
            status = ?report.status,
            exit_code = ?report.exit_code,
            stdout_bytes = self.stdout.summary.bytes,
            stderr_bytes = self.stderr.summary.bytes,
            "run finished"
        );

        let stop = ServerEvent::TermStop {
            data: format!("\n{}", report.status.marker()),
            success: report.is_success(),
        };
        if self.events.send(stop).await.is_err() {
            warn!(run = self.run, error = %TransportError, "stop event not delivered");
        }

        self.state.send_replace(SupervisorState::Idle);
        report
    }

    /// Let both relays reach end of stream, bounded by the drain grace
    ///
    /// A background process that inherited the pipes can hold them open past
    /// the child's exit; once the grace runs out reading stops, and what was
    /// already read is still delivered. A kill cuts delivery short.
    async fn drain(&mut self) {
        let grace = self.options.drain_grace;

        let closed = tokio::select! {
            result = tokio::time::timeout(grace, join_both(&mut self.stdout, &mut self.stderr)) => {
                result.is_ok()
            }
            () = self.cancel.cancelled() => true,
        };

        if !closed {
            warn!(run = self.run, ?grace, "relays still busy after exit, closing pipes");
            self.stdout.close();
            self.stderr.close();
            tokio::select! {
                () = join_both(&mut self.stdout, &mut self.stderr) => {}
                () = self.cancel.cancelled() => {}
            }
        }

        for reader in [&mut self.stdout, &mut self.stderr] {
            if reader.is_open() {
                reader.abort().await;
            }
        }
    }
}

async fn join_both(stdout: &mut Reader, stderr: &mut Reader) {
    stdout.join().await;
    stderr.join().await;
}
