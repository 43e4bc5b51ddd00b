//! Output relay
//!
//! Drains one child output pipe and forwards it to the session transport.
//! Complete lines go out as soon as they are read. An unterminated tail is
//! held back until a newline arrives, the pipe goes idle for the flush
//! interval, too many partial reads pile up, or the pipe closes.
//!
//! Reading never waits on delivery. While the transport is full, text that
//! is ready to send accumulates in a bounded backlog and goes out as one
//! chunk once the transport has room again.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::session::{EventSender, ServerEvent};
use crate::types::{OutputChunk, StreamKind};

/// Flush cadence for one relayed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Partial reads coalesced before a forced flush
    pub flush_threshold: usize,

    /// Idle time after which a pending partial line is flushed
    pub flush_interval: Duration,

    /// Bytes requested per read
    pub read_buffer: usize,

    /// Undelivered bytes held while the transport is full
    pub max_backlog: usize,
}

impl RelayPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            flush_threshold: config.flush_threshold.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            read_buffer: config.read_buffer.max(1),
            max_backlog: config.max_backlog,
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// What a relay saw on its stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Bytes read from the pipe
    pub bytes: usize,

    /// Chunks handed to the transport
    pub chunks: usize,

    /// Bytes discarded because the backlog was full
    pub dropped: usize,

    /// Whether the transport rejected a chunk
    pub transport_failed: bool,
}

/// Splits raw pipe bytes into forwardable text
#[derive(Debug)]
pub(crate) struct LineAssembler {
    pending: Vec<u8>,
    pieces: usize,
    threshold: usize,
}

impl LineAssembler {
    pub(crate) fn new(threshold: usize) -> Self {
        Self {
            pending: Vec::new(),
            pieces: 0,
            threshold: threshold.max(1),
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Feed bytes from one read; returns text ready to forward
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }

        match bytes.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let mut ready = std::mem::take(&mut self.pending);
                ready.extend_from_slice(&bytes[..=last_newline]);
                self.pending.extend_from_slice(&bytes[last_newline + 1..]);
                self.pieces = usize::from(!self.pending.is_empty());
                Some(String::from_utf8_lossy(&ready).into_owned())
            }
            None => {
                self.pending.extend_from_slice(bytes);
                self.pieces += 1;
                if self.pieces > self.threshold {
                    self.flush_partial()
                } else {
                    None
                }
            }
        }
    }

    /// Flush the unterminated tail, holding back an incomplete UTF-8 sequence
    pub(crate) fn flush_partial(&mut self) -> Option<String> {
        let split = self.pending.len() - incomplete_utf8_tail(&self.pending);
        if split == 0 {
            return None;
        }

        let tail = self.pending.split_off(split);
        let ready = std::mem::replace(&mut self.pending, tail);
        self.pieces = usize::from(!self.pending.is_empty());
        Some(String::from_utf8_lossy(&ready).into_owned())
    }

    /// End of stream: flush whatever remains
    pub(crate) fn finish(&mut self) -> Option<String> {
        self.pieces = 0;
        if self.pending.is_empty() {
            return None;
        }
        let ready = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&ready).into_owned())
    }
}

/// Length of a trailing, not yet complete, UTF-8 sequence
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = if byte & 0b1110_0000 == 0b1100_0000 {
            2
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            3
        } else if byte & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Text waiting for room in the transport
struct Backlog {
    stream: StreamKind,
    text: String,
    limit: usize,
    summary: StreamSummary,
}

impl Backlog {
    fn new(stream: StreamKind, limit: usize) -> Self {
        Self {
            stream,
            text: String::new(),
            limit,
            summary: StreamSummary::default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Queue ready text, discarding it once the backlog is full
    fn stage(&mut self, data: Option<String>) {
        let Some(data) = data else { return };
        if self.summary.transport_failed {
            return;
        }
        if self.text.len() + data.len() > self.limit && !self.text.is_empty() {
            if self.summary.dropped == 0 {
                warn!(
                    stream = %self.stream,
                    limit = self.limit,
                    "client is not reading, discarding output"
                );
            }
            self.summary.dropped += data.len();
            return;
        }
        self.text.push_str(&data);
    }

    /// Everything queued so far, as one event
    fn take_event(&mut self) -> ServerEvent {
        self.summary.chunks += 1;
        let chunk = OutputChunk::new(self.stream, std::mem::take(&mut self.text));
        ServerEvent::from(chunk)
    }

    fn transport_closed(&mut self) {
        warn!(stream = %self.stream, "session transport closed, discarding further output");
        self.summary.transport_failed = true;
        self.text.clear();
    }
}

/// Drain `reader` until end of stream, forwarding its output
///
/// Read errors end the stream as if it had closed. Cancelling `close` also
/// ends reading; text already read is still delivered before returning.
pub async fn relay_stream<R>(
    mut reader: R,
    stream: StreamKind,
    events: EventSender,
    policy: RelayPolicy,
    close: CancellationToken,
) -> StreamSummary
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; policy.read_buffer];
    let mut assembler = LineAssembler::new(policy.flush_threshold);
    let mut backlog = Backlog::new(stream, policy.max_backlog);
    let mut open = true;

    while open || !backlog.is_empty() {
        let idle_flush = open && assembler.has_pending();

        tokio::select! {
            permit = events.reserve(), if !backlog.is_empty() => match permit {
                Ok(permit) => permit.send(backlog.take_event()),
                Err(_) => backlog.transport_closed(),
            },
            read = reader.read(&mut buf), if open => match read {
                Ok(0) => {
                    open = false;
                    backlog.stage(assembler.finish());
                }
                Ok(n) => {
                    backlog.summary.bytes += n;
                    backlog.stage(assembler.push(&buf[..n]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(%stream, error = %e, "output read failed, treating as end of stream");
                    open = false;
                    backlog.stage(assembler.finish());
                }
            },
            () = tokio::time::sleep(policy.flush_interval), if idle_flush => {
                backlog.stage(assembler.flush_partial());
            }
            () = close.cancelled(), if open => {
                debug!(%stream, "relay closed before end of stream");
                open = false;
                backlog.stage(assembler.finish());
            }
        }
    }

    debug!(
        %stream,
        bytes = backlog.summary.bytes,
        chunks = backlog.summary.chunks,
        dropped = backlog.summary.dropped,
        "stream closed"
    );
    backlog.summary
}
