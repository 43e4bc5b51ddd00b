//! Transport events
//!
//! Both directions are JSON objects tagged by an `event` field, e.g.
//! `{"event":"run_code","code":"print(1)","language":"python"}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{OutputChunk, StreamKind};

fn default_language() -> String {
    "python".to_string()
}

/// Event sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Run a program, replacing whatever is running
    RunCode {
        #[serde(default)]
        code: String,
        #[serde(default = "default_language")]
        language: String,
    },

    /// One line of terminal input
    SendInput {
        #[serde(default)]
        input: String,
    },
}

/// Event sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Program output
    TermOutput { data: String, stream: StreamKind },

    /// Terminal event of a run, sent exactly once
    TermStop { data: String, success: bool },
}

impl From<OutputChunk> for ServerEvent {
    fn from(chunk: OutputChunk) -> Self {
        ServerEvent::TermOutput {
            data: chunk.data,
            stream: chunk.stream,
        }
    }
}

/// Outbound half of a session transport
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Bounded channel carrying a session's outbound events
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<ServerEvent>) {
    mpsc::channel(capacity.max(1))
}

/// The client side of a session went away
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("session transport closed")]
pub struct TransportError;
