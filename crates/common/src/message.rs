//! Output messages produced by an investigation and polled by clients.

use crate::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an output message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Greeting,
    /// Ask-first handoff proposal
    Proposal,
    /// Orchestrator summary after a specialist returns control
    Synthesis,
    Reply,
    Notice,
    Report,
    Error,
}

/// A message in an investigation's outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    /// Gapless, starting at 1
    pub sequence: u64,
    pub role: Role,
    pub kind: MessageKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// One page of outbox messages returned to a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<OutputMessage>,
    /// Cursor to send on the next poll
    pub cursor: u64,
}

impl MessagePage {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
