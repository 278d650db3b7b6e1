//! Session events: operator and system input to a running investigation.

use crate::SpecialistKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    Client,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Confirmation,
    Cancellation,
}

/// Event content, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventBody {
    Message {
        text: String,
    },
    Confirmation {
        confirmed: bool,
        /// Operator picked a different specialist than the one proposed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        specialist: Option<SpecialistKind>,
    },
    Cancellation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl EventBody {
    pub fn message(text: impl Into<String>) -> Self {
        EventBody::Message { text: text.into() }
    }

    pub fn confirmation(confirmed: bool) -> Self {
        EventBody::Confirmation {
            confirmed,
            specialist: None,
        }
    }

    pub fn selection(specialist: SpecialistKind) -> Self {
        EventBody::Confirmation {
            confirmed: true,
            specialist: Some(specialist),
        }
    }

    pub fn cancellation(reason: Option<String>) -> Self {
        EventBody::Cancellation { reason }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Message { .. } => EventKind::Message,
            EventBody::Confirmation { .. } => EventKind::Confirmation,
            EventBody::Cancellation { .. } => EventKind::Cancellation,
        }
    }
}

/// An enqueued event. Sequence numbers are monotonic and gapless per
/// investigation, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub seq: u64,
    pub origin: EventOrigin,
    pub body: EventBody,
    pub enqueued_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }
}
