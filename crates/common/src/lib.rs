//! Common types shared across the ein crates.
//!
//! This crate provides the domain vocabulary every other crate speaks:
//! alerts, findings, roles and capabilities, session events, and output
//! messages.

pub mod alert;
pub mod error;
pub mod event;
pub mod finding;
pub mod message;
pub mod role;
pub mod status;

pub use alert::{Alert, AlertStatus, AlertmanagerAlert};
pub use error::{EinError, Result};
pub use event::{EventBody, EventKind, EventOrigin, SessionEvent};
pub use finding::{ConfidenceTier, Finding, FindingFilter, FindingId};
pub use message::{MessageKind, MessagePage, OutputMessage};
pub use role::{Capability, Role, SpecialistKind};
pub use status::InvestigationStatus;
