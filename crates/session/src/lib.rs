//! Durable, signal/query sessions for alert investigations.
//!
//! Clients never wait for an investigation to process their input. They
//! *signal* events (operator messages, confirmations, cancellations), which
//! are journaled and queued, and they *query* the outbox with a cursor to
//! read what the investigation said since they last looked. A client can
//! disconnect at any point and resume from its last cursor.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!  send_message ──▶│  SessionManager  │──▶ get_messages(cursor)
//!  confirm/cancel  └────────┬─────────┘
//!                           │ journal + enqueue
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!  ┌───────────┐      ┌───────────┐      ┌───────────┐
//!  │ runner A  │      │ runner B  │      │ runner C  │   one task per
//!  │ queue     │      │ queue     │      │ queue     │   investigation
//!  │ machine   │      │ machine   │      │ machine   │
//!  │ blackboard│      │ blackboard│      │ blackboard│
//!  │ outbox    │      │ outbox    │      │ outbox    │
//!  └─────┬─────┘      └─────┬─────┘      └─────┬─────┘
//!        └──────── batch barrier (join) ───────┘
//!                           │
//!                           ▼
//!                 batch correlation report
//! ```

pub mod batch;
pub mod investigation;
pub mod manager;
pub mod outbox;
pub mod queue;
pub mod runner;
pub mod store;

pub use batch::{BatchMemberStatus, BatchReport, BatchView};
pub use investigation::{
    plan_for, InvestigationSnapshot, InvestigationState, InvestigationView, PlannedConsult,
};
pub use manager::SessionManager;
pub use outbox::Outbox;
pub use queue::{CloseReason, EventQueue};
pub use runner::{SessionDeps, INCOMPLETE_CONFIDENCE};
pub use store::{InMemoryStore, InvestigationStore, JsonFileStore, StoredInvestigation};
