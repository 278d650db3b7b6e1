//! Coordination core for alert investigations.
//!
//! The coordinator decides *who* looks at an alert and *when*:
//! 1. The [`Router`] maps alert text to the specialists that must be consulted
//! 2. The [`HandoffStateMachine`] gates every delegation behind operator
//!    confirmation and keeps exactly one specialist in control at a time
//! 3. An [`OrchestratorStrategy`] interprets free-form operator messages and
//!    summarizes specialist work
//! 4. The [`CorrelationEngine`] turns the blackboard into a root-cause report
//!
//! # Architecture
//!
//! ```text
//! Alert text
//!      │
//!      ▼
//! ┌─────────────────┐
//! │     Router      │  ◄── route table (keyword → specialist, priority)
//! └────────┬────────┘
//!          │ mandated specialists, in order
//!          ▼
//! ┌─────────────────┐
//! │  Handoff state  │  ◄── operator events (propose / confirm / cancel)
//! │     machine     │
//! └────────┬────────┘
//!          │ ControlGrant
//!    ┌─────┴─────┬─────────┬──────────┐
//!    ▼           ▼         ▼          ▼
//! [Storage]  [Compute] [Network] [Database]
//!          │
//!          ▼ blackboard
//! ┌─────────────────┐
//! │   Correlation   │  ──▶ report
//! └─────────────────┘
//! ```

pub mod config;
pub mod correlation;
pub mod handoff;
pub mod orchestrator;
pub mod routing;

pub use config::{ApiConfig, CorrelationConfig, EinConfig, RoutingConfig, SessionConfig};
pub use correlation::{AlertRca, CorrelationEngine, CorrelationReport, IncidentSummary};
pub use handoff::{
    ControlGrant, HandoffRequest, HandoffState, HandoffStateMachine, HandoffStatus, Transition,
};
pub use orchestrator::{
    parse_affirmation, parse_group_request, parse_specialist_request, Action, DecisionContext,
    OrchestratorStrategy, RuleBasedOrchestrator,
};
pub use routing::{FallbackPolicy, RouteDecision, RouteMatch, RouteRule, RouteTable, Router};
