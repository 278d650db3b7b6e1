//! Shared findings store for multi-role investigations.
//!
//! The blackboard is an append-only log of [`Finding`](ein_common::Finding)s
//! that every role in an investigation can read and write.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BLACKBOARD                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   BlackboardTools (per author)                              │
//! │     record / correct / get_shared_context / report          │
//! │                         │                                   │
//! │                         ▼                                   │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │  Findings log: F0, F1, F2, ... (append only)        │   │
//! │  │  Incident groups: key -> {finding ids, analysis}    │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                         │                                   │
//! │                         ▼ group                             │
//! │   GroupingStrategy: resource | type | namespace | window    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod grouping;
pub mod report;
pub mod store;
pub mod tools;
pub mod types;

pub use grouping::{
    ByNamespace, ByResource, ByResourceType, GroupingStrategy, Groups, StrategyKind,
    TemporalWindow,
};
pub use report::{render_findings_report, render_shared_context};
pub use store::Blackboard;
pub use tools::BlackboardTools;
pub use types::{BlackboardState, FindingsView, IncidentGroup};
