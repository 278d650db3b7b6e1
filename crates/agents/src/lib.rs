//! Domain specialists for alert investigations.
//!
//! This crate provides one specialist per infrastructure domain:
//!
//! - **Storage**: Ceph, persistent volumes, CSI
//! - **Compute**: pods, workloads, nodes
//! - **Network**: DNS, ingress, load balancers, CNI
//! - **Database**: engines, replication, locks
//!
//! # Architecture
//!
//! Each specialist is a [`DomainSpecialist`] with a domain-specific:
//! - Capability set (fixed by its [`SpecialistKind`](ein_common::SpecialistKind))
//! - [`Probe`] that reaches the actual tooling
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SPECIALISTS                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐       │
//! │  │ Storage │  │ Compute │  │ Network │  │Database │       │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘       │
//! │       │  probes    │            │            │             │
//! │       ▼            ▼            ▼            ▼             │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │              Shared Blackboard                       │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A specialist can only investigate while holding a
//! [`ControlGrant`](ein_coordinator::ControlGrant) for its own kind.

pub mod domain;
pub mod probe;
pub mod registry;
pub mod traits;

pub use domain::DomainSpecialist;
pub use probe::{DelayedProbe, Observation, Probe, StaticProbe, UnavailableProbe};
pub use registry::SpecialistRegistry;
pub use traits::{Specialist, SpecialistConfig, SpecialistContext};
