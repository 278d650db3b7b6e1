//! Roles and capabilities.
//!
//! Every participant in an investigation is either the orchestrator or one
//! domain specialist. Each role carries a fixed capability set; the
//! orchestrator set and every specialist set are disjoint, so the
//! orchestrator can never reach infrastructure tools directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain specialists that can be consulted during an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    /// Ceph, persistent volumes, storage classes
    Storage,
    /// Kubernetes workloads, nodes, containers
    Compute,
    /// DNS, ingress, load balancers, CNI
    Network,
    /// Database engines and replication
    Database,
}

impl SpecialistKind {
    pub const ALL: [SpecialistKind; 4] = [
        SpecialistKind::Storage,
        SpecialistKind::Compute,
        SpecialistKind::Network,
        SpecialistKind::Database,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialistKind::Storage => "storage",
            SpecialistKind::Compute => "compute",
            SpecialistKind::Network => "network",
            SpecialistKind::Database => "database",
        }
    }

    /// Human-readable name used in operator-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            SpecialistKind::Storage => "Storage Specialist",
            SpecialistKind::Compute => "Compute Specialist",
            SpecialistKind::Network => "Network Specialist",
            SpecialistKind::Database => "Database Specialist",
        }
    }

    /// Infrastructure tools this specialist may invoke while it holds control.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            SpecialistKind::Storage => &[
                Capability::InspectStorageCluster,
                Capability::InspectVolumes,
                Capability::QueryMetrics,
            ],
            SpecialistKind::Compute => &[
                Capability::InspectWorkloads,
                Capability::InspectNodes,
                Capability::QueryMetrics,
            ],
            SpecialistKind::Network => &[
                Capability::InspectNetwork,
                Capability::QueryMetrics,
            ],
            SpecialistKind::Database => &[
                Capability::InspectDatabase,
                Capability::QueryMetrics,
            ],
        }
    }
}

impl fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let normalized = normalized
            .strip_suffix("specialist")
            .unwrap_or(&normalized)
            .trim();
        match normalized {
            "storage" | "ceph" => Ok(SpecialistKind::Storage),
            "compute" | "kubernetes" => Ok(SpecialistKind::Compute),
            "network" => Ok(SpecialistKind::Network),
            "database" | "db" => Ok(SpecialistKind::Database),
            other => Err(format!("unknown specialist '{}'", other)),
        }
    }
}

/// A participant role in an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Talks to the operator, proposes handoffs, synthesizes results.
    Orchestrator,
    /// A domain specialist.
    Specialist(SpecialistKind),
}

impl Role {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Orchestrator => &[
                Capability::ProposeHandoff,
                Capability::AskOperator,
                Capability::Synthesize,
                Capability::Correlate,
            ],
            Role::Specialist(kind) => kind.capabilities(),
        }
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }

    pub fn specialist(&self) -> Option<SpecialistKind> {
        match self {
            Role::Orchestrator => None,
            Role::Specialist(kind) => Some(*kind),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Orchestrator => f.write_str("orchestrator"),
            Role::Specialist(kind) => write!(f, "{}", kind),
        }
    }
}

impl From<SpecialistKind> for Role {
    fn from(kind: SpecialistKind) -> Self {
        Role::Specialist(kind)
    }
}

/// Capabilities a role can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Orchestrator
    ProposeHandoff,
    AskOperator,
    Synthesize,
    Correlate,

    // Specialists
    InspectStorageCluster,
    InspectVolumes,
    InspectWorkloads,
    InspectNodes,
    InspectNetwork,
    InspectDatabase,
    QueryMetrics,
}

impl Capability {
    pub fn is_infrastructure_tool(&self) -> bool {
        !matches!(
            self,
            Capability::ProposeHandoff
                | Capability::AskOperator
                | Capability::Synthesize
                | Capability::Correlate
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::ProposeHandoff => "propose_handoff",
            Capability::AskOperator => "ask_operator",
            Capability::Synthesize => "synthesize",
            Capability::Correlate => "correlate",
            Capability::InspectStorageCluster => "inspect_storage_cluster",
            Capability::InspectVolumes => "inspect_volumes",
            Capability::InspectWorkloads => "inspect_workloads",
            Capability::InspectNodes => "inspect_nodes",
            Capability::InspectNetwork => "inspect_network",
            Capability::InspectDatabase => "inspect_database",
            Capability::QueryMetrics => "query_metrics",
        };
        f.write_str(name)
    }
}
