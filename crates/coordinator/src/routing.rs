//! Keyword routing from alert text to the specialists that must be consulted.
//!
//! Routing is table driven. Each rule maps a keyword to a specialist with a
//! priority; a text matches a rule when it contains the keyword
//! case-insensitively. Matched specialists are ordered by their best (lowest)
//! rule priority, then by table position, never by where the keyword appears
//! in the text. Adding a specialist means adding rows.

use anyhow::Context;
use ein_common::{Alert, SpecialistKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One row of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub keyword: String,
    pub specialist: SpecialistKind,
    /// Lower sorts first
    pub priority: u32,
}

impl RouteRule {
    pub fn new(keyword: impl Into<String>, specialist: SpecialistKind, priority: u32) -> Self {
        Self {
            keyword: keyword.into(),
            specialist,
            priority,
        }
    }
}

/// Versioned keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub version: String,
    pub rules: Vec<RouteRule>,
}

const STORAGE_KEYWORDS: &[&str] = &[
    "ceph",
    "rbd",
    "osd",
    "pvc",
    "persistentvolume",
    "storageclass",
    "csi",
    "rook",
    "objectstore",
    "rgw",
    "mds",
    "crush",
    "placement group",
    "volume",
];

const COMPUTE_KEYWORDS: &[&str] = &[
    "pod",
    "pending",
    "crashloopbackoff",
    "oomkilled",
    "imagepullbackoff",
    "deployment",
    "replicaset",
    "daemonset",
    "statefulset",
    "kubelet",
    "container",
    "node",
    "schedul",
    "pvc",
    "persistentvolumeclaim",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "dns",
    "coredns",
    "ingress",
    "loadbalancer",
    "network",
    "latency",
    "packet",
    "connection refused",
    "calico",
    "cni",
];

const DATABASE_KEYWORDS: &[&str] = &[
    "innodb",
    "mysql",
    "postgres",
    "replication lag",
    "deadlock",
    "database",
];

impl RouteTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        let groups: [(&[&str], SpecialistKind, u32); 4] = [
            (STORAGE_KEYWORDS, SpecialistKind::Storage, 10),
            (COMPUTE_KEYWORDS, SpecialistKind::Compute, 20),
            (NETWORK_KEYWORDS, SpecialistKind::Network, 30),
            (DATABASE_KEYWORDS, SpecialistKind::Database, 40),
        ];

        let rules = groups
            .iter()
            .flat_map(|(keywords, kind, priority)| {
                keywords
                    .iter()
                    .map(move |k| RouteRule::new(*k, *kind, *priority))
            })
            .collect();

        Self {
            version: "builtin-1".into(),
            rules,
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let table: Self = toml::from_str(content).context("Failed to parse route table")?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read route table '{}'", path.display()))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.version.trim().is_empty() {
            anyhow::bail!("Route table version must not be empty");
        }
        if let Some(pos) = self.rules.iter().position(|r| r.keyword.trim().is_empty()) {
            anyhow::bail!("Route table rule {} has an empty keyword", pos);
        }
        Ok(())
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// What to do when no keyword matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Consult this specialist as a baseline
    DefaultSpecialist { specialist: SpecialistKind },
    /// Mandate nothing; the operator picks a specialist
    AskOperator,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::DefaultSpecialist {
            specialist: SpecialistKind::Compute,
        }
    }
}

/// A specialist selected by the router and the keywords that selected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub specialist: SpecialistKind,
    pub keywords: Vec<String>,
}

/// Router output for one text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Keyword matches, in priority order
    pub matches: Vec<RouteMatch>,

    /// Set when nothing matched and a default specialist applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<SpecialistKind>,

    pub table_version: String,
}

impl RouteDecision {
    /// Specialists to consult, in order.
    pub fn specialists(&self) -> Vec<SpecialistKind> {
        if self.matches.is_empty() {
            return self.fallback.into_iter().collect();
        }
        self.matches.iter().map(|m| m.specialist).collect()
    }

    /// Nothing matched and the policy leaves the choice to the operator.
    pub fn needs_operator(&self) -> bool {
        self.matches.is_empty() && self.fallback.is_none()
    }

    pub fn keywords_for(&self, kind: SpecialistKind) -> &[String] {
        self.matches
            .iter()
            .find(|m| m.specialist == kind)
            .map(|m| m.keywords.as_slice())
            .unwrap_or(&[])
    }

    /// One-line reason suitable for a proposal message.
    pub fn reason_for(&self, kind: SpecialistKind) -> String {
        let keywords = self.keywords_for(kind);
        if keywords.is_empty() {
            if self.fallback == Some(kind) {
                return "Baseline check; no routing keyword matched".into();
            }
            return "Requested".into();
        }
        format!("Matched keywords: {}", keywords.join(", "))
    }
}

/// Stateless keyword router.
#[derive(Debug, Clone)]
pub struct Router {
    table: RouteTable,
    fallback: FallbackPolicy,
}

impl Router {
    pub fn new(mut table: RouteTable, fallback: FallbackPolicy) -> Self {
        for rule in &mut table.rules {
            rule.keyword = rule.keyword.trim().to_lowercase();
        }
        Self { table, fallback }
    }

    pub fn builtin() -> Self {
        Self::new(RouteTable::builtin(), FallbackPolicy::default())
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Route free text. Pure: the same text always yields the same decision.
    pub fn route(&self, text: &str) -> RouteDecision {
        let lower = text.to_lowercase();

        // specialist -> (best priority, first rule index, keywords)
        let mut hits: BTreeMap<SpecialistKind, (u32, usize, Vec<String>)> = BTreeMap::new();
        for (index, rule) in self.table.rules.iter().enumerate() {
            if !lower.contains(rule.keyword.as_str()) {
                continue;
            }
            let entry = hits
                .entry(rule.specialist)
                .or_insert((rule.priority, index, Vec::new()));
            if rule.priority < entry.0 {
                entry.0 = rule.priority;
                entry.1 = index;
            }
            if !entry.2.contains(&rule.keyword) {
                entry.2.push(rule.keyword.clone());
            }
        }

        let mut ordered: Vec<_> = hits.into_iter().collect();
        ordered.sort_by_key(|(_, (priority, index, _))| (*priority, *index));

        let matches: Vec<RouteMatch> = ordered
            .into_iter()
            .map(|(specialist, (_, _, keywords))| RouteMatch {
                specialist,
                keywords,
            })
            .collect();

        let fallback = match (matches.is_empty(), self.fallback) {
            (true, FallbackPolicy::DefaultSpecialist { specialist }) => Some(specialist),
            _ => None,
        };

        let decision = RouteDecision {
            fingerprint: None,
            matches,
            fallback,
            table_version: self.table.version.clone(),
        };

        debug!(
            specialists = ?decision.specialists(),
            fallback = decision.fallback.is_some(),
            "Routed text"
        );
        decision
    }

    pub fn route_alert(&self, alert: &Alert) -> RouteDecision {
        let mut decision = self.route(&alert.raw_text);
        decision.fingerprint = Some(alert.fingerprint.clone());
        decision
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::builtin()
    }
}
