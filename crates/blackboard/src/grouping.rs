//! Pluggable strategies for clustering findings into incident groups.
//!
//! Every strategy is a pure function of its input: the same findings always
//! produce the same groups, in the same order.

use chrono::Duration;
use ein_common::Finding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type Groups = BTreeMap<String, Vec<Arc<Finding>>>;

/// Partitions findings into named groups.
pub trait GroupingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn group(&self, findings: &[Arc<Finding>]) -> Groups;
}

/// One group per exact subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByResource;

impl GroupingStrategy for ByResource {
    fn name(&self) -> &'static str {
        "resource"
    }

    fn group(&self, findings: &[Arc<Finding>]) -> Groups {
        bucket(findings, |f| f.subject.clone())
    }
}

/// One group per subject prefix (`osd`, `pvc`, `node`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct ByResourceType;

impl GroupingStrategy for ByResourceType {
    fn name(&self) -> &'static str {
        "resource_type"
    }

    fn group(&self, findings: &[Arc<Finding>]) -> Groups {
        bucket(findings, |f| f.resource_type().to_string())
    }
}

/// One group per Kubernetes namespace; cluster-scoped subjects share a group.
///
/// Understands `kind:namespace/name` and `namespace:name` subjects.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByNamespace;

impl ByNamespace {
    fn namespace_of(subject: &str) -> String {
        match subject.split_once(':') {
            Some(("namespace", ns)) if !ns.is_empty() => ns.to_string(),
            Some((_, rest)) => match rest.split_once('/') {
                Some((ns, _)) if !ns.is_empty() => ns.to_string(),
                _ => "cluster".to_string(),
            },
            None => "cluster".to_string(),
        }
    }
}

impl GroupingStrategy for ByNamespace {
    fn name(&self) -> &'static str {
        "namespace"
    }

    fn group(&self, findings: &[Arc<Finding>]) -> Groups {
        bucket(findings, |f| Self::namespace_of(&f.subject))
    }
}

/// Groups findings whose timestamps fall within `window` of the previous one.
#[derive(Debug, Clone, Copy)]
pub struct TemporalWindow {
    pub window: Duration,
}

impl TemporalWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl GroupingStrategy for TemporalWindow {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn group(&self, findings: &[Arc<Finding>]) -> Groups {
        let mut sorted: Vec<Arc<Finding>> = findings.to_vec();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let mut groups = Groups::new();
        let mut current: Option<(String, chrono::DateTime<chrono::Utc>)> = None;

        for finding in sorted {
            let start_new = match &current {
                Some((_, last)) => finding.timestamp - *last > self.window,
                None => true,
            };
            if start_new {
                // Fixed-width start time, so key order is window order.
                let key = format!("window-{}", finding.timestamp.format("%Y-%m-%dT%H:%M:%S%.9fZ"));
                current = Some((key, finding.timestamp));
            }
            if let Some((key, last)) = current.as_mut() {
                *last = finding.timestamp;
                groups.entry(key.clone()).or_default().push(finding);
            }
        }

        groups
    }
}

/// Configurable strategy selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Resource,
    #[default]
    ResourceType,
    Namespace,
    Temporal,
}

impl StrategyKind {
    pub fn build(&self, window_secs: u64) -> Box<dyn GroupingStrategy> {
        match self {
            StrategyKind::Resource => Box::new(ByResource),
            StrategyKind::ResourceType => Box::new(ByResourceType),
            StrategyKind::Namespace => Box::new(ByNamespace),
            StrategyKind::Temporal => Box::new(TemporalWindow::new(Duration::seconds(
                window_secs.min(i64::MAX as u64) as i64,
            ))),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "resource" => Ok(StrategyKind::Resource),
            "resource_type" | "type" => Ok(StrategyKind::ResourceType),
            "namespace" => Ok(StrategyKind::Namespace),
            "temporal" | "time" => Ok(StrategyKind::Temporal),
            other => Err(format!("unknown grouping strategy '{}'", other)),
        }
    }
}

fn bucket<F>(findings: &[Arc<Finding>], key: F) -> Groups
where
    F: Fn(&Finding) -> String,
{
    let mut groups = Groups::new();
    for finding in findings {
        groups
            .entry(key(finding.as_ref()))
            .or_default()
            .push(Arc::clone(finding));
    }
    groups
}
