//! Blackboard state types.

use chrono::{DateTime, Utc};
use ein_common::{Finding, FindingFilter, FindingId, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A named set of findings believed to describe one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentGroup {
    /// Grouping key, e.g. `ceph-cluster-failure`
    pub key: String,

    pub finding_ids: BTreeSet<FindingId>,

    /// How the findings relate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,

    pub author: Role,

    pub created_at: DateTime<Utc>,
}

/// Serializable copy of everything on a blackboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlackboardState {
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub groups: Vec<IncidentGroup>,
}

/// A consistent prefix of the log, ordered by timestamp.
///
/// Filtering is applied lazily as the view is iterated.
#[derive(Debug, Clone)]
pub struct FindingsView {
    entries: Vec<Arc<Finding>>,
    filter: FindingFilter,
}

impl FindingsView {
    pub(crate) fn new(mut entries: Vec<Arc<Finding>>, filter: FindingFilter) -> Self {
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Self { entries, filter }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Finding>> + '_ {
        self.entries.iter().filter(move |f| self.filter.matches(f))
    }

    pub fn to_vec(&self) -> Vec<Arc<Finding>> {
        self.iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl IntoIterator for FindingsView {
    type Item = Arc<Finding>;
    type IntoIter = std::vec::IntoIter<Arc<Finding>>;

    fn into_iter(self) -> Self::IntoIter {
        let filter = self.filter;
        self.entries
            .into_iter()
            .filter(|f| filter.matches(f))
            .collect::<Vec<_>>()
            .into_iter()
    }
}
