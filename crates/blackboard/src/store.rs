//! The blackboard: an append-only findings log.
//!
//! Findings live in an arena with monotonic indices. A finding's id is its
//! index, so `FindingId(n)` always refers to the n-th recorded entry. Entries
//! are never removed or mutated; corrections are new entries carrying a
//! `supersedes` reference.
//!
//! Writers serialize on a short append lock. Readers copy the current prefix
//! of `Arc` pointers and release the lock before doing any work, so a reader
//! never holds up a writer for longer than that copy and never sees a torn
//! entry.

use crate::grouping::GroupingStrategy;
use crate::types::{BlackboardState, FindingsView, IncidentGroup};
use chrono::Utc;
use ein_common::{EinError, Finding, FindingFilter, FindingId, Result, Role};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared findings store for one investigation.
#[derive(Debug, Default)]
pub struct Blackboard {
    log: RwLock<Vec<Arc<Finding>>>,
    groups: RwLock<BTreeMap<String, IncidentGroup>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a blackboard from persisted state.
    ///
    /// Ids must be dense and in order, as the log assigned them.
    pub fn from_state(state: BlackboardState) -> Result<Self> {
        for (index, finding) in state.findings.iter().enumerate() {
            if finding.id != FindingId(index as u64) {
                return Err(EinError::InvalidFinding(format!(
                    "persisted finding at position {} has id {}",
                    index, finding.id
                )));
            }
        }

        let log = state.findings.into_iter().map(Arc::new).collect();
        let groups = state
            .groups
            .into_iter()
            .map(|g| (g.key.clone(), g))
            .collect();

        Ok(Self {
            log: RwLock::new(log),
            groups: RwLock::new(groups),
        })
    }

    /// Append a finding. Returns its assigned id.
    pub fn record(&self, mut finding: Finding) -> Result<FindingId> {
        finding.validate()?;

        let id = {
            let mut log = self.log.write();
            if let Some(previous) = finding.supersedes {
                let target = log.get(previous.0 as usize).ok_or_else(|| {
                    EinError::InvalidFinding(format!("supersedes unknown finding {}", previous))
                })?;
                if finding.timestamp <= target.timestamp {
                    return Err(EinError::InvalidFinding(format!(
                        "correction of {} must be newer than the finding it replaces",
                        previous
                    )));
                }
            }
            let id = FindingId(log.len() as u64);
            finding.id = id;
            log.push(Arc::new(finding));
            id
        };

        debug!(finding_id = %id, "Recorded finding");
        Ok(id)
    }

    /// Timestamp-ordered view of the findings matching `filter`.
    pub fn read(&self, filter: &FindingFilter) -> FindingsView {
        FindingsView::new(self.prefix(), filter.clone())
    }

    /// All findings in timestamp order.
    pub fn all(&self) -> Vec<Arc<Finding>> {
        self.read(&FindingFilter::all()).to_vec()
    }

    /// Findings that no later entry supersedes, in timestamp order.
    pub fn effective(&self) -> Vec<Arc<Finding>> {
        let prefix = self.prefix();
        let superseded: HashSet<FindingId> = prefix.iter().filter_map(|f| f.supersedes).collect();
        FindingsView::new(prefix, FindingFilter::all())
            .into_iter()
            .filter(|f| !superseded.contains(&f.id))
            .collect()
    }

    /// Findings recorded at or after log index `from`, in record order.
    pub fn since(&self, from: usize) -> Vec<Arc<Finding>> {
        let log = self.log.read();
        log.get(from..).map(|s| s.to_vec()).unwrap_or_default()
    }

    pub fn get(&self, id: FindingId) -> Option<Arc<Finding>> {
        self.log.read().get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group the effective findings with `strategy`.
    pub fn group(&self, strategy: &dyn GroupingStrategy) -> BTreeMap<String, Vec<Arc<Finding>>> {
        strategy.group(&self.effective())
    }

    /// Record an explicit incident group. Repeating a key merges the ids.
    pub fn define_group(
        &self,
        key: impl Into<String>,
        finding_ids: impl IntoIterator<Item = FindingId>,
        analysis: Option<String>,
        author: Role,
    ) -> Result<()> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EinError::InvalidFinding("group key must not be empty".into()));
        }

        let len = self.len() as u64;
        let ids: BTreeSet<FindingId> = finding_ids.into_iter().collect();
        if let Some(unknown) = ids.iter().find(|id| id.0 >= len) {
            return Err(EinError::InvalidFinding(format!(
                "group '{}' references unknown finding {}",
                key, unknown
            )));
        }

        let mut groups = self.groups.write();
        let group = groups.entry(key.clone()).or_insert_with(|| IncidentGroup {
            key: key.clone(),
            finding_ids: BTreeSet::new(),
            analysis: None,
            author,
            created_at: Utc::now(),
        });
        group.finding_ids.extend(ids);
        if analysis.is_some() {
            group.analysis = analysis;
        }

        info!(group = %key, findings = group.finding_ids.len(), "Defined incident group");
        Ok(())
    }

    pub fn groups(&self) -> Vec<IncidentGroup> {
        self.groups.read().values().cloned().collect()
    }

    /// Serializable copy, for persistence.
    pub fn state(&self) -> BlackboardState {
        BlackboardState {
            findings: self.prefix().iter().map(|f| f.as_ref().clone()).collect(),
            groups: self.groups(),
        }
    }

    fn prefix(&self) -> Vec<Arc<Finding>> {
        self.log.read().clone()
    }
}
