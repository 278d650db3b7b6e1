//! Correlation of findings into one incident report.
//!
//! Incident groups defined on the blackboard claim their findings first;
//! the rest are grouped with the configured [`StrategyKind`]. Each group is
//! scored by its aggregate confidence (the sum of its findings'
//! confidences). The best group is the primary root cause; ties go to the
//! group whose first finding is earliest, then to the smaller key. Every
//! other group is reported as a cascading symptom.
//!
//! The report depends only on its inputs, so the same blackboard snapshot
//! always produces the same report.

use chrono::{DateTime, Utc};
use ein_blackboard::{Blackboard, IncidentGroup, StrategyKind};
use ein_common::{Alert, Finding, FindingId, Role};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;
use tracing::info;

/// One scored group of findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub key: String,
    pub aggregate_confidence: f32,
    pub first_seen: DateTime<Utc>,
    /// Highest-confidence finding in the group
    pub lead: FindingId,
    pub lead_author: Role,
    pub summary: String,
    pub findings: Vec<FindingId>,
    /// Analysis attached when the group was defined explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

/// Root-cause references for one alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRca {
    pub fingerprint: String,
    pub name: String,
    /// Findings recorded while investigating this alert
    pub findings: Vec<FindingId>,
    /// Those of them that fall in the primary group
    pub primary: Vec<FindingId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub strategy: StrategyKind,
    pub primary: Option<IncidentSummary>,
    pub symptoms: Vec<IncidentSummary>,
    pub per_alert: Vec<AlertRca>,
    /// Every finding the report draws on, by id
    pub citations: Vec<FindingId>,
}

impl CorrelationReport {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::from("# Correlation Report\n\n");

        let Some(ref primary) = self.primary else {
            out.push_str("No findings were recorded; nothing to correlate.\n");
            return out;
        };

        out.push_str("## Primary Root Cause\n\n");
        let _ = writeln!(
            out,
            "**{}** (aggregate confidence {:.2}, lead {} by {})",
            primary.key, primary.aggregate_confidence, primary.lead, primary.lead_author
        );
        let _ = writeln!(out, "{}\n", primary.summary);
        if let Some(ref analysis) = primary.analysis {
            let _ = writeln!(out, "{}\n", analysis);
        }

        if !self.symptoms.is_empty() {
            out.push_str("## Cascading Symptoms\n\n");
            for s in &self.symptoms {
                let _ = writeln!(
                    out,
                    "- **{}** ({:.2}): {} [{}]",
                    s.key,
                    s.aggregate_confidence,
                    s.summary,
                    join_ids(&s.findings)
                );
            }
            out.push('\n');
        }

        if !self.per_alert.is_empty() {
            out.push_str("## Per-Alert RCA\n\n");
            for a in &self.per_alert {
                let refs = if a.primary.is_empty() {
                    "no direct evidence in primary cause".to_string()
                } else {
                    format!("primary evidence {}", join_ids(&a.primary))
                };
                let _ = writeln!(
                    out,
                    "- {} ({}): {} findings, {}",
                    a.name,
                    a.fingerprint,
                    a.findings.len(),
                    refs
                );
            }
            out.push('\n');
        }

        let _ = writeln!(out, "## Evidence\n\n{}", join_ids(&self.citations));
        out
    }
}

fn join_ids(ids: &[FindingId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy)]
pub struct CorrelationEngine {
    strategy: StrategyKind,
    window_secs: u64,
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(StrategyKind::default(), 300)
    }
}

impl CorrelationEngine {
    pub fn new(strategy: StrategyKind, window_secs: u64) -> Self {
        Self {
            strategy,
            window_secs,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Correlate the blackboard's effective findings and its defined groups.
    pub fn correlate_board(&self, board: &Blackboard, alerts: &[Alert]) -> CorrelationReport {
        let defined = follow_corrections(&board.all(), board.groups());
        self.correlate_with_groups(&board.effective(), &defined, alerts)
    }

    pub fn correlate(&self, findings: &[Arc<Finding>], alerts: &[Alert]) -> CorrelationReport {
        self.correlate_with_groups(findings, &[], alerts)
    }

    /// Correlate with explicit incident groups. A finding named by a defined
    /// group is scored with that group and left out of the strategy buckets;
    /// ids that are not among `findings` are ignored.
    pub fn correlate_with_groups(
        &self,
        findings: &[Arc<Finding>],
        defined: &[IncidentGroup],
        alerts: &[Alert],
    ) -> CorrelationReport {
        let mut groups: BTreeMap<String, Vec<Arc<Finding>>> = BTreeMap::new();
        let mut analyses: HashMap<String, String> = HashMap::new();
        let mut claimed: HashSet<FindingId> = HashSet::new();

        for group in defined {
            let members: Vec<Arc<Finding>> = findings
                .iter()
                .filter(|f| group.finding_ids.contains(&f.id) && !claimed.contains(&f.id))
                .cloned()
                .collect();
            if members.is_empty() {
                continue;
            }
            claimed.extend(members.iter().map(|f| f.id));
            if let Some(ref analysis) = group.analysis {
                analyses.insert(group.key.clone(), analysis.clone());
            }
            groups.entry(group.key.clone()).or_default().extend(members);
        }

        let rest: Vec<Arc<Finding>> = findings
            .iter()
            .filter(|f| !claimed.contains(&f.id))
            .cloned()
            .collect();
        for (key, members) in self.strategy.build(self.window_secs).group(&rest) {
            groups.entry(key).or_default().extend(members);
        }

        let mut scored: Vec<IncidentSummary> = groups
            .into_iter()
            .filter_map(|(key, members)| {
                let analysis = analyses.remove(&key);
                summarize_group(key, &members).map(|mut s| {
                    s.analysis = analysis;
                    s
                })
            })
            .collect();
        scored.sort_by(rank);

        let mut citations: Vec<FindingId> = findings.iter().map(|f| f.id).collect();
        citations.sort();
        citations.dedup();

        let mut iter = scored.into_iter();
        let primary = iter.next();
        let symptoms: Vec<IncidentSummary> = iter.collect();

        let per_alert = alerts
            .iter()
            .map(|alert| {
                let mut ids: Vec<FindingId> = findings
                    .iter()
                    .filter(|f| f.alert.as_deref() == Some(alert.fingerprint.as_str()))
                    .map(|f| f.id)
                    .collect();
                ids.sort();
                let in_primary = primary
                    .as_ref()
                    .map(|p| ids.iter().filter(|id| p.findings.contains(id)).copied().collect())
                    .unwrap_or_default();
                AlertRca {
                    fingerprint: alert.fingerprint.clone(),
                    name: alert.name.clone(),
                    findings: ids,
                    primary: in_primary,
                }
            })
            .collect();

        info!(
            strategy = ?self.strategy,
            findings = findings.len(),
            defined_groups = defined.len(),
            primary = primary.as_ref().map(|p| p.key.as_str()).unwrap_or("none"),
            symptoms = symptoms.len(),
            "Correlated findings"
        );

        CorrelationReport {
            strategy: self.strategy,
            primary,
            symptoms,
            per_alert,
            citations,
        }
    }
}

/// Point group members at the correction that replaced them, if any.
fn follow_corrections(all: &[Arc<Finding>], groups: Vec<IncidentGroup>) -> Vec<IncidentGroup> {
    let replaced_by: HashMap<FindingId, FindingId> = all
        .iter()
        .filter_map(|f| f.supersedes.map(|previous| (previous, f.id)))
        .collect();

    groups
        .into_iter()
        .map(|mut group| {
            group.finding_ids = group
                .finding_ids
                .iter()
                .map(|&id| {
                    let mut current = id;
                    // Corrections always point at older entries, so this ends.
                    while let Some(&next) = replaced_by.get(&current) {
                        current = next;
                    }
                    current
                })
                .collect();
            group
        })
        .collect()
}

fn summarize_group(key: String, members: &[Arc<Finding>]) -> Option<IncidentSummary> {
    let lead = members.iter().max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            // Prefer the earlier finding among equals.
            .then(b.id.cmp(&a.id))
    })?;
    let first_seen = members.iter().map(|f| f.timestamp).min()?;

    let mut ids: Vec<FindingId> = members.iter().map(|f| f.id).collect();
    ids.sort();

    Some(IncidentSummary {
        aggregate_confidence: members.iter().map(|f| f.confidence).sum(),
        first_seen,
        lead: lead.id,
        lead_author: lead.author,
        summary: format!("{}: {}", lead.subject, lead.statement),
        findings: ids,
        analysis: None,
        key,
    })
}

fn rank(a: &IncidentSummary, b: &IncidentSummary) -> Ordering {
    b.aggregate_confidence
        .total_cmp(&a.aggregate_confidence)
        .then(a.first_seen.cmp(&b.first_seen))
        .then_with(|| a.key.cmp(&b.key))
}
