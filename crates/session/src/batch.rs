//! Multi-alert batches.
//!
//! A batch runs one investigation per alert. Correlation across the batch
//! waits for every member to finish: it is a join over the members, never a
//! race with them. Members that failed contribute whatever evidence they
//! recorded before failing and are listed in the report.

use crate::investigation::InvestigationView;
use chrono::{DateTime, Utc};
use ein_blackboard::Blackboard;
use ein_common::{Alert, Finding, FindingId, InvestigationStatus};
use ein_coordinator::{CorrelationEngine, CorrelationReport};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One investigation taking part in a batch.
pub(crate) struct BatchMember {
    pub id: String,
    pub alert: Alert,
    pub view: watch::Receiver<InvestigationView>,
    pub board: Arc<Blackboard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub members: Vec<String>,
    /// Members that failed before completing
    pub failed: Vec<String>,
    /// The union of member findings, renumbered; report citations refer to these ids
    pub findings: Vec<Finding>,
    pub report: CorrelationReport,
    pub completed_at: DateTime<Utc>,
}

/// Batch progress as seen by clients.
#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    pub id: String,
    pub members: Vec<BatchMemberStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchMemberStatus {
    pub investigation_id: String,
    pub status: InvestigationStatus,
}

pub(crate) struct BatchHandle {
    id: String,
    members: Vec<(String, watch::Receiver<InvestigationView>)>,
    result: watch::Receiver<Option<BatchReport>>,
    _task: JoinHandle<()>,
}

impl BatchHandle {
    pub(crate) fn spawn(id: String, members: Vec<BatchMember>, engine: CorrelationEngine) -> Self {
        let (tx, result) = watch::channel(None);
        let watched = members
            .iter()
            .map(|m| (m.id.clone(), m.view.clone()))
            .collect();

        let batch_id = id.clone();
        let task = tokio::spawn(async move {
            let report = barrier(batch_id, members, engine).await;
            tx.send_replace(Some(report));
        });

        Self {
            id,
            members: watched,
            result,
            _task: task,
        }
    }

    pub(crate) fn view(&self) -> BatchView {
        BatchView {
            id: self.id.clone(),
            members: self
                .members
                .iter()
                .map(|(id, view)| BatchMemberStatus {
                    investigation_id: id.clone(),
                    status: view.borrow().status,
                })
                .collect(),
            report: self.result.borrow().clone(),
        }
    }

    /// Wait for the batch report.
    pub(crate) async fn wait(&self) -> Option<BatchReport> {
        let mut result = self.result.clone();
        result
            .wait_for(|r| r.is_some())
            .await
            .ok()
            .and_then(|r| r.clone())
    }
}

fn finished(view: &InvestigationView) -> bool {
    matches!(
        view.status,
        InvestigationStatus::Completed | InvestigationStatus::Failed
    ) || view.archived
}

async fn barrier(batch_id: String, members: Vec<BatchMember>, engine: CorrelationEngine) -> BatchReport {
    info!(batch_id = %batch_id, members = members.len(), "Batch barrier waiting");

    let waits = members.iter().map(|member| {
        let mut view = member.view.clone();
        async move {
            match view.wait_for(finished).await {
                Ok(v) => v.status,
                // The runner is gone without finishing.
                Err(_) => InvestigationStatus::Failed,
            }
        }
    });
    let outcomes = join_all(waits).await;

    let combined = Blackboard::new();
    let mut failed = Vec::new();
    for (member, status) in members.iter().zip(outcomes) {
        if status != InvestigationStatus::Completed {
            warn!(batch_id = %batch_id, investigation_id = %member.id, "Batch member did not complete");
            failed.push(member.id.clone());
        }
        let mut renumbered = HashMap::new();
        for finding in member.board.effective() {
            let mut copy = finding.as_ref().clone();
            copy.supersedes = None;
            match combined.record(copy) {
                Ok(id) => {
                    renumbered.insert(finding.id, id);
                    let mut replaced = finding.supersedes;
                    while let Some(previous) = replaced {
                        renumbered.entry(previous).or_insert(id);
                        replaced = member.board.get(previous).and_then(|f| f.supersedes);
                    }
                }
                Err(e) => {
                    warn!(batch_id = %batch_id, error = %e, "Skipping finding in batch union");
                }
            }
        }
        // Member groups keep the findings that made it into the union.
        for group in member.board.groups() {
            let ids: Vec<FindingId> = group
                .finding_ids
                .iter()
                .filter_map(|id| renumbered.get(id).copied())
                .collect();
            if ids.is_empty() {
                continue;
            }
            if let Err(e) = combined.define_group(&group.key, ids, group.analysis, group.author) {
                warn!(batch_id = %batch_id, group = %group.key, error = %e, "Skipping group in batch union");
            }
        }
    }

    let alerts: Vec<Alert> = members.iter().map(|m| m.alert.clone()).collect();
    let report = engine.correlate_board(&combined, &alerts);
    info!(
        batch_id = %batch_id,
        findings = combined.len(),
        failed = failed.len(),
        primary = report.primary.as_ref().map(|p| p.key.as_str()).unwrap_or("-"),
        "Batch correlated"
    );

    BatchReport {
        batch_id,
        members: members.iter().map(|m| m.id.clone()).collect(),
        failed,
        findings: combined.all().iter().map(|f| f.as_ref().clone()).collect(),
        report,
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::InvestigationState;
    use chrono::{Duration, TimeZone};
    use ein_common::{Role, SpecialistKind};
    use ein_coordinator::Router;

    #[tokio::test]
    async fn test_member_groups_survive_the_union() {
        let board = Arc::new(Blackboard::new());
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let storage = Role::Specialist(SpecialistKind::Storage);
        let compute = Role::Specialist(SpecialistKind::Compute);

        let osd = board
            .record(Finding::new("osd:osd.5", storage, "flapping", 0.4).with_timestamp(t0))
            .unwrap();
        let pod = board
            .record(
                Finding::new("pod:shop/api-0", compute, "pending", 0.5)
                    .with_timestamp(t0 + Duration::seconds(1)),
            )
            .unwrap();
        board
            .record(
                Finding::new("pod:shop/api-1", compute, "pending", 0.5)
                    .with_timestamp(t0 + Duration::seconds(2)),
            )
            .unwrap();
        board
            .define_group("ceph-outage", [osd, pod], None, Role::Orchestrator)
            .unwrap();
        board
            .record(
                Finding::new("osd:osd.5", storage, "down", 0.9)
                    .with_timestamp(t0 + Duration::seconds(3))
                    .superseding(osd),
            )
            .unwrap();

        let alert = Alert::new("fp-osd", "CephOSDDown");
        let mut state = InvestigationState::new("inv-1", vec![alert.clone()], &Router::builtin());
        state.status = InvestigationStatus::Completed;
        let (_tx, view) = watch::channel(InvestigationView::of(&state, board.len(), 0));
        let member = BatchMember {
            id: "inv-1".into(),
            alert,
            view,
            board,
        };

        let result = barrier("batch-1".into(), vec![member], CorrelationEngine::default()).await;

        // Union order is timestamp order: api-0, api-1, then the corrected OSD.
        assert_eq!(result.findings.len(), 3);
        let primary = result.report.primary.unwrap();
        assert_eq!(primary.key, "ceph-outage");
        assert_eq!(primary.findings, vec![FindingId(0), FindingId(2)]);
        assert_eq!(result.report.symptoms.len(), 1);
    }
}
