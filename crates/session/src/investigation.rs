//! The investigation aggregate.
//!
//! An investigation is one unit of work and one unit of recovery: its alerts,
//! the consultation plan the router produced, the handoff machine, the
//! blackboard, and the outbox are persisted together as a snapshot.

use chrono::{DateTime, Utc};
use ein_blackboard::BlackboardState;
use ein_common::{Alert, InvestigationStatus, OutputMessage, SpecialistKind};
use ein_coordinator::{
    CorrelationReport, HandoffRequest, HandoffState, HandoffStateMachine, Router,
};
use serde::{Deserialize, Serialize};

/// A specialist the router requires for one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedConsult {
    /// Alert fingerprint; `None` for free-text investigations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub specialist: SpecialistKind,
    pub reason: String,
}

impl PlannedConsult {
    fn same_target(&self, alert: Option<&str>, specialist: SpecialistKind) -> bool {
        self.specialist == specialist && self.alert.as_deref() == alert
    }
}

/// Build the consultation plan for a set of alerts, in alert order and
/// route-decision order within each alert.
///
/// Returns the plan plus the fingerprints of alerts that matched nothing and
/// need the operator to choose a specialist.
pub fn plan_for(router: &Router, alerts: &[Alert]) -> (Vec<PlannedConsult>, Vec<String>) {
    let mut plan: Vec<PlannedConsult> = Vec::new();
    let mut unrouted = Vec::new();

    for alert in alerts {
        let decision = router.route_alert(alert);
        if decision.needs_operator() {
            unrouted.push(alert.fingerprint.clone());
            continue;
        }
        for kind in decision.specialists() {
            let fp = Some(alert.fingerprint.as_str());
            if plan.iter().any(|p| p.same_target(fp, kind)) {
                continue;
            }
            plan.push(PlannedConsult {
                alert: Some(alert.fingerprint.clone()),
                specialist: kind,
                reason: decision.reason_for(kind),
            });
        }
    }

    (plan, unrouted)
}

/// Mutable investigation state owned by its runner.
///
/// The blackboard and outbox are shared with readers and live outside this
/// struct; [`InvestigationSnapshot`] brings them together for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationState {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub alerts: Vec<Alert>,
    pub machine: HandoffStateMachine,

    /// Router-mandated consultations, in order
    pub plan: Vec<PlannedConsult>,
    /// Alerts no keyword matched under the ask-operator policy
    #[serde(default)]
    pub unrouted: Vec<String>,
    /// Every completed consultation, mandated or not
    #[serde(default)]
    pub consulted: Vec<PlannedConsult>,
    /// Mandated consultations the operator declined
    #[serde(default)]
    pub declined: Vec<PlannedConsult>,

    /// Set by a cancellation; the plan is not advanced until the operator
    /// says to continue
    #[serde(default)]
    pub paused: bool,
    /// Set once the plan ran out and the operator was told
    #[serde(default)]
    pub plan_finished: bool,
    #[serde(default)]
    pub greeted: bool,

    pub status: InvestigationStatus,
    /// Last event sequence whose effects are in this state
    #[serde(default)]
    pub consumed_through: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<CorrelationReport>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

impl InvestigationState {
    pub fn new(id: impl Into<String>, alerts: Vec<Alert>, router: &Router) -> Self {
        let (plan, unrouted) = plan_for(router, &alerts);
        Self {
            id: id.into(),
            created_at: Utc::now(),
            alerts,
            machine: HandoffStateMachine::new(),
            plan,
            unrouted,
            consulted: Vec::new(),
            declined: Vec::new(),
            paused: false,
            plan_finished: false,
            greeted: false,
            status: InvestigationStatus::Running,
            consumed_through: 0,
            report: None,
            archived: false,
            error: None,
            batch: None,
        }
    }

    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    /// Mandated consultations neither done nor declined, in plan order.
    pub fn pending(&self) -> Vec<&PlannedConsult> {
        self.plan
            .iter()
            .filter(|p| {
                !self.is_consulted(p.alert.as_deref(), p.specialist)
                    && !self.declined.contains(p)
            })
            .collect()
    }

    pub fn pending_specialists(&self) -> Vec<SpecialistKind> {
        let mut kinds = Vec::new();
        for p in self.pending() {
            if !kinds.contains(&p.specialist) {
                kinds.push(p.specialist);
            }
        }
        kinds
    }

    pub fn consulted_specialists(&self) -> Vec<SpecialistKind> {
        let mut kinds = Vec::new();
        for c in &self.consulted {
            if !kinds.contains(&c.specialist) {
                kinds.push(c.specialist);
            }
        }
        kinds
    }

    pub fn is_consulted(&self, alert: Option<&str>, specialist: SpecialistKind) -> bool {
        self.consulted
            .iter()
            .any(|c| c.same_target(alert, specialist))
    }

    /// Every mandated consultation has reached synthesis at least once.
    pub fn plan_complete(&self) -> bool {
        self.plan
            .iter()
            .all(|p| self.is_consulted(p.alert.as_deref(), p.specialist))
    }

    /// The plan entry a request corresponds to.
    pub fn planned(&self, alert: Option<&str>, specialist: SpecialistKind) -> Option<&PlannedConsult> {
        self.plan.iter().find(|p| p.same_target(alert, specialist))
    }

    pub fn alert(&self, fingerprint: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.fingerprint == fingerprint)
    }

    /// Status implied by the machine and the report.
    pub fn derive_status(&self) -> InvestigationStatus {
        if self.error.is_some() {
            return InvestigationStatus::Failed;
        }
        match self.machine.state() {
            HandoffState::AwaitingConfirmation => InvestigationStatus::AwaitingInput,
            HandoffState::Idle | HandoffState::Cancelled => {
                if self.report.is_some() {
                    InvestigationStatus::Completed
                } else {
                    InvestigationStatus::AwaitingInput
                }
            }
            HandoffState::Failed => InvestigationStatus::Failed,
            _ => InvestigationStatus::Running,
        }
    }
}

/// Everything needed to restore an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSnapshot {
    pub state: InvestigationState,
    pub blackboard: BlackboardState,
    pub outbox: Vec<OutputMessage>,
    /// Sequence the next signaled event receives
    pub next_event_seq: u64,
    pub saved_at: DateTime<Utc>,
}

/// Read-only status published after every processed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestigationView {
    pub id: String,
    pub status: InvestigationStatus,
    pub handoff_state: HandoffState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_specialist: Option<SpecialistKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_proposal: Option<HandoffRequest>,
    pub alerts: Vec<Alert>,
    pub plan: Vec<PlannedConsult>,
    pub consulted: Vec<SpecialistKind>,
    pub pending: Vec<SpecialistKind>,
    pub paused: bool,
    pub findings: usize,
    pub messages: u64,
    pub events_processed: u64,
    pub report_ready: bool,
    #[serde(skip)]
    pub report: Option<CorrelationReport>,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

impl InvestigationView {
    pub fn of(state: &InvestigationState, findings: usize, messages: u64) -> Self {
        Self {
            id: state.id.clone(),
            status: state.status,
            handoff_state: state.machine.state(),
            active_specialist: state.machine.active_specialist(),
            pending_proposal: state.machine.pending_proposal().cloned(),
            alerts: state.alerts.clone(),
            plan: state.plan.clone(),
            consulted: state.consulted_specialists(),
            pending: state.pending_specialists(),
            paused: state.paused,
            findings,
            messages,
            events_processed: state.consumed_through,
            report_ready: state.report.is_some(),
            report: state.report.clone(),
            archived: state.archived,
            error: state.error.clone(),
            batch: state.batch.clone(),
        }
    }
}
