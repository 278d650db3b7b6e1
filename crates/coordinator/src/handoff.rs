//! Ask-first handoff state machine.
//!
//! ```text
//!   Idle ──propose──▶ ProposingHandoff ──publish──▶ AwaitingConfirmation
//!    ▲                                               │        │
//!    │ finish_synthesis                     confirm  │        │ reject
//!    │                                               ▼        ▼
//!   Synthesizing ◀──complete── SpecialistActive            Idle
//!
//!   any non-Idle ──cancel──▶ Cancelled      any ──fail──▶ Failed
//! ```
//!
//! The machine is a plain value. It performs no I/O and never waits; the
//! session runner drives it one event at a time. Control over specialist
//! tools is represented by a [`ControlGrant`] that only [`confirm`] can mint,
//! so nothing else can act as the active specialist.
//!
//! [`confirm`]: HandoffStateMachine::confirm

use chrono::{DateTime, Utc};
use ein_common::{Capability, EinError, Result, Role, SpecialistKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffState {
    Idle,
    ProposingHandoff,
    AwaitingConfirmation,
    SpecialistActive,
    Synthesizing,
    Cancelled,
    Failed,
}

impl HandoffState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffState::Idle => "idle",
            HandoffState::ProposingHandoff => "proposing_handoff",
            HandoffState::AwaitingConfirmation => "awaiting_confirmation",
            HandoffState::SpecialistActive => "specialist_active",
            HandoffState::Synthesizing => "synthesizing",
            HandoffState::Cancelled => "cancelled",
            HandoffState::Failed => "failed",
        }
    }
}

impl fmt::Display for HandoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Proposed,
    Confirmed,
    Rejected,
    InProgress,
    Completed,
}

impl HandoffStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffStatus::Rejected | HandoffStatus::Completed)
    }
}

/// A proposal to hand control to a specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub id: u64,
    pub from: Role,
    pub to: SpecialistKind,
    pub reason: String,
    /// Alert the specialist should look at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub status: HandoffStatus,
    pub proposed_at: DateTime<Utc>,
}

/// Exclusive permission for one specialist to use its tools.
///
/// Minted only by [`HandoffStateMachine::confirm`] (or re-issued on resume)
/// and consumed by [`HandoffStateMachine::complete`].
#[derive(Debug)]
pub struct ControlGrant {
    request_id: u64,
    holder: SpecialistKind,
}

impl ControlGrant {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn holder(&self) -> SpecialistKind {
        self.holder
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.holder.capabilities()
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: HandoffState,
    pub to: HandoffState,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffStateMachine {
    state: HandoffState,
    current: Option<HandoffRequest>,
    /// Finished requests, oldest first
    history: Vec<HandoffRequest>,
    next_id: u64,
    /// Blackboard length at the last synthesis
    synthesis_mark: usize,
    transitions: Vec<Transition>,
}

impl Default for HandoffStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl HandoffStateMachine {
    pub fn new() -> Self {
        Self {
            state: HandoffState::Idle,
            current: None,
            history: Vec::new(),
            next_id: 1,
            synthesis_mark: 0,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    pub fn current(&self) -> Option<&HandoffRequest> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[HandoffRequest] {
        &self.history
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn synthesis_mark(&self) -> usize {
        self.synthesis_mark
    }

    /// Specialist currently holding control, if any.
    pub fn active_specialist(&self) -> Option<SpecialistKind> {
        match (self.state, &self.current) {
            (HandoffState::SpecialistActive, Some(req)) => Some(req.to),
            _ => None,
        }
    }

    /// Specialist waiting on the operator's answer, if any.
    pub fn pending_proposal(&self) -> Option<&HandoffRequest> {
        match self.state {
            HandoffState::ProposingHandoff | HandoffState::AwaitingConfirmation => {
                self.current.as_ref()
            }
            _ => None,
        }
    }

    /// Start a new handoff proposal.
    ///
    /// Fails with `ConcurrentHandoff` while another request is unfinished.
    pub fn propose(
        &mut self,
        to: SpecialistKind,
        reason: impl Into<String>,
        alert: Option<String>,
    ) -> Result<&HandoffRequest> {
        if let Some(active) = self.current.as_ref().filter(|r| !r.status.is_terminal()) {
            warn!(active = active.id, proposed = %to, "Rejected concurrent handoff");
            return Err(EinError::ConcurrentHandoff { active: active.id });
        }
        self.expect_state(&[HandoffState::Idle, HandoffState::Cancelled], "propose")?;

        if let Some(done) = self.current.take() {
            self.history.push(done);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(HandoffRequest {
            id,
            from: Role::Orchestrator,
            to,
            reason: reason.into(),
            alert,
            status: HandoffStatus::Proposed,
            proposed_at: Utc::now(),
        });
        self.transition(HandoffState::ProposingHandoff, "propose");

        info!(request_id = id, specialist = %to, "Handoff proposed");
        self.current
            .as_ref()
            .ok_or_else(|| self.invalid("propose"))
    }

    /// The proposal message has been emitted; wait for the operator.
    pub fn publish_proposal(&mut self) -> Result<()> {
        self.expect_state(&[HandoffState::ProposingHandoff], "publish proposal")?;
        self.transition(HandoffState::AwaitingConfirmation, "publish_proposal");
        Ok(())
    }

    /// Operator said yes: control moves to the proposed specialist.
    pub fn confirm(&mut self) -> Result<ControlGrant> {
        self.expect_state(&[HandoffState::AwaitingConfirmation], "confirm")?;
        let request = self.current.as_mut().ok_or(EinError::InvalidTransition {
            state: HandoffState::AwaitingConfirmation.to_string(),
            action: "confirm".into(),
        })?;

        request.status = HandoffStatus::Confirmed;
        let id = request.id;
        let holder = request.to;
        debug!(request_id = id, "Handoff confirmed");

        request.status = HandoffStatus::InProgress;
        self.transition(HandoffState::SpecialistActive, "confirm");

        info!(request_id = id, specialist = %holder, "Control granted");
        Ok(ControlGrant {
            request_id: id,
            holder,
        })
    }

    /// Operator said no: the request is rejected and the orchestrator is idle.
    pub fn reject(&mut self) -> Result<HandoffRequest> {
        self.expect_state(&[HandoffState::AwaitingConfirmation], "reject")?;
        let request = self.finish_current(HandoffStatus::Rejected)?;
        self.transition(HandoffState::Idle, "reject");

        info!(request_id = request.id, specialist = %request.to, "Handoff rejected");
        Ok(request)
    }

    /// The specialist returns control.
    pub fn complete(&mut self, grant: ControlGrant) -> Result<()> {
        self.expect_state(&[HandoffState::SpecialistActive], "complete")?;
        let current_id = self.current.as_ref().map(|r| r.id);
        if current_id != Some(grant.request_id) {
            return Err(EinError::InvalidTransition {
                state: self.state.to_string(),
                action: format!("complete with stale grant {}", grant.request_id),
            });
        }

        if let Some(request) = self.current.as_mut() {
            request.status = HandoffStatus::Completed;
        }
        self.transition(HandoffState::Synthesizing, "complete");

        info!(request_id = grant.request_id, specialist = %grant.holder, "Control returned");
        Ok(())
    }

    /// The orchestrator has summarized the blackboard delta.
    pub fn finish_synthesis(&mut self, blackboard_len: usize) -> Result<()> {
        self.expect_state(&[HandoffState::Synthesizing], "finish synthesis")?;
        self.synthesis_mark = blackboard_len;
        if let Some(done) = self.current.take() {
            self.history.push(done);
        }
        self.transition(HandoffState::Idle, "finish_synthesis");
        Ok(())
    }

    /// Abort the current cycle. Returns false when there was nothing to cancel.
    pub fn cancel(&mut self) -> Result<bool> {
        match self.state {
            HandoffState::Idle | HandoffState::Cancelled | HandoffState::Failed => {
                debug!(state = %self.state, "Cancel ignored");
                return Ok(false);
            }
            _ => {}
        }

        if let Some(request) = self.current.as_mut() {
            if !request.status.is_terminal() {
                request.status = HandoffStatus::Rejected;
            }
        }
        self.transition(HandoffState::Cancelled, "cancel");

        info!(request_id = ?self.current.as_ref().map(|r| r.id), "Handoff cycle cancelled");
        Ok(true)
    }

    /// Enter `Failed`. Any unfinished request is rejected.
    pub fn fail(&mut self) {
        if let Some(request) = self.current.as_mut() {
            if !request.status.is_terminal() {
                request.status = HandoffStatus::Rejected;
            }
        }
        if self.state != HandoffState::Failed {
            self.transition(HandoffState::Failed, "fail");
        }
    }

    /// Leave `Cancelled` or `Failed` for `Idle`.
    pub fn reset(&mut self) -> Result<()> {
        self.expect_state(&[HandoffState::Cancelled, HandoffState::Failed], "reset")?;
        if let Some(done) = self.current.take() {
            self.history.push(done);
        }
        self.transition(HandoffState::Idle, "reset");
        Ok(())
    }

    /// Re-issue the grant for a specialist interrupted by a restart.
    pub fn resume_grant(&self) -> Option<ControlGrant> {
        match (&self.state, &self.current) {
            (HandoffState::SpecialistActive, Some(req)) if req.status == HandoffStatus::InProgress => {
                Some(ControlGrant {
                    request_id: req.id,
                    holder: req.to,
                })
            }
            _ => None,
        }
    }

    /// Check structural invariants.
    ///
    /// At most one request is unfinished, and it is the current one; the
    /// current request's status agrees with the machine state.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |msg: String| {
            Err(EinError::InvalidTransition {
                state: self.state.to_string(),
                action: msg,
            })
        };

        if let Some(open) = self.history.iter().find(|r| !r.status.is_terminal()) {
            return violation(format!("history holds unfinished request {}", open.id));
        }

        let status = self.current.as_ref().map(|r| r.status);
        let consistent = match self.state {
            HandoffState::ProposingHandoff | HandoffState::AwaitingConfirmation => {
                status == Some(HandoffStatus::Proposed)
            }
            HandoffState::SpecialistActive => status == Some(HandoffStatus::InProgress),
            HandoffState::Synthesizing => status == Some(HandoffStatus::Completed),
            HandoffState::Idle | HandoffState::Cancelled | HandoffState::Failed => {
                status.map_or(true, |s| s.is_terminal())
            }
        };
        if !consistent {
            return violation(format!("request status {:?} inconsistent", status));
        }

        Ok(())
    }

    fn finish_current(&mut self, status: HandoffStatus) -> Result<HandoffRequest> {
        let mut request = self.current.take().ok_or_else(|| self.invalid("finish"))?;
        request.status = status;
        self.history.push(request.clone());
        Ok(request)
    }

    fn expect_state(&self, allowed: &[HandoffState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &str) -> EinError {
        EinError::InvalidTransition {
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    fn transition(&mut self, to: HandoffState, action: &str) {
        let from = self.state;
        self.state = to;
        self.transitions.push(Transition {
            from,
            to,
            action: action.to_string(),
            request_id: self.current.as_ref().map(|r| r.id),
            at: Utc::now(),
        });
        debug!(from = %from, to = %to, action, "Handoff transition");
    }
}
