//! The per-investigation processing loop.
//!
//! One runner task owns an investigation's state. It drains the event queue
//! one event at a time, drives the handoff machine, runs confirmed
//! specialists, and persists a snapshot after every event. Because nothing
//! else mutates the state, at most one transition executes at a time and at
//! most one specialist ever holds control.
//!
//! ```text
//!  signal ──▶ EventQueue ──▶ runner ──▶ HandoffStateMachine
//!                              │              │ ControlGrant
//!                              │              ▼
//!                              │          Specialist ──▶ Blackboard
//!                              ▼
//!                   Outbox ◀── synthesis / proposals / report
//!                              │
//!                              ▼
//!                        InvestigationStore (snapshot)
//! ```

use crate::investigation::{InvestigationSnapshot, InvestigationState, InvestigationView, PlannedConsult};
use crate::outbox::Outbox;
use crate::queue::{CloseReason, EventQueue};
use crate::store::InvestigationStore;
use chrono::Utc;
use ein_agents::{SpecialistContext, SpecialistRegistry};
use ein_blackboard::{Blackboard, BlackboardTools};
use ein_common::{
    EinError, EventBody, InvestigationStatus, MessageKind, Result, Role, SessionEvent,
    SpecialistKind,
};
use ein_coordinator::orchestrator::context_for;
use ein_coordinator::{
    parse_affirmation, parse_specialist_request, Action, ControlGrant, CorrelationEngine,
    HandoffRequest, HandoffState, OrchestratorStrategy, RouteDecision, Router,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Confidence of the finding recorded when a specialist cannot finish.
pub const INCOMPLETE_CONFIDENCE: f32 = 0.1;

const GREETING: &str = "Hello! I'm the investigation orchestrator. Describe what you are seeing \
or name a component (ceph, pod, dns, mysql) and I will propose the right specialist. \
Nothing is handed off without your confirmation.";

/// Collaborators shared by every investigation.
pub struct SessionDeps {
    pub router: Arc<Router>,
    pub strategy: Arc<dyn OrchestratorStrategy>,
    pub registry: SpecialistRegistry,
    pub correlation: CorrelationEngine,
    pub store: Arc<dyn InvestigationStore>,
}

pub(crate) struct InvestigationRunner {
    state: InvestigationState,
    board: Arc<Blackboard>,
    outbox: Arc<Outbox>,
    queue: Arc<EventQueue>,
    deps: Arc<SessionDeps>,
    view: watch::Sender<InvestigationView>,
    /// An initial operator message is already queued; skip the greeting
    has_initial_message: bool,
}

impl InvestigationRunner {
    pub(crate) fn new(
        state: InvestigationState,
        board: Arc<Blackboard>,
        outbox: Arc<Outbox>,
        queue: Arc<EventQueue>,
        deps: Arc<SessionDeps>,
        view: watch::Sender<InvestigationView>,
        has_initial_message: bool,
    ) -> Self {
        Self {
            state,
            board,
            outbox,
            queue,
            deps,
            view,
            has_initial_message,
        }
    }

    pub(crate) async fn run(mut self) {
        let id = self.state.id.clone();
        info!(investigation_id = %id, alerts = self.state.alerts.len(), "Investigation runner started");

        if let Err(e) = self.start().await {
            self.fail(e.to_string());
            return;
        }

        while let Some(event) = self.queue.drain_next().await {
            self.state.status = InvestigationStatus::Running;
            self.publish();

            let handled = self.handle(event).await;
            if let Err(e) = self.absorb(handled) {
                self.fail(e.to_string());
                return;
            }
            let advanced = self.advance();
            if let Err(e) = self.absorb(advanced) {
                self.fail(e.to_string());
                return;
            }

            self.state.status = self.state.derive_status();
            if let Err(e) = self.persist() {
                self.fail(e.to_string());
                return;
            }
            self.publish();
        }

        match self.queue.close_reason() {
            Some(CloseReason::Archived) => {
                self.state.archived = true;
                if let Err(e) = self.persist() {
                    warn!(investigation_id = %id, error = %e, "Could not persist archive marker");
                }
                self.publish();
                info!(investigation_id = %id, "Investigation archived");
            }
            Some(CloseReason::Failed(reason)) => self.fail(reason),
            None => {}
        }
    }

    async fn start(&mut self) -> Result<()> {
        if !self.state.greeted {
            self.introduce();
            self.state.greeted = true;
        }

        if let Some(grant) = self.state.machine.resume_grant() {
            info!(
                investigation_id = %self.state.id,
                specialist = %grant.holder(),
                "Re-running specialist interrupted by restart"
            );
            self.notice(format!(
                "Resuming the {} investigation that was interrupted.",
                grant.holder().display_name()
            ));
            self.run_specialist(grant).await?;
        }

        self.advance()?;
        self.state.status = self.state.derive_status();
        self.persist()?;
        self.publish();
        Ok(())
    }

    fn introduce(&mut self) {
        if self.state.alerts.is_empty() {
            if !self.has_initial_message {
                self.say(MessageKind::Greeting, GREETING);
            }
            return;
        }

        let mut text = format!("Investigating {} alert(s):", self.state.alerts.len());
        for alert in &self.state.alerts {
            text.push_str(&format!("\n- {}", alert.headline()));
        }
        if !self.state.plan.is_empty() {
            let names: Vec<String> = self
                .state
                .plan
                .iter()
                .map(|p| p.specialist.display_name().to_string())
                .collect();
            text.push_str(&format!("\nPlan: consult {}.", names.join(", then ")));
        }
        self.say(MessageKind::Greeting, text);

        for fingerprint in self.state.unrouted.clone() {
            self.notice(format!(
                "No routing keyword matched alert {}. Tell me which specialist to consult \
                 (storage, compute, network, database).",
                fingerprint
            ));
        }
    }

    /// Keep going after non-fatal errors; hand fatal ones back.
    fn absorb(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(investigation_id = %self.state.id, error = %e, "Event handling failed");
                // Leave no half-finished cycle behind.
                if matches!(
                    self.state.machine.state(),
                    HandoffState::ProposingHandoff
                        | HandoffState::SpecialistActive
                        | HandoffState::Synthesizing
                ) {
                    if let Err(cancel_err) = self.state.machine.cancel() {
                        warn!(
                            investigation_id = %self.state.id,
                            error = %cancel_err,
                            "Could not abandon the interrupted handoff"
                        );
                    }
                }
                self.say(MessageKind::Error, e.to_string());
                Ok(())
            }
        }
    }

    async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        self.state.consumed_through = event.seq;
        info!(
            investigation_id = %self.state.id,
            seq = event.seq,
            kind = ?event.kind(),
            origin = ?event.origin,
            state = %self.state.machine.state(),
            "Processing event"
        );

        match event.body {
            EventBody::Cancellation { reason } => self.on_cancel(reason),
            EventBody::Confirmation {
                confirmed,
                specialist,
            } => self.on_answer(confirmed, specialist).await,
            EventBody::Message { text } => self.on_message(text).await,
        }
    }

    fn on_cancel(&mut self, reason: Option<String>) -> Result<()> {
        if !self.state.machine.cancel()? {
            self.notice("Nothing to cancel.");
            return Ok(());
        }

        self.state.paused = true;
        let target = self
            .state
            .machine
            .current()
            .map(|r| r.to.display_name())
            .unwrap_or("the specialist");
        let reason = reason.map(|r| format!(" ({})", r)).unwrap_or_default();
        self.notice(format!(
            "Cancelled the handoff to the {}{}. Findings recorded so far are kept. \
             Say 'continue' to resume or 'report' to conclude.",
            target, reason
        ));
        Ok(())
    }

    async fn on_answer(&mut self, confirmed: bool, selection: Option<SpecialistKind>) -> Result<()> {
        if self.state.machine.state() != HandoffState::AwaitingConfirmation {
            self.notice("There is no handoff waiting for confirmation.");
            return Ok(());
        }
        let proposed = self.state.machine.current().map(|r| r.to);

        match selection {
            Some(kind) if confirmed && Some(kind) != proposed => {
                let rejected = self.state.machine.reject()?;
                self.decline(&rejected);
                self.notice(format!("Switching to the {} as requested.", kind.display_name()));

                self.state
                    .machine
                    .propose(kind, "Selected by operator", rejected.alert)?;
                self.state.machine.publish_proposal()?;
                let grant = self.state.machine.confirm()?;
                self.run_specialist(grant).await
            }
            _ if confirmed => {
                let grant = self.state.machine.confirm()?;
                self.run_specialist(grant).await
            }
            _ => {
                let rejected = self.state.machine.reject()?;
                self.decline(&rejected);
                self.notice(format!("Skipped the {}.", rejected.to.display_name()));
                Ok(())
            }
        }
    }

    async fn on_message(&mut self, text: String) -> Result<()> {
        match self.state.machine.state() {
            HandoffState::AwaitingConfirmation => {
                if let Some(answer) = parse_affirmation(&text) {
                    return self.on_answer(answer, None).await;
                }
                let proposed = self.state.machine.current().map(|r| r.to);
                match parse_specialist_request(&text.to_lowercase()) {
                    Some(kind) if Some(kind) != proposed => self.on_answer(true, Some(kind)).await,
                    _ => {
                        let name = proposed.map(|k| k.display_name()).unwrap_or("the specialist");
                        self.notice(format!(
                            "Still waiting for your answer: hand off to the {}? Reply 'yes' or 'no', \
                             or name a different specialist.",
                            name
                        ));
                        Ok(())
                    }
                }
            }
            HandoffState::Idle | HandoffState::Cancelled => self.decide(text).await,
            other => {
                debug!(state = %other, "Message arrived mid-cycle");
                self.notice("A specialist is working; your message was noted.");
                Ok(())
            }
        }
    }

    async fn decide(&mut self, text: String) -> Result<()> {
        let ctx = context_for(
            &self.deps.router,
            &text,
            self.state.pending_specialists(),
            self.state.consulted_specialists(),
            self.board.len(),
        );

        match self.deps.strategy.decide(&ctx).await? {
            Action::Propose { specialist, reason } => {
                if ctx.route.matches.iter().any(|m| m.specialist == specialist) {
                    self.extend_plan(&ctx.route);
                }
                let alert = self.alert_for(specialist);
                self.propose(specialist, reason, alert)
            }
            Action::Reply { text } => {
                self.say(MessageKind::Reply, text);
                Ok(())
            }
            Action::Report => {
                self.report();
                Ok(())
            }
            Action::Group { key, findings } => {
                let tools = BlackboardTools::new(Arc::clone(&self.board), Role::Orchestrator);
                tools.define_group(&key, &findings, None)?;
                let ids: Vec<String> = findings.iter().map(ToString::to_string).collect();
                self.say(
                    MessageKind::Reply,
                    format!(
                        "Grouped {} as incident '{}'. Correlation will score them together.",
                        ids.join(", "),
                        key
                    ),
                );
                Ok(())
            }
            Action::Continue => {
                self.state.paused = false;
                self.state.declined.clear();
                self.state.plan_finished = false;
                if self.state.pending().is_empty() {
                    self.say(
                        MessageKind::Reply,
                        "Every mandated specialist has been consulted. Say 'report' for the \
                         correlation report or describe something else to look at.",
                    );
                }
                Ok(())
            }
        }
    }

    /// Add every specialist a routed message requires to the plan, in route
    /// order, so the ones after the first are proposed in turn.
    fn extend_plan(&mut self, route: &RouteDecision) {
        for m in &route.matches {
            let alert = self.alert_for(m.specialist);
            if self.state.planned(alert.as_deref(), m.specialist).is_some() {
                continue;
            }
            debug!(
                investigation_id = %self.state.id,
                specialist = %m.specialist,
                "Planned consultation from operator message"
            );
            self.state.plan.push(PlannedConsult {
                alert,
                specialist: m.specialist,
                reason: route.reason_for(m.specialist),
            });
            self.state.plan_finished = false;
        }
    }

    /// Alert an operator-requested specialist should look at: the one it is
    /// still mandated for, otherwise the first alert.
    fn alert_for(&self, specialist: SpecialistKind) -> Option<String> {
        self.state
            .pending()
            .into_iter()
            .find(|p| p.specialist == specialist)
            .and_then(|p| p.alert.clone())
            .or_else(|| self.state.alerts.first().map(|a| a.fingerprint.clone()))
    }

    /// Propose the next mandated specialist, or conclude once the plan is done.
    fn advance(&mut self) -> Result<()> {
        if !matches!(
            self.state.machine.state(),
            HandoffState::Idle | HandoffState::Cancelled
        ) || self.state.paused
        {
            return Ok(());
        }

        let next = self.state.pending().first().map(|p| (*p).clone());
        if let Some(next) = next {
            return self.propose(next.specialist, next.reason, next.alert);
        }

        if self.state.plan.is_empty() || self.state.plan_finished {
            return Ok(());
        }
        self.state.plan_finished = true;

        if self.state.plan_complete() {
            // Free-text investigations conclude only when asked.
            if !self.state.alerts.is_empty() {
                self.correlate();
            }
        } else {
            let skipped: Vec<&str> = self
                .state
                .declined
                .iter()
                .map(|p| p.specialist.display_name())
                .collect();
            self.notice(format!(
                "Skipped: {}. Say 'continue' to revisit them or 'report' for the findings so far.",
                skipped.join(", ")
            ));
        }
        Ok(())
    }

    fn propose(&mut self, specialist: SpecialistKind, reason: String, alert: Option<String>) -> Result<()> {
        let request = self
            .state
            .machine
            .propose(specialist, reason, alert)?
            .clone();

        let target = request
            .alert
            .as_deref()
            .and_then(|fp| self.state.alert(fp))
            .map(|a| format!(" for {}", a.headline()))
            .unwrap_or_default();
        self.say(
            MessageKind::Proposal,
            format!(
                "I'd like to hand off to the {}{}. Reason: {}. Proceed? (yes/no)",
                specialist.display_name(),
                target,
                request.reason
            ),
        );

        self.state.machine.publish_proposal()
    }

    fn decline(&mut self, rejected: &HandoffRequest) {
        if let Some(planned) = self
            .state
            .planned(rejected.alert.as_deref(), rejected.to)
            .cloned()
        {
            if !self.state.declined.contains(&planned) {
                self.state.declined.push(planned);
            }
        }
    }

    async fn run_specialist(&mut self, grant: ControlGrant) -> Result<()> {
        let kind = grant.holder();
        let request = self
            .state
            .machine
            .current()
            .cloned()
            .ok_or_else(|| EinError::InvalidTransition {
                state: self.state.machine.state().to_string(),
                action: "run specialist without a request".into(),
            })?;

        // A crash from here on re-runs the specialist on resume.
        self.state.status = InvestigationStatus::Running;
        self.persist()?;
        self.publish();

        let alert = request
            .alert
            .as_deref()
            .and_then(|fp| self.state.alert(fp))
            .cloned();
        let mut tools = BlackboardTools::new(Arc::clone(&self.board), Role::Specialist(kind));
        if let Some(ref alert) = alert {
            tools = tools.for_alert(alert.fingerprint.clone());
        }

        let outcome = match self.deps.registry.get(kind) {
            Ok(specialist) => {
                let ctx = SpecialistContext {
                    grant: &grant,
                    alert: alert.as_ref(),
                    tools: &tools,
                };
                specialist.investigate(&ctx).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(recorded) => {
                debug!(investigation_id = %self.state.id, specialist = %kind, recorded, "Specialist returned");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    investigation_id = %self.state.id,
                    specialist = %kind,
                    error = %e,
                    "Specialist failed; recording partial result"
                );
                let subject = alert
                    .as_ref()
                    .map(|a| format!("alert:{}", a.fingerprint))
                    .unwrap_or_else(|| format!("{}:cluster", kind));
                tools.record(
                    subject,
                    format!("investigation incomplete: {}", e),
                    INCOMPLETE_CONFIDENCE,
                )?;
            }
        }

        self.state.machine.complete(grant)?;

        let delta = self.board.since(self.state.machine.synthesis_mark());
        let summary = self.deps.strategy.summarize(kind, &delta).await?;
        self.say(MessageKind::Synthesis, summary);
        self.state.machine.finish_synthesis(self.board.len())?;

        let consult = self
            .state
            .planned(request.alert.as_deref(), kind)
            .cloned()
            .unwrap_or(PlannedConsult {
                alert: request.alert,
                specialist: kind,
                reason: request.reason,
            });
        self.state.consulted.push(consult);
        Ok(())
    }

    /// Answer a report request: the correlation report once every mandated
    /// specialist has been consulted, otherwise the findings so far.
    fn report(&mut self) {
        if self.state.plan_complete() {
            self.correlate();
            return;
        }

        let tools = BlackboardTools::new(Arc::clone(&self.board), Role::Orchestrator);
        let mut text = tools.print_findings_report("Findings Report");
        let waiting: Vec<&str> = self
            .state
            .pending()
            .iter()
            .map(|p| p.specialist.display_name())
            .chain(self.state.declined.iter().map(|p| p.specialist.display_name()))
            .collect();
        text.push_str(&format!(
            "\n\nCorrelation waits on: {}.",
            waiting.join(", ")
        ));
        self.say(MessageKind::Report, text);
    }

    fn correlate(&mut self) {
        let report = self
            .deps
            .correlation
            .correlate_board(&self.board, &self.state.alerts);
        info!(
            investigation_id = %self.state.id,
            primary = report.primary.as_ref().map(|p| p.key.as_str()).unwrap_or("-"),
            symptoms = report.symptoms.len(),
            "Correlation complete"
        );
        self.say(MessageKind::Report, report.render_markdown());
        self.state.report = Some(report);
        self.state.plan_finished = true;
    }

    fn say(&self, kind: MessageKind, text: impl Into<String>) {
        self.outbox.append(Role::Orchestrator, kind, text);
    }

    fn notice(&self, text: impl Into<String>) {
        self.say(MessageKind::Notice, text);
    }

    fn persist(&self) -> Result<()> {
        let snapshot = InvestigationSnapshot {
            state: self.state.clone(),
            blackboard: self.board.state(),
            outbox: self.outbox.snapshot(),
            next_event_seq: self.queue.next_seq(),
            saved_at: Utc::now(),
        };
        self.deps.store.save_snapshot(&snapshot)
    }

    fn publish(&self) {
        self.view.send_replace(InvestigationView::of(
            &self.state,
            self.board.len(),
            self.outbox.latest(),
        ));
    }

    /// End the investigation after a fatal error. Findings and messages are kept.
    fn fail(&mut self, reason: String) {
        error!(investigation_id = %self.state.id, error = %reason, "Investigation failed");

        self.state.machine.fail();
        self.state.error = Some(reason.clone());
        self.state.status = InvestigationStatus::Failed;
        self.say(MessageKind::Error, format!("Investigation failed: {}", reason));
        self.queue.close(CloseReason::Failed(reason));

        if let Err(e) = self.persist() {
            warn!(investigation_id = %self.state.id, error = %e, "Could not persist failure");
        }
        self.publish();
    }
}
