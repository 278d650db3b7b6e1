//! End-to-end tests for the signal/query session protocol.
//!
//! Specialists run against static probes, so every scenario is
//! deterministic and needs no infrastructure.

use ein_agents::{DelayedProbe, Observation, Probe, SpecialistRegistry, StaticProbe, UnavailableProbe};
use ein_blackboard::BlackboardState;
use ein_common::{
    Alert, Capability, EinError, FindingFilter, InvestigationStatus, MessageKind, OutputMessage,
    Result, Role, SessionEvent, SpecialistKind,
};
use ein_coordinator::orchestrator::default_strategy;
use ein_coordinator::{CorrelationEngine, HandoffState, Router};
use ein_session::{
    InMemoryStore, InvestigationSnapshot, InvestigationState, InvestigationStore,
    InvestigationView, JsonFileStore, SessionDeps, SessionManager, StoredInvestigation,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(120);

fn deps(probe: Arc<dyn Probe>, store: Arc<dyn InvestigationStore>) -> SessionDeps {
    SessionDeps {
        router: Arc::new(Router::builtin()),
        strategy: default_strategy(),
        registry: SpecialistRegistry::standard(probe),
        correlation: CorrelationEngine::default(),
        store,
    }
}

fn cluster_probe() -> StaticProbe {
    StaticProbe::new()
        .with(
            Capability::InspectStorageCluster,
            Observation::new("osd:osd.5", "OSD down: disk I/O errors", 0.95),
        )
        .with(
            Capability::InspectWorkloads,
            Observation::new("pod:shop/api-0", "Pending: unbound PVC", 0.7),
        )
}

fn manager_with(probe: impl Probe + 'static) -> SessionManager {
    SessionManager::new(deps(Arc::new(probe), Arc::new(InMemoryStore::new())))
}

async fn next_of_kind(
    manager: &SessionManager,
    id: &str,
    cursor: u64,
    kind: MessageKind,
) -> OutputMessage {
    let search = async {
        let mut cursor = cursor;
        loop {
            let page = manager.wait_for_messages(id, cursor).await.unwrap();
            if let Some(found) = page.messages.iter().find(|m| m.kind == kind) {
                return found.clone();
            }
            cursor = page.cursor;
        }
    };
    timeout(WAIT, search).await.expect("message did not arrive")
}

async fn wait_until(
    manager: &SessionManager,
    id: &str,
    pred: impl Fn(&InvestigationView) -> bool,
) -> InvestigationView {
    let mut rx = manager.subscribe(id).unwrap();
    let view = timeout(WAIT, async move {
        rx.wait_for(|v| pred(v)).await.map(|v| (*v).clone())
    })
    .await
    .expect("status did not change");
    view.expect("runner went away")
}

fn kinds(messages: &[OutputMessage]) -> Vec<MessageKind> {
    messages.iter().map(|m| m.kind).collect()
}

// ============================================================================
// Ask-first handoff
// ============================================================================

#[tokio::test]
async fn test_confirmed_storage_handoff_yields_proposal_then_synthesis() {
    let store = Arc::new(InMemoryStore::new());
    let manager = SessionManager::new(deps(Arc::new(cluster_probe()), store.clone()));

    let id = manager
        .create_investigation(vec![], Some("ceph osd.5 is down".into()))
        .await
        .unwrap();

    let proposal = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    assert!(proposal.text.contains("Storage Specialist"));
    assert_eq!(proposal.role, Role::Orchestrator);

    let waiting = wait_until(&manager, &id, |v| {
        v.handoff_state == HandoffState::AwaitingConfirmation
    })
    .await;
    assert_eq!(waiting.status, InvestigationStatus::AwaitingInput);
    assert_eq!(waiting.findings, 0);

    manager.send_message(&id, "Yes").unwrap();
    let view = wait_until(&manager, &id, |v| !v.consulted.is_empty()).await;
    assert_eq!(view.handoff_state, HandoffState::Idle);
    assert_eq!(view.consulted, vec![SpecialistKind::Storage]);

    let page = manager.get_messages(&id, 0).unwrap();
    assert_eq!(kinds(&page.messages), vec![MessageKind::Proposal, MessageKind::Synthesis]);
    assert!(page.messages[1].text.contains("osd:osd.5"));

    let findings = manager.findings(&id, &FindingFilter::all()).unwrap();
    assert_eq!(findings.len(), 1);
    assert!((findings[0].confidence - 0.95).abs() < f32::EPSILON);
    assert_eq!(findings[0].author, Role::Specialist(SpecialistKind::Storage));

    let stored = store.load(&id).unwrap().unwrap();
    let path: Vec<HandoffState> = stored
        .snapshot
        .state
        .machine
        .transitions()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(
        path,
        vec![
            HandoffState::ProposingHandoff,
            HandoffState::AwaitingConfirmation,
            HandoffState::SpecialistActive,
            HandoffState::Synthesizing,
            HandoffState::Idle,
        ]
    );
}

#[tokio::test]
async fn test_alert_plan_runs_in_route_order_and_correlates() {
    let manager = manager_with(cluster_probe());
    let alert = Alert::new("fp-osd", "CephOSDDown")
        .with_annotation("summary", "OSD down, PVC stuck Pending");

    let id = manager.create_investigation(vec![alert], None).await.unwrap();

    let greeting = next_of_kind(&manager, &id, 0, MessageKind::Greeting).await;
    assert!(greeting.text.contains("Storage Specialist, then Compute Specialist"));

    let first = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    assert!(first.text.contains("Storage Specialist"));
    manager.provide_confirmation(&id, true, None).unwrap();

    let second = next_of_kind(&manager, &id, first.sequence, MessageKind::Proposal).await;
    assert!(second.text.contains("Compute Specialist"));
    manager.send_message(&id, "go ahead").unwrap();

    let view = wait_until(&manager, &id, |v| v.status == InvestigationStatus::Completed).await;
    assert_eq!(
        view.consulted,
        vec![SpecialistKind::Storage, SpecialistKind::Compute]
    );

    let report = manager.report(&id).unwrap().unwrap();
    let primary = report.primary.unwrap();
    assert_eq!(primary.lead_author, Role::Specialist(SpecialistKind::Storage));
    assert_eq!(report.per_alert.len(), 1);
    assert_eq!(report.per_alert[0].findings.len(), 2);

    let last = manager.get_messages(&id, 0).unwrap().messages.pop().unwrap();
    assert_eq!(last.kind, MessageKind::Report);
    assert!(last.text.contains("# Correlation Report"));
}

#[tokio::test]
async fn test_free_text_consults_every_routed_specialist() {
    let manager = manager_with(cluster_probe());
    let id = manager
        .create_investigation(vec![], Some("OSD down, PVC stuck Pending".into()))
        .await
        .unwrap();

    let first = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    assert!(first.text.contains("Storage Specialist"));
    manager.send_message(&id, "yes").unwrap();

    let second = next_of_kind(&manager, &id, first.sequence, MessageKind::Proposal).await;
    assert!(second.text.contains("Compute Specialist"));
    assert!(second.text.contains("Matched keywords"));
    manager.send_message(&id, "yes").unwrap();

    let view = wait_until(&manager, &id, |v| v.consulted.len() == 2).await;
    assert_eq!(
        view.consulted,
        vec![SpecialistKind::Storage, SpecialistKind::Compute]
    );
    assert!(view.pending.is_empty());
    assert!(view.plan.iter().all(|p| p.alert.is_none()));
    assert!(!view.report_ready);

    let page = manager.get_messages(&id, 0).unwrap();
    assert_eq!(
        kinds(&page.messages),
        vec![
            MessageKind::Proposal,
            MessageKind::Synthesis,
            MessageKind::Proposal,
            MessageKind::Synthesis,
        ]
    );
}

#[tokio::test]
async fn test_operator_defined_group_leads_the_report() {
    let manager = manager_with(cluster_probe());
    let id = manager
        .create_investigation(vec![], Some("ceph osd.5 is down".into()))
        .await
        .unwrap();
    next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    manager.send_message(&id, "yes").unwrap();
    let synthesis = next_of_kind(&manager, &id, 0, MessageKind::Synthesis).await;

    manager.send_message(&id, "group F0 as ceph-outage").unwrap();
    let reply = next_of_kind(&manager, &id, synthesis.sequence, MessageKind::Reply).await;
    assert!(reply.text.contains("'ceph-outage'"));

    manager.send_message(&id, "group F7 as bogus").unwrap();
    let error = next_of_kind(&manager, &id, reply.sequence, MessageKind::Error).await;
    assert!(error.text.contains("unknown finding F7"));

    manager.send_message(&id, "report").unwrap();
    let view = wait_until(&manager, &id, |v| v.report_ready).await;
    let report = view.report.unwrap();
    let primary = report.primary.unwrap();
    assert_eq!(primary.key, "ceph-outage");
    assert_eq!(primary.lead_author, Role::Specialist(SpecialistKind::Storage));
}

#[tokio::test]
async fn test_operator_selects_a_different_specialist() {
    let manager = manager_with(cluster_probe());
    let id = manager
        .create_investigation(vec![], Some("pod stuck pending in shop".into()))
        .await
        .unwrap();

    let proposal = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    assert!(proposal.text.contains("Compute Specialist"));

    manager
        .provide_confirmation(&id, true, Some(SpecialistKind::Network))
        .unwrap();
    let synthesis = next_of_kind(&manager, &id, proposal.sequence, MessageKind::Synthesis).await;
    assert!(synthesis.text.starts_with("Network Specialist"));

    let view = wait_until(&manager, &id, |v| !v.consulted.is_empty()).await;
    assert_eq!(view.consulted, vec![SpecialistKind::Network]);

    let findings = manager.findings(&id, &FindingFilter::all()).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].subject, "network:cluster");
}

#[tokio::test]
async fn test_ambiguous_reply_keeps_waiting() {
    let manager = manager_with(cluster_probe());
    let id = manager
        .create_investigation(vec![], Some("dns lookups failing".into()))
        .await
        .unwrap();
    let proposal = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;

    manager.send_message(&id, "what would it check?").unwrap();
    let reminder = next_of_kind(&manager, &id, proposal.sequence, MessageKind::Notice).await;
    assert!(reminder.text.contains("Still waiting"));

    let view = manager.status(&id).unwrap();
    assert_eq!(view.handoff_state, HandoffState::AwaitingConfirmation);
    assert_eq!(view.findings, 0);
}

#[tokio::test]
async fn test_greeting_without_alerts_or_message() {
    let manager = manager_with(StaticProbe::new());
    let id = manager.create_investigation(vec![], None).await.unwrap();

    let greeting = next_of_kind(&manager, &id, 0, MessageKind::Greeting).await;
    assert_eq!(greeting.sequence, 1);
    assert!(greeting.text.contains("confirmation"));
}

#[tokio::test]
async fn test_specialist_failure_records_incomplete_finding() {
    let manager = manager_with(UnavailableProbe);
    let alert = Alert::new("fp-dns", "CoreDNSDown");
    let id = manager.create_investigation(vec![alert], None).await.unwrap();

    next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    manager.send_message(&id, "yes").unwrap();

    wait_until(&manager, &id, |v| v.status == InvestigationStatus::Completed).await;
    let findings = manager.findings(&id, &FindingFilter::all()).unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].subject, "alert:fp-dns");
    assert!(findings[0].statement.starts_with("investigation incomplete:"));
    assert!((findings[0].confidence - 0.1).abs() < f32::EPSILON);
}

// ============================================================================
// Signal / query
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_returns_exactly_the_messages_missed() {
    let probe = DelayedProbe::new(Arc::new(cluster_probe()), Duration::from_secs(10));
    let manager = manager_with(probe);
    let id = manager
        .create_investigation(vec![Alert::new("fp-osd", "CephOSDDown")], None)
        .await
        .unwrap();

    next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    let seen = manager.get_messages(&id, 0).unwrap();
    assert_eq!(kinds(&seen.messages), vec![MessageKind::Greeting, MessageKind::Proposal]);
    let cursor = seen.cursor;

    // Accept, then go away while the specialist works.
    let started = tokio::time::Instant::now();
    manager.send_message(&id, "yes").unwrap();
    wait_until(&manager, &id, |v| v.status == InvestigationStatus::Completed).await;
    assert!(started.elapsed() >= Duration::from_secs(30));

    let missed = manager.get_messages(&id, cursor).unwrap();
    assert_eq!(
        kinds(&missed.messages),
        vec![MessageKind::Synthesis, MessageKind::Report]
    );
    let seqs: Vec<u64> = missed.messages.iter().map(|m| m.sequence).collect();
    assert_eq!(seqs, vec![cursor + 1, cursor + 2]);

    assert_eq!(manager.get_messages(&id, cursor).unwrap(), missed);
    assert!(manager.get_messages(&id, missed.cursor).unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_signals_get_gapless_sequences() {
    let manager = Arc::new(manager_with(StaticProbe::new()));
    let id = manager.create_investigation(vec![], None).await.unwrap();

    let mut tasks = Vec::new();
    for client in 0..8 {
        let manager = Arc::clone(&manager);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let mut seqs = Vec::new();
            for i in 0..10 {
                seqs.push(manager.send_message(&id, format!("hello {}-{}", client, i)).unwrap());
            }
            seqs
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        let seqs = task.await.unwrap();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        all.extend(seqs);
    }
    all.sort_unstable();
    assert_eq!(all, (1..=80).collect::<Vec<u64>>());

    wait_until(&manager, &id, |v| v.events_processed == 80).await;
    let page = manager.get_messages(&id, 0).unwrap();
    assert_eq!(page.messages.len(), 81);
    assert_eq!(
        page.messages.iter().filter(|m| m.kind == MessageKind::Reply).count(),
        80
    );
}

#[tokio::test]
async fn test_unknown_investigation() {
    let manager = manager_with(StaticProbe::new());
    assert!(matches!(
        manager.send_message("missing", "hi"),
        Err(EinError::InvestigationNotFound(_))
    ));
    assert!(matches!(
        manager.get_messages("missing", 0),
        Err(EinError::InvestigationNotFound(_))
    ));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_keeps_findings_and_pauses_plan() {
    let manager = manager_with(cluster_probe());
    let alert = Alert::new("fp-osd", "CephOSDDown")
        .with_annotation("summary", "OSD down, PVC stuck Pending");
    let id = manager.create_investigation(vec![alert], None).await.unwrap();

    let first = next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;
    manager.send_message(&id, "yes").unwrap();
    let second = next_of_kind(&manager, &id, first.sequence, MessageKind::Proposal).await;
    let before = manager.findings(&id, &FindingFilter::all()).unwrap();
    assert_eq!(before.len(), 1);

    manager.cancel(&id, Some("checking by hand".into())).unwrap();
    let notice = next_of_kind(&manager, &id, second.sequence, MessageKind::Notice).await;
    assert!(notice.text.contains("Cancelled the handoff to the Compute Specialist"));

    let view = wait_until(&manager, &id, |v| v.handoff_state == HandoffState::Cancelled).await;
    assert!(view.paused);
    assert_eq!(view.status, InvestigationStatus::AwaitingInput);
    assert_eq!(manager.findings(&id, &FindingFilter::all()).unwrap(), before);

    // Resume the plan, decline the remaining specialist, then conclude.
    manager.send_message(&id, "continue").unwrap();
    let again = next_of_kind(&manager, &id, notice.sequence, MessageKind::Proposal).await;
    assert!(again.text.contains("Compute Specialist"));

    manager.send_message(&id, "no").unwrap();
    manager.send_message(&id, "report").unwrap();
    let report = next_of_kind(&manager, &id, again.sequence, MessageKind::Report).await;
    assert!(report.text.contains("Correlation waits on: Compute Specialist"));
    assert!(manager.report(&id).unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_when_idle_is_a_no_op() {
    let manager = manager_with(StaticProbe::new());
    let id = manager.create_investigation(vec![], None).await.unwrap();
    next_of_kind(&manager, &id, 0, MessageKind::Greeting).await;

    manager.cancel(&id, None).unwrap();
    let notice = next_of_kind(&manager, &id, 1, MessageKind::Notice).await;
    assert_eq!(notice.text, "Nothing to cancel.");
    assert_eq!(manager.status(&id).unwrap().handoff_state, HandoffState::Idle);
}

// ============================================================================
// Durability
// ============================================================================

/// Store whose journal can be made to fail.
#[derive(Default)]
struct FlakyJournal {
    inner: InMemoryStore,
    broken: AtomicBool,
}

impl InvestigationStore for FlakyJournal {
    fn append_event(&self, id: &str, event: &SessionEvent) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(EinError::Durability("journal volume is read-only".into()));
        }
        self.inner.append_event(id, event)
    }

    fn save_snapshot(&self, snapshot: &InvestigationSnapshot) -> Result<()> {
        self.inner.save_snapshot(snapshot)
    }

    fn load(&self, id: &str) -> Result<Option<StoredInvestigation>> {
        self.inner.load(id)
    }

    fn list(&self) -> Result<Vec<String>> {
        self.inner.list()
    }
}

#[tokio::test]
async fn test_journal_failure_fails_the_investigation() {
    let store = Arc::new(FlakyJournal::default());
    let manager = SessionManager::new(deps(Arc::new(StaticProbe::new()), store.clone()));
    let id = manager.create_investigation(vec![], None).await.unwrap();
    next_of_kind(&manager, &id, 0, MessageKind::Greeting).await;

    store.broken.store(true, Ordering::SeqCst);
    let err = manager.send_message(&id, "dns is slow").unwrap_err();
    assert!(matches!(err, EinError::Durability(_)));
    assert!(err.to_string().contains("read-only"));

    let view = wait_until(&manager, &id, |v| v.status == InvestigationStatus::Failed).await;
    assert!(view.error.unwrap().contains("read-only"));

    store.broken.store(false, Ordering::SeqCst);
    assert!(matches!(
        manager.send_message(&id, "retry"),
        Err(EinError::InvestigationFailed(_))
    ));

    let error = next_of_kind(&manager, &id, 1, MessageKind::Error).await;
    assert!(error.text.starts_with("Investigation failed"));
}

#[tokio::test]
async fn test_queue_overflow_is_reported() {
    let manager = SessionManager::new(deps(
        Arc::new(DelayedProbe::new(Arc::new(StaticProbe::new()), Duration::from_secs(3600))),
        Arc::new(InMemoryStore::new()),
    ))
    .with_max_pending(2);
    let id = manager
        .create_investigation(vec![], Some("ceph is degraded".into()))
        .await
        .unwrap();
    next_of_kind(&manager, &id, 0, MessageKind::Proposal).await;

    // The specialist now blocks on the slow probe, so nothing is drained.
    manager.send_message(&id, "yes").unwrap();
    wait_until(&manager, &id, |v| v.handoff_state == HandoffState::SpecialistActive).await;

    manager.send_message(&id, "one").unwrap();
    manager.send_message(&id, "two").unwrap();
    assert!(matches!(
        manager.send_message(&id, "three"),
        Err(EinError::QueueOverflow { capacity: 2 })
    ));
}

#[tokio::test]
async fn test_resume_replays_unconsumed_events() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());

    // Simulate a process that journaled two signals and died before
    // processing either.
    let router = Router::builtin();
    let mut state = InvestigationState::new("inv-crashed", Vec::new(), &router);
    state.greeted = true;
    store
        .save_snapshot(&InvestigationSnapshot {
            state,
            blackboard: BlackboardState::default(),
            outbox: Vec::new(),
            next_event_seq: 1,
            saved_at: chrono::Utc::now(),
        })
        .unwrap();
    for (seq, text) in [(1, "ceph osd.5 flapping"), (2, "yes")] {
        store
            .append_event(
                "inv-crashed",
                &SessionEvent {
                    seq,
                    origin: ein_common::EventOrigin::Client,
                    body: ein_common::EventBody::message(text),
                    enqueued_at: chrono::Utc::now(),
                },
            )
            .unwrap();
    }

    let manager = SessionManager::new(deps(Arc::new(cluster_probe()), store.clone()));
    manager.resume("inv-crashed").await.unwrap();

    let view = wait_until(&manager, "inv-crashed", |v| v.events_processed == 2).await;
    assert_eq!(view.consulted, vec![SpecialistKind::Storage]);

    let page = manager.get_messages("inv-crashed", 0).unwrap();
    assert_eq!(kinds(&page.messages), vec![MessageKind::Proposal, MessageKind::Synthesis]);
    assert_eq!(manager.send_message("inv-crashed", "thanks").unwrap(), 3);

    let persisted = store.load("inv-crashed").unwrap().unwrap();
    assert_eq!(persisted.events.len(), 3);
}

#[tokio::test]
async fn test_resume_reruns_interrupted_specialist() {
    let store = Arc::new(InMemoryStore::new());
    let router = Router::builtin();
    let alert = Alert::new("fp-osd", "CephOSDDown");
    let mut state = InvestigationState::new("inv-mid-run", vec![alert], &router);
    state.greeted = true;
    state
        .machine
        .propose(SpecialistKind::Storage, "Matched keywords: osd", Some("fp-osd".into()))
        .unwrap();
    state.machine.publish_proposal().unwrap();
    let _grant = state.machine.confirm().unwrap();

    store
        .save_snapshot(&InvestigationSnapshot {
            state,
            blackboard: BlackboardState::default(),
            outbox: Vec::new(),
            next_event_seq: 1,
            saved_at: chrono::Utc::now(),
        })
        .unwrap();

    let manager = SessionManager::new(deps(Arc::new(cluster_probe()), store));
    manager.resume("inv-mid-run").await.unwrap();

    let view = wait_until(&manager, "inv-mid-run", |v| {
        v.status == InvestigationStatus::Completed
    })
    .await;
    assert_eq!(view.consulted, vec![SpecialistKind::Storage]);

    let page = manager.get_messages("inv-mid-run", 0).unwrap();
    assert_eq!(
        kinds(&page.messages),
        vec![MessageKind::Notice, MessageKind::Synthesis, MessageKind::Report]
    );
    let findings = manager.findings("inv-mid-run", &FindingFilter::all()).unwrap();
    assert_eq!(findings[0].alert.as_deref(), Some("fp-osd"));
}

#[tokio::test]
async fn test_resume_unknown_investigation() {
    let manager = manager_with(StaticProbe::new());
    assert!(matches!(
        manager.resume("never-existed").await,
        Err(EinError::InvestigationNotFound(_))
    ));
}

#[tokio::test]
async fn test_archive_rejects_signals_but_keeps_reads() {
    let manager = manager_with(StaticProbe::new());
    let id = manager.create_investigation(vec![], None).await.unwrap();
    next_of_kind(&manager, &id, 0, MessageKind::Greeting).await;

    manager.archive(&id).await.unwrap();
    assert!(manager.status(&id).unwrap().archived);
    assert!(matches!(
        manager.send_message(&id, "anyone there?"),
        Err(EinError::Archived(_))
    ));
    assert_eq!(manager.get_messages(&id, 0).unwrap().messages.len(), 1);
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn test_batch_correlates_after_every_member_completes() {
    let manager = manager_with(cluster_probe());
    let batch = manager
        .start_batch(vec![
            Alert::new("fp-osd", "CephOSDDown"),
            Alert::new("fp-pod", "KubePodPending"),
        ])
        .await
        .unwrap();

    let members: Vec<String> = manager
        .batch_status(&batch)
        .unwrap()
        .members
        .iter()
        .map(|m| m.investigation_id.clone())
        .collect();
    assert_eq!(members.len(), 2);

    // Nothing is correlated while members are still waiting for the operator.
    for id in &members {
        next_of_kind(&manager, id, 0, MessageKind::Proposal).await;
    }
    assert!(manager.batch_status(&batch).unwrap().report.is_none());

    for id in &members {
        manager.provide_confirmation(id, true, None).unwrap();
    }

    let result = timeout(WAIT, manager.wait_for_batch(&batch))
        .await
        .unwrap()
        .unwrap();
    assert!(result.failed.is_empty());
    assert_eq!(result.findings.len(), 2);
    assert_eq!(result.report.per_alert.len(), 2);

    let primary = result.report.primary.unwrap();
    assert_eq!(primary.lead_author, Role::Specialist(SpecialistKind::Storage));
    assert_eq!(result.report.symptoms.len(), 1);
}
