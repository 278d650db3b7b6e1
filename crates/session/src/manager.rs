//! Session manager: the signal/query surface over all investigations.
//!
//! Signals (`send_message`, `provide_confirmation`, `cancel`) are journaled
//! and enqueued, never processed inline; they return the event sequence as
//! soon as the event is durable. Queries (`get_messages`, `status`,
//! `findings`, `report`) read published state and change nothing.

use crate::batch::{BatchHandle, BatchMember, BatchReport, BatchView};
use crate::investigation::{InvestigationSnapshot, InvestigationState, InvestigationView};
use crate::outbox::Outbox;
use crate::queue::{CloseReason, EventQueue};
use crate::runner::{InvestigationRunner, SessionDeps};
use crate::store::{InMemoryStore, InvestigationStore, JsonFileStore};
use chrono::Utc;
use ein_agents::SpecialistRegistry;
use ein_blackboard::Blackboard;
use ein_common::{
    Alert, EinError, EventBody, EventOrigin, Finding, FindingFilter, MessagePage, Result,
    SpecialistKind,
};
use ein_coordinator::orchestrator::default_strategy;
use ein_coordinator::{CorrelationEngine, CorrelationReport, EinConfig, Router};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_MAX_PENDING: usize = 1024;

/// Live handles for one investigation.
struct InvestigationHandle {
    queue: Arc<EventQueue>,
    outbox: Arc<Outbox>,
    board: Arc<Blackboard>,
    alerts: Vec<Alert>,
    view: watch::Receiver<InvestigationView>,
    task: Mutex<Option<JoinHandle<()>>>,
}

pub struct SessionManager {
    deps: Arc<SessionDeps>,
    max_pending: usize,
    investigations: RwLock<HashMap<String, Arc<InvestigationHandle>>>,
    batches: RwLock<HashMap<String, Arc<BatchHandle>>>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            max_pending: DEFAULT_MAX_PENDING,
            investigations: RwLock::new(HashMap::new()),
            batches: RwLock::new(HashMap::new()),
        }
    }

    /// Per-investigation limit of unprocessed events.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    /// Build a manager from configuration with the rule-based orchestrator.
    pub fn from_config(config: &EinConfig, registry: SpecialistRegistry) -> anyhow::Result<Self> {
        let router = config.build_router()?;
        let store: Arc<dyn InvestigationStore> = match config.session.store_dir {
            Some(ref dir) => Arc::new(JsonFileStore::open(dir)?),
            None => Arc::new(InMemoryStore::new()),
        };

        let deps = SessionDeps {
            router: Arc::new(router),
            strategy: default_strategy(),
            registry,
            correlation: CorrelationEngine::new(
                config.correlation.strategy,
                config.correlation.window_secs,
            ),
            store,
        };
        Ok(Self::new(deps).with_max_pending(config.session.max_pending_events))
    }

    pub fn router(&self) -> &Router {
        &self.deps.router
    }

    /// Start an investigation for `alerts`.
    ///
    /// With no alerts and no initial message the investigation greets the
    /// operator; an initial message is enqueued as a system event.
    pub async fn create_investigation(
        &self,
        alerts: Vec<Alert>,
        initial_message: Option<String>,
    ) -> Result<String> {
        self.create(alerts, initial_message, None)
    }

    fn create(
        &self,
        alerts: Vec<Alert>,
        initial_message: Option<String>,
        batch: Option<String>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let mut state = InvestigationState::new(&id, alerts, &self.deps.router);
        if let Some(batch) = batch {
            state = state.with_batch(batch);
        }

        info!(
            investigation_id = %id,
            alerts = state.alerts.len(),
            planned = state.plan.len(),
            "Creating investigation"
        );

        self.launch(
            state,
            Arc::new(Blackboard::new()),
            Arc::new(Outbox::new()),
            Arc::new(EventQueue::new(self.max_pending)),
            initial_message.is_some(),
        )?;

        if let Some(text) = initial_message {
            self.signal(&id, EventOrigin::System, EventBody::message(text))?;
        }
        Ok(id)
    }

    /// Persist the starting snapshot and spawn the runner.
    fn launch(
        &self,
        state: InvestigationState,
        board: Arc<Blackboard>,
        outbox: Arc<Outbox>,
        queue: Arc<EventQueue>,
        has_initial_message: bool,
    ) -> Result<Arc<InvestigationHandle>> {
        let id = state.id.clone();
        self.deps.store.save_snapshot(&InvestigationSnapshot {
            state: state.clone(),
            blackboard: board.state(),
            outbox: outbox.snapshot(),
            next_event_seq: queue.next_seq(),
            saved_at: Utc::now(),
        })?;

        let (tx, rx) = watch::channel(InvestigationView::of(&state, board.len(), outbox.latest()));
        let handle = Arc::new(InvestigationHandle {
            queue: Arc::clone(&queue),
            outbox: Arc::clone(&outbox),
            board: Arc::clone(&board),
            alerts: state.alerts.clone(),
            view: rx,
            task: Mutex::new(None),
        });

        let mut investigations = self.investigations.write();
        if let Some(existing) = investigations.get(&id) {
            return Ok(Arc::clone(existing));
        }
        investigations.insert(id, Arc::clone(&handle));
        drop(investigations);

        let runner = InvestigationRunner::new(
            state,
            board,
            outbox,
            queue,
            Arc::clone(&self.deps),
            tx,
            has_initial_message,
        );
        *handle.task.lock() = Some(tokio::spawn(runner.run()));
        Ok(handle)
    }

    fn handle(&self, id: &str) -> Result<Arc<InvestigationHandle>> {
        self.investigations
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EinError::InvestigationNotFound(id.to_string()))
    }

    /// Journal and enqueue an event.
    fn signal(&self, id: &str, origin: EventOrigin, body: EventBody) -> Result<u64> {
        let handle = self.handle(id)?;
        {
            let view = handle.view.borrow();
            if view.archived {
                return Err(EinError::Archived(id.to_string()));
            }
            if let Some(ref reason) = view.error {
                return Err(EinError::InvestigationFailed(reason.clone()));
            }
        }

        let store = Arc::clone(&self.deps.store);
        let result = handle
            .queue
            .signal_with(origin, body, |event| store.append_event(id, event));

        if let Err(ref e) = result {
            if e.is_fatal() {
                error!(investigation_id = %id, error = %e, "Signal could not be accepted");
                handle.queue.close(CloseReason::Failed(e.to_string()));
            }
        }
        result
    }

    /// Send operator text. Returns the event sequence.
    pub fn send_message(&self, id: &str, text: impl Into<String>) -> Result<u64> {
        self.signal(id, EventOrigin::Client, EventBody::message(text))
    }

    /// Answer the pending proposal, optionally choosing another specialist.
    pub fn provide_confirmation(
        &self,
        id: &str,
        confirmed: bool,
        specialist: Option<SpecialistKind>,
    ) -> Result<u64> {
        self.signal(
            id,
            EventOrigin::Client,
            EventBody::Confirmation {
                confirmed,
                specialist,
            },
        )
    }

    pub fn cancel(&self, id: &str, reason: Option<String>) -> Result<u64> {
        self.signal(id, EventOrigin::Client, EventBody::cancellation(reason))
    }

    /// Messages after `since_cursor`. Safe to repeat.
    pub fn get_messages(&self, id: &str, since_cursor: u64) -> Result<MessagePage> {
        Ok(self.handle(id)?.outbox.since(since_cursor))
    }

    /// Wait until a message beyond `cursor` exists, then return the page.
    pub async fn wait_for_messages(&self, id: &str, cursor: u64) -> Result<MessagePage> {
        let handle = self.handle(id)?;
        handle.outbox.wait_beyond(cursor).await;
        Ok(handle.outbox.since(cursor))
    }

    pub fn status(&self, id: &str) -> Result<InvestigationView> {
        Ok(self.handle(id)?.view.borrow().clone())
    }

    /// Watch the published status of an investigation.
    pub fn subscribe(&self, id: &str) -> Result<watch::Receiver<InvestigationView>> {
        Ok(self.handle(id)?.view.clone())
    }

    pub fn findings(&self, id: &str, filter: &FindingFilter) -> Result<Vec<Finding>> {
        let handle = self.handle(id)?;
        Ok(handle
            .board
            .read(filter)
            .iter()
            .map(|f| f.as_ref().clone())
            .collect())
    }

    pub fn report(&self, id: &str) -> Result<Option<CorrelationReport>> {
        Ok(self.handle(id)?.view.borrow().report.clone())
    }

    /// Stop accepting events and shut the runner down. Reads keep working.
    pub async fn archive(&self, id: &str) -> Result<()> {
        let handle = self.handle(id)?;
        handle.queue.close(CloseReason::Archived);

        let task = handle.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(investigation_id = %id, error = %e, "Runner task ended abnormally");
            }
        }
        info!(investigation_id = %id, "Archive requested");
        Ok(())
    }

    /// Load a persisted investigation and continue it.
    ///
    /// Journaled events the snapshot has not consumed are replayed in order;
    /// a specialist interrupted mid-run is run again.
    pub async fn resume(&self, id: &str) -> Result<InvestigationView> {
        if let Ok(handle) = self.handle(id) {
            return Ok(handle.view.borrow().clone());
        }

        let stored = self
            .deps
            .store
            .load(id)?
            .ok_or_else(|| EinError::InvestigationNotFound(id.to_string()))?;

        let next_seq = stored.next_event_seq();
        let replay = stored.unconsumed();
        let snapshot = stored.snapshot;

        let board = Arc::new(Blackboard::from_state(snapshot.blackboard)?);
        let outbox = Arc::new(Outbox::from_messages(snapshot.outbox));
        let queue = Arc::new(EventQueue::resume_from(next_seq, self.max_pending));

        info!(
            investigation_id = %id,
            replay = replay.len(),
            state = %snapshot.state.machine.state(),
            "Resuming investigation"
        );

        if snapshot.state.archived || snapshot.state.error.is_some() {
            let reason = match snapshot.state.error {
                Some(ref e) => CloseReason::Failed(e.clone()),
                None => CloseReason::Archived,
            };
            queue.close(reason);
            let (_tx, rx) = watch::channel(InvestigationView::of(
                &snapshot.state,
                board.len(),
                outbox.latest(),
            ));
            let handle = Arc::new(InvestigationHandle {
                queue,
                outbox,
                board,
                alerts: snapshot.state.alerts.clone(),
                view: rx,
                task: Mutex::new(None),
            });
            self.investigations
                .write()
                .entry(id.to_string())
                .or_insert(handle);
            return self.status(id);
        }

        for event in replay {
            queue.push_recovered(event);
        }
        let handle = self.launch(snapshot.state, board, outbox, queue, true)?;
        let view = handle.view.borrow().clone();
        Ok(view)
    }

    /// Investigation ids, live and persisted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.investigations.read().keys().cloned().collect();
        ids.extend(self.deps.store.list()?);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Start one investigation per alert, correlated together once all of
    /// them have finished.
    pub async fn start_batch(&self, alerts: Vec<Alert>) -> Result<String> {
        if alerts.is_empty() {
            return Err(EinError::Config("a batch needs at least one alert".into()));
        }
        let batch_id = Uuid::new_v4().to_string();

        let mut members = Vec::with_capacity(alerts.len());
        for alert in alerts {
            let id = self.create(vec![alert.clone()], None, Some(batch_id.clone()))?;
            let handle = self.handle(&id)?;
            members.push(BatchMember {
                id,
                alert,
                view: handle.view.clone(),
                board: Arc::clone(&handle.board),
            });
        }

        info!(batch_id = %batch_id, members = members.len(), "Batch started");
        let batch = BatchHandle::spawn(batch_id.clone(), members, self.deps.correlation);
        self.batches.write().insert(batch_id.clone(), Arc::new(batch));
        Ok(batch_id)
    }

    fn batch(&self, batch_id: &str) -> Result<Arc<BatchHandle>> {
        self.batches
            .read()
            .get(batch_id)
            .cloned()
            .ok_or_else(|| EinError::InvestigationNotFound(batch_id.to_string()))
    }

    pub fn batch_status(&self, batch_id: &str) -> Result<BatchView> {
        Ok(self.batch(batch_id)?.view())
    }

    /// Wait for a batch's correlation report.
    pub async fn wait_for_batch(&self, batch_id: &str) -> Result<BatchReport> {
        let batch = self.batch(batch_id)?;
        batch.wait().await.ok_or_else(|| {
            EinError::InvestigationFailed(format!("batch {} ended without a report", batch_id))
        })
    }

    /// Alerts an investigation was created for.
    pub fn alerts(&self, id: &str) -> Result<Vec<Alert>> {
        Ok(self.handle(id)?.alerts.clone())
    }
}
