//! Per-investigation event inbox.
//!
//! Any number of producers may [`signal`](EventQueue::signal) while a single
//! consumer (the investigation runner) drains events in order. Sequence
//! numbers start at 1 and have no gaps: a number is only consumed when the
//! event is actually accepted.
//!
//! Accepting an event and journaling it happen under the same lock, so the
//! journal sees events in sequence order and an event the journal refused is
//! never delivered.

use chrono::Utc;
use ein_common::{EinError, EventBody, EventOrigin, Result, SessionEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Why a queue stopped accepting events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Archived,
    Failed(String),
}

#[derive(Debug)]
struct QueueInner {
    pending: VecDeque<SessionEvent>,
    next_seq: u64,
    closed: Option<CloseReason>,
}

#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self::resume_from(1, capacity)
    }

    /// Queue whose next accepted event gets sequence `next_seq`.
    pub fn resume_from(next_seq: u64, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                next_seq: next_seq.max(1),
                closed: None,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue without journaling.
    pub fn signal(&self, origin: EventOrigin, body: EventBody) -> Result<u64> {
        self.signal_with(origin, body, |_| Ok(()))
    }

    /// Enqueue an event, journaling it before it becomes visible.
    ///
    /// Never waits for processing. Fails when the queue is closed, full, or
    /// the journal refuses the event; in every failure case the sequence
    /// number is not consumed.
    pub fn signal_with<F>(&self, origin: EventOrigin, body: EventBody, journal: F) -> Result<u64>
    where
        F: FnOnce(&SessionEvent) -> Result<()>,
    {
        let mut inner = self.inner.lock();

        match inner.closed {
            Some(CloseReason::Archived) => {
                return Err(EinError::Archived("event queue is closed".into()))
            }
            Some(CloseReason::Failed(ref reason)) => {
                return Err(EinError::InvestigationFailed(reason.clone()))
            }
            None => {}
        }

        if inner.pending.len() >= self.capacity {
            warn!(capacity = self.capacity, "Event queue full");
            return Err(EinError::QueueOverflow {
                capacity: self.capacity,
            });
        }

        let event = SessionEvent {
            seq: inner.next_seq,
            origin,
            body,
            enqueued_at: Utc::now(),
        };
        journal(&event)?;

        let seq = event.seq;
        inner.next_seq += 1;
        inner.pending.push_back(event);
        drop(inner);

        self.notify.notify_one();
        debug!(seq, "Event enqueued");
        Ok(seq)
    }

    /// Re-enqueue a journaled event during recovery, keeping its sequence.
    pub fn push_recovered(&self, event: SessionEvent) {
        let mut inner = self.inner.lock();
        inner.next_seq = inner.next_seq.max(event.seq + 1);
        inner.pending.push_back(event);
        drop(inner);
        self.notify.notify_one();
    }

    /// Wait for the next event. `None` once the queue is closed and empty.
    pub async fn drain_next(&self) -> Option<SessionEvent> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed.is_some() {
                    // Closing discards unprocessed input; it is still in the journal.
                    return None;
                }
                if let Some(event) = inner.pending.pop_front() {
                    debug!(seq = event.seq, "Event dequeued");
                    return Some(event);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Next event if one is ready.
    pub fn try_next(&self) -> Option<SessionEvent> {
        let mut inner = self.inner.lock();
        if inner.closed.is_some() {
            return None;
        }
        inner.pending.pop_front()
    }

    /// Stop accepting events and wake the consumer.
    pub fn close(&self, reason: CloseReason) {
        let mut inner = self.inner.lock();
        if inner.closed.is_none() {
            inner.closed = Some(reason);
        }
        drop(inner);
        self.notify.notify_one();
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.lock().closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }
}
