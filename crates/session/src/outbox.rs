//! Cursor-addressed output log.
//!
//! Messages are appended by the investigation runner and read by clients
//! with the last sequence they saw. Reading never changes anything, so a
//! client can poll, disconnect, and poll again with an older cursor to get
//! exactly the messages it missed.

use chrono::Utc;
use ein_common::{MessageKind, MessagePage, OutputMessage, Role};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug)]
pub struct Outbox {
    messages: RwLock<Vec<OutputMessage>>,
    latest: watch::Sender<u64>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self::from_messages(Vec::new())
    }

    /// Restore from persisted messages. Sequences must be 1..=n.
    pub fn from_messages(messages: Vec<OutputMessage>) -> Self {
        let last = messages.last().map(|m| m.sequence).unwrap_or(0);
        let (latest, _) = watch::channel(last);
        Self {
            messages: RwLock::new(messages),
            latest,
        }
    }

    /// Append a message and return its sequence number.
    pub fn append(&self, role: Role, kind: MessageKind, text: impl Into<String>) -> u64 {
        let mut messages = self.messages.write();
        let sequence = messages.len() as u64 + 1;
        messages.push(OutputMessage {
            sequence,
            role,
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        });
        drop(messages);

        self.latest.send_replace(sequence);
        debug!(sequence, kind = ?kind, "Message appended");
        sequence
    }

    /// Messages with a sequence greater than `cursor`.
    ///
    /// The returned cursor is the last sequence included, or the input
    /// cursor (clamped to the latest sequence) when there is nothing new.
    pub fn since(&self, cursor: u64) -> MessagePage {
        let messages = self.messages.read();
        let total = messages.len() as u64;
        let start = cursor.min(total) as usize;
        let page: Vec<OutputMessage> = messages[start..].to_vec();
        let cursor = page.last().map(|m| m.sequence).unwrap_or(start as u64);
        MessagePage {
            messages: page,
            cursor,
        }
    }

    pub fn snapshot(&self) -> Vec<OutputMessage> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest(&self) -> u64 {
        *self.latest.borrow()
    }

    /// Wait until a message beyond `cursor` exists.
    pub async fn wait_beyond(&self, cursor: u64) {
        let mut rx = self.latest.subscribe();
        // The sender lives as long as self, so this only ends on success.
        let _ = rx.wait_for(|latest| *latest > cursor).await;
    }

    /// Wait for the first message of `kind` after `cursor` and return it.
    pub async fn wait_for_kind(&self, cursor: u64, kind: MessageKind) -> OutputMessage {
        let mut cursor = cursor;
        loop {
            let page = self.since(cursor);
            if let Some(found) = page.messages.iter().find(|m| m.kind == kind) {
                return found.clone();
            }
            cursor = page.cursor;
            self.wait_beyond(cursor).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ein_common::SpecialistKind;
    use proptest::prelude::*;

    fn filled(n: usize) -> Outbox {
        let outbox = Outbox::new();
        for i in 0..n {
            outbox.append(Role::Orchestrator, MessageKind::Notice, format!("m{}", i));
        }
        outbox
    }

    #[test]
    fn test_sequences_are_gapless() {
        let outbox = filled(3);
        let seqs: Vec<u64> = outbox.snapshot().iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(outbox.latest(), 3);
    }

    #[test]
    fn test_since_is_idempotent() {
        let outbox = filled(2);
        let first = outbox.since(0);
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.cursor, 2);

        assert_eq!(outbox.since(0), first);
        assert!(outbox.since(first.cursor).is_empty());
        assert_eq!(outbox.since(first.cursor).cursor, 2);
    }

    #[test]
    fn test_stale_cursor_replays_exactly_the_gap() {
        let outbox = filled(5);
        let page = outbox.since(2);
        let seqs: Vec<u64> = page.messages.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_cursor_beyond_end_is_clamped() {
        let outbox = filled(1);
        let page = outbox.since(40);
        assert!(page.is_empty());
        assert_eq!(page.cursor, 1);
    }

    #[test]
    fn test_restore_continues_sequence() {
        let outbox = Outbox::from_messages(filled(2).snapshot());
        let seq = outbox.append(
            Role::Specialist(SpecialistKind::Storage),
            MessageKind::Reply,
            "after restart",
        );
        assert_eq!(seq, 3);
    }

    proptest! {
        /// A client that polls at arbitrary points, sometimes losing its
        /// cursor and falling back to an older one, still sees every
        /// message exactly once, in order.
        #[test]
        fn prop_reconnect_never_loses_or_duplicates(
            bursts in prop::collection::vec((0usize..5, any::<bool>()), 1..20)
        ) {
            let outbox = Outbox::new();
            let mut cursor = 0u64;
            let mut seen: Vec<u64> = Vec::new();

            for (appended, disconnect) in bursts {
                for i in 0..appended {
                    outbox.append(Role::Orchestrator, MessageKind::Notice, format!("m{}", i));
                }
                let page = outbox.since(cursor);
                if disconnect {
                    // Response lost: the client keeps its old cursor.
                    continue;
                }
                seen.extend(page.messages.iter().map(|m| m.sequence));
                cursor = page.cursor;
            }
            seen.extend(outbox.since(cursor).messages.iter().map(|m| m.sequence));

            let expected: Vec<u64> = (1..=outbox.len() as u64).collect();
            prop_assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn test_wait_for_kind() {
        let outbox = std::sync::Arc::new(filled(1));
        let waiter = {
            let outbox = outbox.clone();
            tokio::spawn(async move { outbox.wait_for_kind(0, MessageKind::Report).await })
        };
        outbox.append(Role::Orchestrator, MessageKind::Notice, "working");
        outbox.append(Role::Orchestrator, MessageKind::Report, "# Correlation Report");

        let found = waiter.await.unwrap();
        assert_eq!(found.sequence, 3);
    }
}
