//! Investigation persistence.
//!
//! Each investigation has a snapshot (replaced atomically) and an append-only
//! event journal. A signal is journaled before it is acknowledged; on
//! restart, journaled events beyond the snapshot's consumed cursor are
//! replayed.
//!
//! ```text
//! <store_dir>/
//!   <investigation id>/
//!     snapshot.json
//!     events.jsonl
//! ```

use crate::investigation::InvestigationSnapshot;
use ein_common::{EinError, Result, SessionEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

const SNAPSHOT_FILE: &str = "snapshot.json";
const JOURNAL_FILE: &str = "events.jsonl";

/// A persisted investigation: its latest snapshot and the full journal.
#[derive(Debug, Clone)]
pub struct StoredInvestigation {
    pub snapshot: InvestigationSnapshot,
    pub events: Vec<SessionEvent>,
}

impl StoredInvestigation {
    /// Journaled events not yet reflected in the snapshot, in order.
    pub fn unconsumed(&self) -> Vec<SessionEvent> {
        let through = self.snapshot.state.consumed_through;
        let mut events: Vec<SessionEvent> = self
            .events
            .iter()
            .filter(|e| e.seq > through)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// Sequence the next signal should receive.
    pub fn next_event_seq(&self) -> u64 {
        let journaled = self.events.iter().map(|e| e.seq + 1).max().unwrap_or(1);
        journaled.max(self.snapshot.next_event_seq)
    }
}

/// Storage for investigation snapshots and event journals.
///
/// Every failure is reported as [`EinError::Durability`], which is fatal to
/// the investigation involved.
pub trait InvestigationStore: Send + Sync {
    fn append_event(&self, id: &str, event: &SessionEvent) -> Result<()>;

    fn save_snapshot(&self, snapshot: &InvestigationSnapshot) -> Result<()>;

    fn load(&self, id: &str) -> Result<Option<StoredInvestigation>>;

    fn list(&self) -> Result<Vec<String>>;
}

fn durability(context: &str, err: impl std::fmt::Display) -> EinError {
    error!(context, error = %err, "Persistence failure");
    EinError::Durability(format!("{}: {}", context, err))
}

/// JSON files under one directory per investigation.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| durability(&format!("create store dir {}", root.display()), e))?;
        debug!(root = %root.display(), "Opened investigation store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(EinError::InvestigationNotFound(id.to_string()));
        }
        Ok(self.root.join(id))
    }
}

impl InvestigationStore for JsonFileStore {
    fn append_event(&self, id: &str, event: &SessionEvent) -> Result<()> {
        let dir = self.dir(id)?;
        fs::create_dir_all(&dir).map_err(|e| durability("create investigation dir", e))?;

        let mut line = serde_json::to_string(event).map_err(|e| durability("encode event", e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(JOURNAL_FILE))
            .map_err(|e| durability("open journal", e))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| durability("append journal", e))?;

        debug!(investigation_id = %id, seq = event.seq, "Event journaled");
        Ok(())
    }

    fn save_snapshot(&self, snapshot: &InvestigationSnapshot) -> Result<()> {
        let id = &snapshot.state.id;
        let dir = self.dir(id)?;
        fs::create_dir_all(&dir).map_err(|e| durability("create investigation dir", e))?;

        let json =
            serde_json::to_vec_pretty(snapshot).map_err(|e| durability("encode snapshot", e))?;
        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        fs::write(&tmp, json).map_err(|e| durability("write snapshot", e))?;
        fs::rename(&tmp, dir.join(SNAPSHOT_FILE)).map_err(|e| durability("replace snapshot", e))?;

        debug!(
            investigation_id = %id,
            consumed_through = snapshot.state.consumed_through,
            "Snapshot saved"
        );
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<StoredInvestigation>> {
        let dir = self.dir(id)?;
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if !snapshot_path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&snapshot_path).map_err(|e| durability("read snapshot", e))?;
        let snapshot: InvestigationSnapshot =
            serde_json::from_str(&content).map_err(|e| durability("decode snapshot", e))?;

        let mut events = Vec::new();
        let journal = dir.join(JOURNAL_FILE);
        if journal.exists() {
            let file = fs::File::open(&journal).map_err(|e| durability("open journal", e))?;
            for (n, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| durability("read journal", e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SessionEvent>(&line) {
                    Ok(event) => events.push(event),
                    // A torn final line means the append never completed and
                    // the signal was never acknowledged.
                    Err(e) => {
                        warn!(investigation_id = %id, line = n + 1, error = %e, "Skipping torn journal line");
                    }
                }
            }
        }

        Ok(Some(StoredInvestigation { snapshot, events }))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| durability("list store", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| durability("list store", e))?;
            if entry.path().join(SNAPSHOT_FILE).exists() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[derive(Debug, Default)]
struct MemoryEntry {
    snapshot: Option<InvestigationSnapshot>,
    events: Vec<SessionEvent>,
}

/// Process-local store. Investigations do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvestigationStore for InMemoryStore {
    fn append_event(&self, id: &str, event: &SessionEvent) -> Result<()> {
        self.entries
            .lock()
            .entry(id.to_string())
            .or_default()
            .events
            .push(event.clone());
        Ok(())
    }

    fn save_snapshot(&self, snapshot: &InvestigationSnapshot) -> Result<()> {
        self.entries
            .lock()
            .entry(snapshot.state.id.clone())
            .or_default()
            .snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<StoredInvestigation>> {
        let entries = self.entries.lock();
        Ok(entries.get(id).and_then(|entry| {
            entry.snapshot.clone().map(|snapshot| StoredInvestigation {
                snapshot,
                events: entry.events.clone(),
            })
        }))
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock();
        let mut ids: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.snapshot.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
