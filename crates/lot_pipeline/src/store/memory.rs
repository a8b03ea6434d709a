//! In-memory store. Test hooks simulate a concurrent writer (`before_next_commit`)
//! and infrastructure outages (`fail_next_commits`).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use lot_core::{EntryId, SessionId, SessionSnapshot};

use super::{committed_snapshot, CommitBatch, LotteryStore, StoreError};
use crate::events::AllocationEvent;
use crate::result::AllocationResult;

type Tamper = Box<dyn FnOnce(&mut SessionSnapshot) + Send>;

struct SessionRecord {
    snapshot: SessionSnapshot,
    result: Option<AllocationResult>,
    outbox: BTreeMap<EntryId, AllocationEvent>,
}

#[derive(Default)]
struct Faults {
    outages: u32,
    before_commit: VecDeque<Tamper>,
    attempts: u32,
}

#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<BTreeMap<SessionId, SessionRecord>>,
    faults: Mutex<Faults>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        let store = Self::new();
        store.insert(snapshot);
        store
    }

    /// Add or replace a session (its result and outbox are cleared).
    pub fn insert(&self, mut snapshot: SessionSnapshot) {
        snapshot.normalize();
        let record = SessionRecord {
            snapshot,
            result: None,
            outbox: BTreeMap::new(),
        };
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        sessions.insert(record.snapshot.session.session_id.clone(), record);
    }

    /// The next `n` commit attempts fail as unavailable before touching state.
    pub fn fail_next_commits(&self, n: u32) {
        if let Ok(mut faults) = lock(&self.faults) {
            faults.outages += n;
        }
    }

    /// Run `f` against the stored rows at the start of a later commit attempt,
    /// after the run has read its snapshot. Queued hooks fire one per attempt.
    pub fn before_next_commit<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionSnapshot) + Send + 'static,
    {
        if let Ok(mut faults) = lock(&self.faults) {
            faults.before_commit.push_back(Box::new(f));
        }
    }

    /// Commit calls seen so far, failed ones included.
    pub fn commit_attempts(&self) -> u32 {
        lock(&self.faults).map(|f| f.attempts).unwrap_or(0)
    }
}

impl LotteryStore for MemoryStore {
    fn load_snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError> {
        let sessions = lock(&self.sessions)?;
        sessions
            .get(session)
            .map(|r| r.snapshot.clone())
            .ok_or_else(|| StoreError::NotFound(session.clone()))
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        let tamper = {
            let mut faults = lock(&self.faults)?;
            faults.attempts += 1;
            if faults.outages > 0 {
                faults.outages -= 1;
                return Err(StoreError::Unavailable("injected outage".into()));
            }
            faults.before_commit.pop_front()
        };

        let mut sessions = lock(&self.sessions)?;
        let record = sessions
            .get_mut(batch.session_id())
            .ok_or_else(|| StoreError::NotFound(batch.session_id().clone()))?;
        if let Some(f) = tamper {
            f(&mut record.snapshot);
        }

        let next = committed_snapshot(&record.snapshot, &batch.result)?;
        record.snapshot = next;
        record.result = Some(batch.result.clone());
        record.outbox = batch
            .events
            .iter()
            .map(|e| (e.entry_id.clone(), e.clone()))
            .collect();
        Ok(())
    }

    fn pending_events(&self, session: &SessionId) -> Result<Vec<AllocationEvent>, StoreError> {
        let sessions = lock(&self.sessions)?;
        let record = sessions
            .get(session)
            .ok_or_else(|| StoreError::NotFound(session.clone()))?;
        Ok(record.outbox.values().cloned().collect())
    }

    fn ack_events(&self, session: &SessionId, keys: &[EntryId]) -> Result<(), StoreError> {
        let mut sessions = lock(&self.sessions)?;
        let record = sessions
            .get_mut(session)
            .ok_or_else(|| StoreError::NotFound(session.clone()))?;
        for k in keys {
            record.outbox.remove(k);
        }
        Ok(())
    }

    fn load_result(&self, session: &SessionId) -> Result<Option<AllocationResult>, StoreError> {
        let sessions = lock(&self.sessions)?;
        let record = sessions
            .get(session)
            .ok_or_else(|| StoreError::NotFound(session.clone()))?;
        Ok(record.result.clone())
    }
}
