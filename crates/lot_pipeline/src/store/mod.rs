//! Durable store seam for the Result Committer.
//!
//! `commit` is the single all-or-nothing write: it re-checks the snapshot the run
//! was computed against (session still `closed`, every slot's capacity equal to
//! the run's `capacity_before`, every group revision unchanged) and then writes
//! entry statuses, group aggregates, capacities, the result, the `committed`
//! state and the outbox events together, or nothing at all.

use lot_core::{EntryId, SessionId, SessionSnapshot, SessionState};

use crate::events::{events_for, AllocationEvent};
use crate::result::AllocationResult;
use crate::session::{apply_result, mark_committed};
use crate::PipelineError;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage abstraction so the committer can be exercised in isolation.
pub trait LotteryStore: Send + Sync {
    /// Current rows for the session, as a fresh copy.
    fn load_snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError>;
    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError>;
    /// Outbox events not yet acknowledged, in entry-id order.
    fn pending_events(&self, session: &SessionId) -> Result<Vec<AllocationEvent>, StoreError>;
    fn ack_events(&self, session: &SessionId, keys: &[EntryId]) -> Result<(), StoreError>;
    fn load_result(&self, session: &SessionId) -> Result<Option<AllocationResult>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// State drifted since the snapshot was read. Retry by re-running.
    #[error("concurrent modification: {0}")]
    Conflict(String),
    /// Store could not be reached or locked. Retry the same commit.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Everything one commit writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    pub result: AllocationResult,
    pub events: Vec<AllocationEvent>,
}

impl CommitBatch {
    pub fn new(result: AllocationResult) -> Result<Self, PipelineError> {
        let events = events_for(&result)?;
        Ok(Self { result, events })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.result.session_id
    }
}

/// Optimistic-concurrency check shared by store implementations.
pub(crate) fn verify_unchanged(
    current: &SessionSnapshot,
    result: &AllocationResult,
) -> Result<(), StoreError> {
    if current.session.state != SessionState::Closed {
        return Err(StoreError::Conflict(format!(
            "session {} is {}",
            current.session.session_id,
            current.session.state.label()
        )));
    }
    for row in &result.slots {
        let slot = current
            .slot(&row.slot_id)
            .ok_or_else(|| StoreError::Conflict(format!("slot {} disappeared", row.slot_id)))?;
        if slot.capacity != row.capacity_before {
            return Err(StoreError::Conflict(format!(
                "slot {} capacity {} != {} at run start",
                row.slot_id, slot.capacity, row.capacity_before
            )));
        }
    }
    for row in &result.groups {
        let group = current
            .group(&row.group_id)
            .ok_or_else(|| StoreError::Conflict(format!("group {} disappeared", row.group_id)))?;
        if group.revision != row.revision {
            return Err(StoreError::Conflict(format!(
                "group {} revision {} != {}",
                row.group_id, group.revision, row.revision
            )));
        }
    }
    Ok(())
}

/// Verify, then produce the committed rows. `current` itself is not modified.
pub(crate) fn committed_snapshot(
    current: &SessionSnapshot,
    result: &AllocationResult,
) -> Result<SessionSnapshot, StoreError> {
    verify_unchanged(current, result)?;
    let mut next = current.clone();
    let corrupt = |e: PipelineError| StoreError::Corrupt(e.to_string());
    apply_result(&mut next, result).map_err(corrupt)?;
    next.session.state = next
        .session
        .state
        .advance(SessionState::Executed)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    mark_committed(&mut next).map_err(corrupt)?;
    Ok(next)
}

impl<T: LotteryStore + ?Sized> LotteryStore for &T {
    fn load_snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError> {
        (**self).load_snapshot(session)
    }
    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        (**self).commit(batch)
    }
    fn pending_events(&self, session: &SessionId) -> Result<Vec<AllocationEvent>, StoreError> {
        (**self).pending_events(session)
    }
    fn ack_events(&self, session: &SessionId, keys: &[EntryId]) -> Result<(), StoreError> {
        (**self).ack_events(session, keys)
    }
    fn load_result(&self, session: &SessionId) -> Result<Option<AllocationResult>, StoreError> {
        (**self).load_result(session)
    }
}
