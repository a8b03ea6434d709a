//! Winner/loser events for the booking-creation consumer.
//!
//! Delivery is at-least-once: events sit in the store's outbox until acked, and
//! a crash between delivery and ack replays them. Consumers dedupe on
//! `idempotency_key()` (the entry id); `DedupSink` is the reference wrapper.

use std::collections::BTreeSet;

use lot_core::{ApplicantId, EntryId, EntryStatus, GroupId, SessionId, SlotId};
use serde::{Deserialize, Serialize};

use crate::result::AllocationResult;
use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Winner,
    Loser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub session_id: SessionId,
    pub entry_id: EntryId,
    pub group_id: GroupId,
    pub applicant_id: ApplicantId,
    pub slot_id: SlotId,
    pub outcome: Outcome,
}

impl AllocationEvent {
    pub fn idempotency_key(&self) -> &EntryId {
        &self.entry_id
    }
}

/// One event per entry, in entry-id order.
pub fn events_for(result: &AllocationResult) -> Result<Vec<AllocationEvent>, PipelineError> {
    result
        .entries
        .iter()
        .map(|e| {
            let group = result.group(&e.group_id).ok_or_else(|| {
                PipelineError::Invariant(format!("entry {} has no group row", e.entry_id))
            })?;
            let outcome = match e.status {
                EntryStatus::Won => Outcome::Winner,
                EntryStatus::Lost => Outcome::Loser,
                EntryStatus::Entered => {
                    return Err(PipelineError::Invariant(format!(
                        "entry {} unresolved at commit",
                        e.entry_id
                    )))
                }
            };
            Ok(AllocationEvent {
                session_id: result.session_id.clone(),
                entry_id: e.entry_id.clone(),
                group_id: e.group_id.clone(),
                applicant_id: group.applicant_id.clone(),
                slot_id: e.slot_id.clone(),
                outcome,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event sink failed: {0}")]
pub struct SinkError(pub String);

/// Downstream consumer of allocation events.
pub trait EventSink {
    fn deliver(&mut self, event: &AllocationEvent) -> Result<(), SinkError>;
}

/// Keeps every delivered event, duplicates included.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<AllocationEvent>,
}

impl EventSink for RecordingSink {
    fn deliver(&mut self, event: &AllocationEvent) -> Result<(), SinkError> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Forwards each idempotency key to `inner` at most once.
#[derive(Debug, Default)]
pub struct DedupSink<S> {
    inner: S,
    seen: BTreeSet<EntryId>,
    suppressed: usize,
}

impl<S: EventSink> DedupSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            seen: BTreeSet::new(),
            suppressed: 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Redeliveries swallowed so far.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

impl<S: EventSink> EventSink for DedupSink<S> {
    fn deliver(&mut self, event: &AllocationEvent) -> Result<(), SinkError> {
        if self.seen.contains(event.idempotency_key()) {
            self.suppressed += 1;
            return Ok(());
        }
        self.inner.deliver(event)?;
        self.seen.insert(event.idempotency_key().clone());
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn deliver(&mut self, event: &AllocationEvent) -> Result<(), SinkError> {
        (**self).deliver(event)
    }
}
