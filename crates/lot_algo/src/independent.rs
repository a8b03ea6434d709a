//! Independent per-slot resolution for `partial_ok` entries.
//!
//! Contract:
//! - Runs on the capacity left after package resolution.
//! - Per slot: zero capacity → every candidate loses; otherwise draw
//!   `min(capacity, candidates)` winners, the rest lose.
//! - Slots do not interact. Each slot draws from its own RNG sub-stream
//!   (`stream(1 + slot position)`), so the outcome does not depend on the order in
//!   which slots are processed and slots may be resolved concurrently.

use std::collections::BTreeMap;

use lot_core::{DrawSource, EntryId, SlotId};

use crate::capacity::{CapacityTable, SlotIx};
use crate::sampler::{sample_without_replacement, Candidate};
use crate::AlgoError;

/// Candidates competing for one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotPool {
    pub slot_id: SlotId,
    pub candidates: Vec<Candidate<EntryId>>,
}

/// Outcome of one slot's draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotDraw {
    pub slot_id: SlotId,
    /// Capacity available to this phase (post-package).
    pub available: u32,
    /// Winners in draw order.
    pub winners: Vec<EntryId>,
    /// Losers in entry-id order.
    pub losers: Vec<EntryId>,
    pub words_consumed: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndependentOutcome {
    /// One draw per slot that had candidates, in slot-id order.
    pub draws: Vec<SlotDraw>,
    pub capacity: CapacityTable,
}

impl IndependentOutcome {
    pub fn words_consumed(&self) -> u128 {
        self.draws.iter().map(|d| d.words_consumed).sum()
    }
}

/// RNG sub-stream reserved for slot `ix` (stream 0 belongs to packages).
#[inline]
pub fn slot_stream_id(ix: SlotIx) -> u64 {
    1 + ix as u64
}

/// Resolve a single slot against its available capacity.
pub fn resolve_slot<R>(pool: &SlotPool, available: u32, rng: &mut R) -> Result<SlotDraw, AlgoError>
where
    R: DrawSource + ?Sized,
{
    let before = rng.words_consumed();
    let winners = if available == 0 {
        Vec::new()
    } else {
        sample_without_replacement(&pool.candidates, available as usize, rng)?
    };
    let mut losers: Vec<EntryId> = pool
        .candidates
        .iter()
        .filter(|c| !winners.contains(&c.id))
        .map(|c| c.id.clone())
        .collect();
    losers.sort();
    Ok(SlotDraw {
        slot_id: pool.slot_id.clone(),
        available,
        winners,
        losers,
        words_consumed: rng.words_consumed() - before,
    })
}

/// Resolve every slot pool. Pools for the same slot are merged.
pub fn resolve_independent<R>(
    pools: Vec<SlotPool>,
    mut capacity: CapacityTable,
    base: &R,
) -> Result<IndependentOutcome, AlgoError>
where
    R: DrawSource,
{
    let mut merged: BTreeMap<SlotId, Vec<Candidate<EntryId>>> = BTreeMap::new();
    for pool in pools {
        merged.entry(pool.slot_id).or_default().extend(pool.candidates);
    }

    let mut draws = Vec::with_capacity(merged.len());
    for (slot_id, candidates) in merged {
        let ix = capacity
            .index_of(&slot_id)
            .ok_or_else(|| AlgoError::UnknownSlot(slot_id.clone()))?;
        let pool = SlotPool { slot_id, candidates };
        let mut rng = base.stream(slot_stream_id(ix));
        let draw = resolve_slot(&pool, capacity.remaining(ix), &mut rng)?;
        capacity.take(ix, draw.winners.len() as u32);
        draws.push(draw);
    }

    Ok(IndependentOutcome { draws, capacity })
}
