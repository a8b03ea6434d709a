//! crates/lot_pipeline/src/allocate.rs
//! Allocation Orchestrator: frozen snapshot + seed → AllocationResult.
//!
//! Contract:
//! - validate → weigh (once) → phase 1 packages → phase 2 independent slots → aggregate.
//! - Phase 2 only sees the capacity table phase 1 hands over.
//! - A group requesting the same slot twice is treated as requesting it once: the
//!   lowest entry id is the seat, the other rows resolve `lost` and carry
//!   `duplicate_of`. Group totals count distinct slots.
//! - Post-run invariants are checked before the result leaves this module.
//! - No persistence. Aborting before return leaves nothing behind.
//!
//! Determinism:
//! - Phase 1 draws from RNG stream 0, each slot in phase 2 from `slot_stream_id(ix)`.
//! - All iteration is in id order; same snapshot + seed ⇒ byte-identical result.

use std::collections::{BTreeMap, BTreeSet};

use lot_algo::{
    resolve_independent, resolve_packages, Candidate, CapacityTable, PackageCandidate,
    PackageVerdict, RejectReason, SlotPool,
};
use lot_core::tokens::is_ts_utc_z;
use lot_core::{
    CancellationPolicy, DrawSource, EntryGroup, EntryId, EntryStatus, GroupId, GroupStatus,
    LotteryRng, SessionSnapshot, SlotEntry, SlotId,
};
use tracing::{debug, info};

use crate::result::{
    AllocationResult, EntryOutcome, GroupOutcome, PackageRejection, PackageRow, SlotOutcome,
};
use crate::validate::ensure_valid;
use crate::weigh::{weigh_entries, WeightTable};
use crate::PipelineError;

/// Run both phases and aggregate. Pure: the snapshot is not modified.
pub fn run_allocation(
    snapshot: &SessionSnapshot,
    seed: u64,
    executed_at: &str,
) -> Result<AllocationResult, PipelineError> {
    ensure_valid(snapshot)?;
    if !is_ts_utc_z(executed_at) {
        return Err(PipelineError::Build(format!(
            "executed_at must be YYYY-MM-DDTHH:MM:SSZ, got {executed_at:?}"
        )));
    }

    let session_id = &snapshot.session.session_id;
    info!(
        session = %session_id,
        seed,
        slots = snapshot.slots.len(),
        groups = snapshot.groups.len(),
        entries = snapshot.entries.len(),
        "allocation run started"
    );

    let weights = weigh_entries(snapshot)?;

    // ---- index rows in id order ----
    let mut groups: Vec<&EntryGroup> = snapshot.groups.iter().collect();
    groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
    let mut entries: Vec<&SlotEntry> = snapshot.entries.iter().collect();
    entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));

    let mut rows_of: BTreeMap<&GroupId, Vec<&SlotEntry>> = BTreeMap::new();
    let mut seat_of: BTreeMap<(&GroupId, &SlotId), &EntryId> = BTreeMap::new();
    let mut duplicate_of: BTreeMap<&EntryId, &EntryId> = BTreeMap::new();
    for &e in &entries {
        rows_of.entry(&e.group_id).or_default().push(e);
        match seat_of.get(&(&e.group_id, &e.slot_id)) {
            Some(&seat) => {
                duplicate_of.insert(&e.entry_id, seat);
            }
            None => {
                seat_of.insert((&e.group_id, &e.slot_id), &e.entry_id);
            }
        }
    }

    let capacity = CapacityTable::new(snapshot.slots.iter().map(|s| (s.slot_id.clone(), s.capacity)));
    let base = LotteryRng::from_seed_u64(seed);

    // ---- phase 1: packages ----
    let mut candidates = Vec::new();
    for g in groups.iter().filter(|g| g.policy == CancellationPolicy::AllOrNothing) {
        let rows = rows_of.get(&g.group_id).map(Vec::as_slice).unwrap_or(&[]);
        let weighted = rows
            .iter()
            .filter(|e| !duplicate_of.contains_key(&e.entry_id))
            .map(|e| Ok((e.slot_id.clone(), weights.require(&e.entry_id)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        candidates.push(PackageCandidate::from_entries(g.group_id.clone(), weighted)?);
    }

    let mut phase1_rng = base.stream(0);
    let packages = resolve_packages(&candidates, capacity, &mut phase1_rng)?;
    let accepted: BTreeSet<&GroupId> = packages.accepted().collect();
    debug!(
        session = %session_id,
        packages = candidates.len(),
        accepted = accepted.len(),
        "phase 1 resolved"
    );

    // ---- phase 2: independent slots on what phase 1 left ----
    let after_packages = packages.capacity.clone();
    let pools = phase2_pools(&groups, &rows_of, &duplicate_of, &weights)?;
    let independent = resolve_independent(pools, packages.capacity.clone(), &base)?;
    debug!(
        session = %session_id,
        slots_drawn = independent.draws.len(),
        "phase 2 resolved"
    );

    // ---- statuses ----
    let mut status: BTreeMap<EntryId, (EntryStatus, Option<u32>)> = BTreeMap::new();
    for g in groups.iter().filter(|g| g.policy == CancellationPolicy::AllOrNothing) {
        let verdict = if accepted.contains(&g.group_id) {
            EntryStatus::Won
        } else {
            EntryStatus::Lost
        };
        for e in rows_of.get(&g.group_id).into_iter().flatten() {
            if !duplicate_of.contains_key(&e.entry_id) {
                status.insert(e.entry_id.clone(), (verdict, None));
            }
        }
    }
    let mut phase2_candidates: BTreeMap<&SlotId, u32> = BTreeMap::new();
    for draw in &independent.draws {
        phase2_candidates.insert(&draw.slot_id, (draw.winners.len() + draw.losers.len()) as u32);
        for (i, id) in draw.winners.iter().enumerate() {
            status.insert(id.clone(), (EntryStatus::Won, Some(i as u32 + 1)));
        }
        for id in &draw.losers {
            status.insert(id.clone(), (EntryStatus::Lost, None));
        }
    }
    // Repeated requests never hold a second seat.
    for dup in duplicate_of.keys() {
        status.insert((*dup).clone(), (EntryStatus::Lost, None));
    }

    // ---- aggregate ----
    let mut entry_rows = Vec::with_capacity(entries.len());
    for e in &entries {
        let (st, draw_rank) = status.get(&e.entry_id).copied().ok_or_else(|| {
            PipelineError::Invariant(format!("entry {} left unresolved", e.entry_id))
        })?;
        entry_rows.push(EntryOutcome {
            entry_id: e.entry_id.clone(),
            group_id: e.group_id.clone(),
            slot_id: e.slot_id.clone(),
            weight_units: weights.require(&e.entry_id)?,
            status: st,
            draw_rank,
            duplicate_of: duplicate_of.get(&e.entry_id).map(|s| (*s).clone()),
        });
    }

    let mut won_by_group: BTreeMap<&GroupId, u32> = BTreeMap::new();
    for e in entry_rows.iter().filter(|e| e.status == EntryStatus::Won) {
        *won_by_group.entry(&e.group_id).or_insert(0) += 1;
    }
    let mut applied_by_group: BTreeMap<&GroupId, u32> = BTreeMap::new();
    for &(group_id, _) in seat_of.keys() {
        *applied_by_group.entry(group_id).or_insert(0) += 1;
    }
    let group_rows = groups
        .iter()
        .map(|g| {
            let won = won_by_group.get(&g.group_id).copied().unwrap_or(0);
            let applied = applied_by_group.get(&g.group_id).copied().unwrap_or(0);
            GroupOutcome {
                group_id: g.group_id.clone(),
                applicant_id: g.applicant_id.clone(),
                policy: g.policy,
                total_slots_applied: applied,
                slots_won: won,
                status: GroupStatus::derive(won, applied),
                revision: g.revision,
            }
        })
        .collect::<Vec<_>>();

    let mut slot_rows = Vec::with_capacity(snapshot.slots.len());
    let mut slots: Vec<_> = snapshot.slots.iter().collect();
    slots.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
    for s in slots {
        let ix = independent.capacity.index_of(&s.slot_id).ok_or_else(|| {
            PipelineError::Invariant(format!("slot {} missing from capacity table", s.slot_id))
        })?;
        let before = independent.capacity.initial(ix);
        let after = independent.capacity.remaining(ix);
        slot_rows.push(SlotOutcome {
            slot_id: s.slot_id.clone(),
            sequence: s.sequence,
            capacity_before: before,
            capacity_after: after,
            won: before - after,
            phase2_available: after_packages.remaining(ix),
            phase2_candidates: phase2_candidates.get(&s.slot_id).copied().unwrap_or(0),
        });
    }

    let package_weight: BTreeMap<&GroupId, u64> =
        candidates.iter().map(|c| (&c.group_id, c.weight)).collect();
    let package_rows = packages
        .decisions
        .iter()
        .map(|d| PackageRow {
            group_id: d.group_id.clone(),
            rank: d.rank,
            weight_units: package_weight.get(&d.group_id).copied().unwrap_or(0),
            accepted: d.verdict.is_accepted(),
            rejection: match &d.verdict {
                PackageVerdict::Accepted => None,
                PackageVerdict::Rejected(RejectReason::ZeroInitialCapacity(slot)) => {
                    Some(PackageRejection::ZeroInitialCapacity { slot_id: slot.clone() })
                }
                PackageVerdict::Rejected(RejectReason::Exhausted(slot)) => {
                    Some(PackageRejection::Exhausted { slot_id: slot.clone() })
                }
            },
        })
        .collect();

    let words = phase1_rng.words_consumed() + independent.words_consumed();
    let rng_words_consumed = u64::try_from(words)
        .map_err(|_| PipelineError::Build("rng word count exceeds u64".into()))?;

    let result = AllocationResult {
        id: String::new(),
        session_id: session_id.clone(),
        seed,
        executed_at: executed_at.to_string(),
        rng_words_consumed,
        entries: entry_rows,
        groups: group_rows,
        slots: slot_rows,
        packages: package_rows,
    }
    .seal()?;

    check_invariants(&result)?;

    info!(
        session = %session_id,
        result = %result.id,
        won = result.won_count(),
        lost = result.lost_count(),
        "allocation run finished"
    );
    Ok(result)
}

/// Phase-2 candidates: seat rows of `partial_ok` groups, pooled per slot.
fn phase2_pools(
    groups: &[&EntryGroup],
    rows_of: &BTreeMap<&GroupId, Vec<&SlotEntry>>,
    duplicate_of: &BTreeMap<&EntryId, &EntryId>,
    weights: &WeightTable,
) -> Result<Vec<SlotPool>, PipelineError> {
    let mut by_slot: BTreeMap<SlotId, Vec<Candidate<EntryId>>> = BTreeMap::new();
    for g in groups.iter().filter(|g| g.policy == CancellationPolicy::PartialOk) {
        for e in rows_of.get(&g.group_id).into_iter().flatten() {
            if duplicate_of.contains_key(&e.entry_id) {
                continue;
            }
            by_slot
                .entry(e.slot_id.clone())
                .or_default()
                .push(Candidate::new(e.entry_id.clone(), weights.require(&e.entry_id)?));
        }
    }
    // Candidate order inside a pool is entry-id order.
    Ok(by_slot
        .into_iter()
        .map(|(slot_id, mut candidates)| {
            candidates.sort_by(|a, b| a.id.cmp(&b.id));
            SlotPool { slot_id, candidates }
        })
        .collect())
}

/// Post-run guards: capacity safety, package atomicity, conservation, derived status.
///
/// Every `won` row counts as a seat; a group never wins the same slot twice.
pub fn check_invariants(result: &AllocationResult) -> Result<(), PipelineError> {
    let broken = |msg: String| Err(PipelineError::Invariant(msg));

    let mut seats: BTreeMap<&SlotId, u32> = BTreeMap::new();
    let mut won_by_group: BTreeMap<&GroupId, u32> = BTreeMap::new();
    let mut held: BTreeSet<(&GroupId, &SlotId)> = BTreeSet::new();
    for e in &result.entries {
        if !e.status.is_resolved() {
            return broken(format!("entry {} still entered", e.entry_id));
        }
        if e.status == EntryStatus::Won {
            if e.duplicate_of.is_some() || !held.insert((&e.group_id, &e.slot_id)) {
                return broken(format!(
                    "entry {}: group {} wins slot {} twice",
                    e.entry_id, e.group_id, e.slot_id
                ));
            }
            *won_by_group.entry(&e.group_id).or_insert(0) += 1;
            *seats.entry(&e.slot_id).or_insert(0) += 1;
        }
    }

    for s in &result.slots {
        let taken = seats.get(&s.slot_id).copied().unwrap_or(0);
        if taken != s.won || taken > s.capacity_before {
            return broken(format!(
                "slot {}: {taken} seats won, recorded {}, capacity {}",
                s.slot_id, s.won, s.capacity_before
            ));
        }
        if s.capacity_after != s.capacity_before - taken {
            return broken(format!("slot {}: capacity_after out of step", s.slot_id));
        }
    }

    for g in &result.groups {
        let won = won_by_group.get(&g.group_id).copied().unwrap_or(0);
        if won != g.slots_won || g.status != GroupStatus::derive(won, g.total_slots_applied) {
            return broken(format!("group {}: aggregate out of step", g.group_id));
        }
        if g.policy == CancellationPolicy::AllOrNothing
            && won != 0
            && won != g.total_slots_applied
        {
            return broken(format!("package {} partially won", g.group_id));
        }
    }
    Ok(())
}
