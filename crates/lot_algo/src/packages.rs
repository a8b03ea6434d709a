//! Package resolution for `all_or_nothing` entry groups.
//!
//! Contract:
//! - One candidate per group; weight = **sum** of its slot-entry weights;
//!   required slots = the *set* of slots it references (a repeated slot counts once).
//! - A package touching a slot with zero initial capacity is never attempted.
//! - The remaining packages get one full weighted processing order. Walking that
//!   order once: accept iff every required slot still has a seat (then take one
//!   seat in each), otherwise reject. No backtracking, no second chances.
//!
//! Determinism:
//! - Candidates are drawn in the order supplied (callers pass group-id order).
//! - The only randomness is the processing order drawn from the injected source.

use std::collections::BTreeSet;

use lot_core::{DrawSource, GroupId, SlotId, WeightUnits};

use crate::capacity::{CapacityTable, SlotIx};
use crate::sampler::{weighted_order, Candidate};
use crate::AlgoError;

/// An indivisible multi-slot request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageCandidate {
    pub group_id: GroupId,
    pub weight: WeightUnits,
    pub required_slots: BTreeSet<SlotId>,
}

impl PackageCandidate {
    /// Fold a group's `(slot, weight)` rows into one candidate.
    pub fn from_entries<I>(group_id: GroupId, entries: I) -> Result<Self, AlgoError>
    where
        I: IntoIterator<Item = (SlotId, WeightUnits)>,
    {
        let mut weight: WeightUnits = 0;
        let mut required_slots = BTreeSet::new();
        for (slot, w) in entries {
            weight = weight.checked_add(w).ok_or(AlgoError::WeightOverflow)?;
            required_slots.insert(slot);
        }
        if required_slots.is_empty() {
            return Err(AlgoError::EmptyPackage);
        }
        Ok(Self {
            group_id,
            weight,
            required_slots,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// A required slot had no capacity at run start; the package was never drawn.
    ZeroInitialCapacity(SlotId),
    /// A required slot was used up by higher-ranked packages.
    Exhausted(SlotId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl PackageVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PackageVerdict::Accepted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDecision {
    pub group_id: GroupId,
    /// 1-based position in the processing order; `None` if never attempted.
    pub rank: Option<u32>,
    pub verdict: PackageVerdict,
}

/// Phase-1 output: decisions plus the capacity left for phase 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageOutcome {
    /// Processing order first, then never-attempted packages in input order.
    pub decisions: Vec<PackageDecision>,
    pub capacity: CapacityTable,
}

impl PackageOutcome {
    pub fn accepted(&self) -> impl Iterator<Item = &GroupId> + '_ {
        self.decisions
            .iter()
            .filter(|d| d.verdict.is_accepted())
            .map(|d| &d.group_id)
    }
}

/// Resolve every package against shared capacity.
pub fn resolve_packages<R>(
    candidates: &[PackageCandidate],
    mut capacity: CapacityTable,
    rng: &mut R,
) -> Result<PackageOutcome, AlgoError>
where
    R: DrawSource + ?Sized,
{
    // 1) Map slots to table positions and set aside packages that can never fit.
    let mut attempted: Vec<(usize, Vec<SlotIx>)> = Vec::new();
    let mut never: Vec<PackageDecision> = Vec::new();

    for (i, c) in candidates.iter().enumerate() {
        let mut ixs = Vec::with_capacity(c.required_slots.len());
        for slot in &c.required_slots {
            let ix = capacity
                .index_of(slot)
                .ok_or_else(|| AlgoError::UnknownSlot(slot.clone()))?;
            ixs.push(ix);
        }
        match ixs.iter().copied().find(|&ix| capacity.initial(ix) == 0) {
            Some(ix) => never.push(PackageDecision {
                group_id: c.group_id.clone(),
                rank: None,
                verdict: PackageVerdict::Rejected(RejectReason::ZeroInitialCapacity(
                    capacity.slot_id(ix).clone(),
                )),
            }),
            None => attempted.push((i, ixs)),
        }
    }

    // 2) Full weighted processing order over the attemptable packages.
    let pool: Vec<Candidate<usize>> = attempted
        .iter()
        .enumerate()
        .map(|(pos, (i, _))| Candidate::new(pos, candidates[*i].weight))
        .collect();
    let order = weighted_order(&pool, rng)?;

    // 3) Single pass, first claim by rank.
    let mut decisions = Vec::with_capacity(candidates.len());
    for (rank0, pos) in order.into_iter().enumerate() {
        let (i, ixs) = &attempted[pos];
        let verdict = match capacity.first_exhausted(ixs) {
            Some(ix) => PackageVerdict::Rejected(RejectReason::Exhausted(
                capacity.slot_id(ix).clone(),
            )),
            None => {
                capacity.take_all(ixs);
                PackageVerdict::Accepted
            }
        };
        decisions.push(PackageDecision {
            group_id: candidates[*i].group_id.clone(),
            rank: Some(rank0 as u32 + 1),
            verdict,
        });
    }
    decisions.extend(never);

    Ok(PackageOutcome {
        decisions,
        capacity,
    })
}
