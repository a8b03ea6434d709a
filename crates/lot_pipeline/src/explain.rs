//! "Why did I win / lose": per-entry reasons recomputed from a persisted result.
//!
//! Nothing is re-drawn. Package verdicts come from `packages`, phase-2 verdicts
//! from the entry's draw rank and the slot's phase-2 figures.

use std::fmt;

use lot_core::{CancellationPolicy, EntryId, EntryStatus, GroupId, GroupStatus, SlotId};
use serde::Serialize;

use crate::result::{AllocationResult, PackageRejection};
use crate::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupExplanation {
    pub group_id: GroupId,
    pub policy: CancellationPolicy,
    pub status: GroupStatus,
    pub slots_won: u32,
    pub total_slots_applied: u32,
    pub lines: Vec<ExplainLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainLine {
    pub entry_id: EntryId,
    pub slot_id: SlotId,
    pub status: EntryStatus,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    PackageAccepted { rank: u32, of: u32 },
    PackageExhausted { rank: u32, of: u32, slot_id: SlotId },
    PackageNeverAttempted { slot_id: SlotId },
    DrawnAt { position: u32, available: u32, candidates: u32 },
    NoCapacityLeft,
    NotDrawn { available: u32, candidates: u32 },
    SameAs { entry_id: EntryId },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::PackageAccepted { rank, of } => {
                write!(f, "package accepted at rank {rank} of {of}")
            }
            Reason::PackageExhausted { rank, of, slot_id } => write!(
                f,
                "package rejected at rank {rank} of {of}: slot {slot_id} was exhausted by higher-ranked packages"
            ),
            Reason::PackageNeverAttempted { slot_id } => {
                write!(f, "package never attempted: slot {slot_id} had no capacity at run start")
            }
            Reason::DrawnAt { position, available, candidates } => write!(
                f,
                "drawn at position {position} ({available} seats among {candidates} candidates)"
            ),
            Reason::NoCapacityLeft => write!(f, "no capacity left after packages"),
            Reason::NotDrawn { available, candidates } => {
                write!(f, "not drawn ({available} seats among {candidates} candidates)")
            }
            Reason::SameAs { entry_id } => write!(f, "repeated request; slot claimed by entry {entry_id}"),
        }
    }
}

impl fmt::Display for GroupExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "group {} ({}): {} {}/{}",
            self.group_id,
            self.policy.label(),
            self.status.label(),
            self.slots_won,
            self.total_slots_applied
        )?;
        for l in &self.lines {
            writeln!(f, "  {} slot {}: {} - {}", l.entry_id, l.slot_id, l.status.label(), l.reason)?;
        }
        Ok(())
    }
}

/// Explain every entry of `group_id`.
pub fn explain_group(
    result: &AllocationResult,
    group_id: &GroupId,
) -> Result<GroupExplanation, PipelineError> {
    let group = result
        .group(group_id)
        .ok_or_else(|| PipelineError::Build(format!("group {group_id} is not in result {}", result.id)))?;
    let ranked = result.packages.iter().filter(|p| p.rank.is_some()).count() as u32;

    let mut lines = Vec::new();
    for e in result.entries_of(group_id) {
        let reason = if let Some(seat) = &e.duplicate_of {
            Reason::SameAs { entry_id: seat.clone() }
        } else if group.policy == CancellationPolicy::AllOrNothing {
            package_reason(result, group_id, ranked)?
        } else {
            let slot = result.slot(&e.slot_id).ok_or_else(|| {
                PipelineError::Build(format!("slot {} is not in result {}", e.slot_id, result.id))
            })?;
            match (e.status, e.draw_rank) {
                (EntryStatus::Won, Some(position)) => Reason::DrawnAt {
                    position,
                    available: slot.phase2_available,
                    candidates: slot.phase2_candidates,
                },
                _ if slot.phase2_available == 0 => Reason::NoCapacityLeft,
                _ => Reason::NotDrawn {
                    available: slot.phase2_available,
                    candidates: slot.phase2_candidates,
                },
            }
        };
        lines.push(ExplainLine {
            entry_id: e.entry_id.clone(),
            slot_id: e.slot_id.clone(),
            status: e.status,
            reason,
        });
    }

    Ok(GroupExplanation {
        group_id: group.group_id.clone(),
        policy: group.policy,
        status: group.status,
        slots_won: group.slots_won,
        total_slots_applied: group.total_slots_applied,
        lines,
    })
}

fn package_reason(
    result: &AllocationResult,
    group_id: &GroupId,
    of: u32,
) -> Result<Reason, PipelineError> {
    let row = result
        .package(group_id)
        .ok_or_else(|| PipelineError::Build(format!("package {group_id} missing from result")))?;
    Ok(match (&row.rejection, row.rank) {
        (None, Some(rank)) => Reason::PackageAccepted { rank, of },
        (Some(PackageRejection::Exhausted { slot_id }), Some(rank)) => Reason::PackageExhausted {
            rank,
            of,
            slot_id: slot_id.clone(),
        },
        (Some(PackageRejection::ZeroInitialCapacity { slot_id }), _) => {
            Reason::PackageNeverAttempted { slot_id: slot_id.clone() }
        }
        _ => {
            return Err(PipelineError::Invariant(format!(
                "package {group_id} has an inconsistent verdict"
            )))
        }
    })
}
