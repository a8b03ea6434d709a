//! Session lifecycle: `open → closed → executed → committed`.
//!
//! Transitions only move forward (`SessionState::advance`). Execution requires
//! `closed`; anything already executed is a precondition violation and the
//! snapshot is left exactly as it was.

use std::collections::BTreeMap;

use lot_core::{SessionSnapshot, SessionState};

use crate::allocate::run_allocation;
use crate::result::AllocationResult;
use crate::{PipelineError, PreconditionViolation};

/// Run the allocation and move the session to `executed`.
///
/// On error the snapshot is untouched.
pub fn execute_session(
    snapshot: &mut SessionSnapshot,
    seed: u64,
    executed_at: &str,
) -> Result<AllocationResult, PipelineError> {
    let result = run_allocation(snapshot, seed, executed_at)?;
    let mut next = snapshot.clone();
    apply_result(&mut next, &result)?;
    next.session.state = advance(next.session.state, SessionState::Executed)?;
    *snapshot = next;
    Ok(result)
}

/// Move an executed session to `committed`.
pub fn mark_committed(snapshot: &mut SessionSnapshot) -> Result<(), PipelineError> {
    snapshot.session.state = advance(snapshot.session.state, SessionState::Committed)?;
    Ok(())
}

/// Write `result` into the snapshot rows: entry statuses and weights, group
/// aggregates, slot capacities, `executed_at`. All rows are checked before any
/// is changed.
pub fn apply_result(
    snapshot: &mut SessionSnapshot,
    result: &AllocationResult,
) -> Result<(), PipelineError> {
    if result.session_id != snapshot.session.session_id {
        return Err(PipelineError::Invariant(format!(
            "result for session {} applied to {}",
            result.session_id, snapshot.session.session_id
        )));
    }

    let entry_ix: BTreeMap<_, _> = snapshot
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.entry_id.clone(), i))
        .collect();
    let group_ix: BTreeMap<_, _> = snapshot
        .groups
        .iter()
        .enumerate()
        .map(|(i, g)| (g.group_id.clone(), i))
        .collect();
    let slot_ix: BTreeMap<_, _> = snapshot
        .slots
        .iter()
        .enumerate()
        .map(|(i, s)| (s.slot_id.clone(), i))
        .collect();

    let missing = |what: &str, id: &dyn std::fmt::Display| {
        PipelineError::Invariant(format!("result references unknown {what} {id}"))
    };
    let entries = result
        .entries
        .iter()
        .map(|e| entry_ix.get(&e.entry_id).copied().ok_or_else(|| missing("entry", &e.entry_id)))
        .collect::<Result<Vec<_>, _>>()?;
    let groups = result
        .groups
        .iter()
        .map(|g| group_ix.get(&g.group_id).copied().ok_or_else(|| missing("group", &g.group_id)))
        .collect::<Result<Vec<_>, _>>()?;
    let slots = result
        .slots
        .iter()
        .map(|s| slot_ix.get(&s.slot_id).copied().ok_or_else(|| missing("slot", &s.slot_id)))
        .collect::<Result<Vec<_>, _>>()?;

    for (row, i) in result.entries.iter().zip(entries) {
        let e = &mut snapshot.entries[i];
        e.status = row.status;
        e.lottery_weight = Some(row.weight_units);
    }
    for (row, i) in result.groups.iter().zip(groups) {
        let g = &mut snapshot.groups[i];
        g.slots_won = row.slots_won;
        g.status = row.status;
    }
    for (row, i) in result.slots.iter().zip(slots) {
        snapshot.slots[i].capacity = row.capacity_after;
    }
    snapshot.session.executed_at = Some(result.executed_at.clone());
    Ok(())
}

fn advance(from: SessionState, to: SessionState) -> Result<SessionState, PipelineError> {
    from.advance(to).map_err(|_| match from {
        SessionState::Executed | SessionState::Committed if to == SessionState::Executed => {
            PreconditionViolation::AlreadyExecuted { state: from }.into()
        }
        _ => PipelineError::Invariant(format!(
            "illegal session transition {} -> {}",
            from.label(),
            to.label()
        )),
    })
}
