//! crates/lot_pipeline/src/validate.rs
//! Precondition checks before any computation.
//! Deterministic: snapshot order in, violation order out; no RNG, no weights.
//!
//! A failing report aborts the run before anything is drawn or written.

use std::collections::{BTreeMap, BTreeSet};

use lot_core::{EntryStatus, GroupId, SessionSnapshot, SessionState};

use crate::{PipelineError, PreconditionViolation};

/// Deterministic report: pass = no violations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<PreconditionViolation>,
}

impl ValidationReport {
    pub fn pass(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Collect every violation in the snapshot.
pub fn validate(snapshot: &SessionSnapshot) -> ValidationReport {
    let mut violations = Vec::new();

    // ---- session state ----
    match snapshot.session.state {
        SessionState::Closed => {}
        state if state.has_run() => {
            violations.push(PreconditionViolation::AlreadyExecuted { state })
        }
        state => violations.push(PreconditionViolation::SessionNotClosed { state }),
    }

    // ---- id uniqueness ----
    let mut slots = BTreeSet::new();
    for s in &snapshot.slots {
        if !slots.insert(&s.slot_id) {
            violations.push(PreconditionViolation::DuplicateSlot(s.slot_id.clone()));
        }
    }

    let mut groups = BTreeSet::new();
    let mut applicants = BTreeSet::new();
    for g in &snapshot.groups {
        if !groups.insert(&g.group_id) {
            violations.push(PreconditionViolation::DuplicateGroup(g.group_id.clone()));
        }
        if !applicants.insert(&g.applicant_id) {
            violations.push(PreconditionViolation::DuplicateApplicant {
                applicant: g.applicant_id.clone(),
            });
        }
        if g.session_id != snapshot.session.session_id {
            violations.push(PreconditionViolation::ForeignGroup {
                group: g.group_id.clone(),
                session: g.session_id.clone(),
            });
        }
    }

    // ---- entries: references + status ----
    let mut entries = BTreeSet::new();
    let mut per_group: BTreeMap<&GroupId, u32> = BTreeMap::new();
    for e in &snapshot.entries {
        if !entries.insert(&e.entry_id) {
            violations.push(PreconditionViolation::DuplicateEntry(e.entry_id.clone()));
        }
        if groups.contains(&e.group_id) {
            *per_group.entry(&e.group_id).or_insert(0) += 1;
        } else {
            violations.push(PreconditionViolation::UnknownGroup {
                entry: e.entry_id.clone(),
                group: e.group_id.clone(),
            });
        }
        if !slots.contains(&e.slot_id) {
            violations.push(PreconditionViolation::UnknownSlot {
                entry: e.entry_id.clone(),
                slot: e.slot_id.clone(),
            });
        }
        if e.status != EntryStatus::Entered {
            violations.push(PreconditionViolation::EntryNotPending {
                entry: e.entry_id.clone(),
                status: e.status,
            });
        }
    }

    // ---- group shape: N requested slots ⇒ N entries, N ≥ 1 ----
    for g in &snapshot.groups {
        let actual = per_group.get(&g.group_id).copied().unwrap_or(0);
        if actual == 0 || actual != g.total_slots_applied {
            violations.push(PreconditionViolation::EntryCountMismatch {
                group: g.group_id.clone(),
                declared: g.total_slots_applied,
                actual,
            });
        }
    }

    ValidationReport { violations }
}

/// Fail on the first violation.
pub fn ensure_valid(snapshot: &SessionSnapshot) -> Result<(), PipelineError> {
    match validate(snapshot).violations.into_iter().next() {
        None => Ok(()),
        Some(v) => Err(v.into()),
    }
}
