//! Weigh stage: one fixed-point weight per slot entry, computed once per run.
//!
//! The table is the only place weights are computed; both phases read from it.

use std::collections::BTreeMap;

use lot_core::weight::{compute_weight, to_weight_units};
use lot_core::{EntryId, SessionSnapshot, WeightUnits};

use crate::{PipelineError, PreconditionViolation};

/// Cached weights keyed by entry id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightTable {
    units: BTreeMap<EntryId, WeightUnits>,
}

impl WeightTable {
    pub fn get(&self, id: &EntryId) -> Option<WeightUnits> {
        self.units.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Lookup that treats a miss as an engine bug.
    pub(crate) fn require(&self, id: &EntryId) -> Result<WeightUnits, PipelineError> {
        self.get(id)
            .ok_or_else(|| PipelineError::Invariant(format!("no weight cached for entry {id}")))
    }
}

/// Compute every entry's weight. Assumes references were validated.
pub fn weigh_entries(snapshot: &SessionSnapshot) -> Result<WeightTable, PipelineError> {
    let groups: BTreeMap<_, _> = snapshot.groups.iter().map(|g| (&g.group_id, g)).collect();
    let mut units = BTreeMap::new();
    for entry in &snapshot.entries {
        let group = groups.get(&entry.group_id).copied().ok_or_else(|| {
            PreconditionViolation::UnknownGroup {
                entry: entry.entry_id.clone(),
                group: entry.group_id.clone(),
            }
        })?;
        let w = compute_weight(group, entry, &snapshot.session).map_err(|e| {
            PreconditionViolation::InvalidWeight {
                entry: entry.entry_id.clone(),
                reason: e.to_string(),
            }
        })?;
        units.insert(entry.entry_id.clone(), to_weight_units(w));
    }
    Ok(WeightTable { units })
}
