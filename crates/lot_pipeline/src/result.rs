//! AllocationResult: the immutable, integer-only output of one run.
//!
//! - `entries`, `groups`, `slots` sorted by id; `packages` in processing order
//!   followed by never-attempted packages.
//! - `id` = `RES:` + SHA-256 of the canonical JSON of every other field.
//! - Enough detail is kept to explain any verdict later without re-drawing.

use lot_core::{
    ApplicantId, CancellationPolicy, EntryId, EntryStatus, GroupId, GroupStatus, SessionId,
    SlotId, WeightUnits,
};
use lot_io::hasher;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub id: String,
    pub session_id: SessionId,
    pub seed: u64,
    pub executed_at: String,
    pub rng_words_consumed: u64,
    pub entries: Vec<EntryOutcome>,
    pub groups: Vec<GroupOutcome>,
    pub slots: Vec<SlotOutcome>,
    pub packages: Vec<PackageRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub entry_id: EntryId,
    pub group_id: GroupId,
    pub slot_id: SlotId,
    pub weight_units: WeightUnits,
    pub status: EntryStatus,
    /// 1-based draw position among a slot's phase-2 winners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_rank: Option<u32>,
    /// Set when the group requested this slot more than once. The referenced
    /// entry holds the group's only claim on the slot; this row is `lost`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<EntryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub group_id: GroupId,
    pub applicant_id: ApplicantId,
    pub policy: CancellationPolicy,
    /// Distinct slots requested; repeated rows for one slot count once.
    pub total_slots_applied: u32,
    pub slots_won: u32,
    pub status: GroupStatus,
    /// Revision the run was computed against; commit refuses if it moved.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub slot_id: SlotId,
    pub sequence: u32,
    pub capacity_before: u32,
    pub capacity_after: u32,
    /// Seats taken by this run (packages + phase 2).
    pub won: u32,
    /// Capacity left for phase 2 after packages.
    pub phase2_available: u32,
    pub phase2_candidates: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRow {
    pub group_id: GroupId,
    /// 1-based position in the processing order; absent if never attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    pub weight_units: WeightUnits,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PackageRejection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageRejection {
    ZeroInitialCapacity { slot_id: SlotId },
    Exhausted { slot_id: SlotId },
}

impl AllocationResult {
    /// Compute `RES:<hex>` over everything except `id`.
    pub fn compute_id(&self) -> Result<String, PipelineError> {
        let mut v = serde_json::to_value(self)
            .map_err(|e| PipelineError::Build(format!("result to json: {e}")))?;
        if let Some(obj) = v.as_object_mut() {
            obj.remove("id");
        }
        Ok(hasher::res_id(&v)?)
    }

    /// Fill in `id` from the content.
    pub fn seal(mut self) -> Result<Self, PipelineError> {
        self.id = self.compute_id()?;
        Ok(self)
    }

    /// True if `id` matches the content.
    pub fn verify_id(&self) -> Result<bool, PipelineError> {
        Ok(self.compute_id()? == self.id)
    }

    pub fn entry(&self, id: &EntryId) -> Option<&EntryOutcome> {
        self.entries
            .binary_search_by(|e| e.entry_id.cmp(id))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn group(&self, id: &GroupId) -> Option<&GroupOutcome> {
        self.groups
            .binary_search_by(|g| g.group_id.cmp(id))
            .ok()
            .map(|i| &self.groups[i])
    }

    pub fn slot(&self, id: &SlotId) -> Option<&SlotOutcome> {
        self.slots
            .binary_search_by(|s| s.slot_id.cmp(id))
            .ok()
            .map(|i| &self.slots[i])
    }

    pub fn package(&self, id: &GroupId) -> Option<&PackageRow> {
        self.packages.iter().find(|p| &p.group_id == id)
    }

    pub fn entries_of<'a>(&'a self, id: &'a GroupId) -> impl Iterator<Item = &'a EntryOutcome> + 'a {
        self.entries.iter().filter(move |e| &e.group_id == id)
    }

    pub fn won_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Won)
            .count()
    }

    pub fn lost_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Lost)
            .count()
    }
}
