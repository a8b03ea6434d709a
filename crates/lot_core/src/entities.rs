//! Domain entities: sessions, slots, entry groups, slot entries.
//!
//! Rows arrive frozen (entry window closed) and are resolved exactly once by an
//! allocation run. Slot `capacity` is the *remaining* capacity at execution time
//! (maximum minus participants already confirmed outside the lottery).

use std::collections::BTreeMap;

use crate::status::{EntryStatus, GroupStatus, SessionState};
use crate::tokens::{ApplicantId, EntryId, GroupId, SessionId, SlotId};
use crate::weight::WeightUnits;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a session turns applicant attributes into lottery weights.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WeightingMethod {
    Linear,
    Bonus,
    Custom,
}

/// Whether a multi-slot application is indivisible or resolved per slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CancellationPolicy {
    AllOrNothing,
    PartialOk,
}

impl CancellationPolicy {
    pub fn label(self) -> &'static str {
        match self {
            CancellationPolicy::AllOrNothing => "all_or_nothing",
            CancellationPolicy::PartialOk => "partial_ok",
        }
    }
}

/// Applicant attributes that adjust weight under `bonus` weighting.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BonusFlag {
    Loyalty,
    FirstTime,
    PriorNoShow,
}

/// Additive increments applied per bonus flag (negative values are penalties).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BonusSchedule {
    pub loyalty: f64,
    pub first_time: f64,
    pub prior_no_show: f64,
}

impl BonusSchedule {
    pub fn increment(&self, flag: BonusFlag) -> f64 {
        match flag {
            BonusFlag::Loyalty => self.loyalty,
            BonusFlag::FirstTime => self.first_time,
            BonusFlag::PriorNoShow => self.prior_no_show,
        }
    }
}

impl Default for BonusSchedule {
    fn default() -> Self {
        Self {
            loyalty: 0.5,
            first_time: 0.25,
            prior_no_show: -0.5,
        }
    }
}

#[cfg(feature = "serde")]
fn default_multiplier() -> f64 {
    1.0
}

/// One allocation run context. Immutable once the entry window closes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LotterySession {
    pub session_id: SessionId,
    /// RFC3339 UTC, "YYYY-MM-DDTHH:MM:SSZ".
    pub entry_start: String,
    pub entry_end: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub executed_at: Option<String>,
    pub weighting: WeightingMethod,
    #[cfg_attr(feature = "serde", serde(default = "default_multiplier"))]
    pub weight_multiplier: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bonus: BonusSchedule,
    /// Entries may carry a per-slot preferred provider (otherwise session-wide).
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_slot_model_selection: bool,
    /// Entries may request ancillary goods (cheki) per slot.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cheki_selection: bool,
    pub state: SessionState,
}

/// A bookable unit within the event.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Slot {
    pub slot_id: SlotId,
    pub sequence: u32,
    pub capacity: u32,
}

/// One applicant's full application for a session.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryGroup {
    pub group_id: GroupId,
    pub session_id: SessionId,
    pub applicant_id: ApplicantId,
    pub policy: CancellationPolicy,
    pub total_slots_applied: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub slots_won: u32,
    #[cfg_attr(feature = "serde", serde(default = "GroupStatus::entered"))]
    pub status: GroupStatus,
    /// Optimistic-concurrency guard bumped on every edit while the window is open.
    #[cfg_attr(feature = "serde", serde(default))]
    pub revision: u64,
    /// Declared base weight (defaults to 1.0 when absent).
    #[cfg_attr(feature = "serde", serde(default))]
    pub base_weight: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bonus_flags: Vec<BonusFlag>,
}

/// One (EntryGroup × Slot) pairing; the unit finally marked won or lost.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlotEntry {
    pub entry_id: EntryId,
    pub group_id: GroupId,
    pub slot_id: SlotId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub preferred_provider: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub item_counts: BTreeMap<String, u32>,
    /// Precomputed weight supplied by the caller for `custom` weighting.
    #[cfg_attr(feature = "serde", serde(default))]
    pub custom_weight: Option<f64>,
    /// Fixed-point weight computed once per run (see `weight::WEIGHT_SCALE`).
    #[cfg_attr(feature = "serde", serde(default))]
    pub lottery_weight: Option<WeightUnits>,
    #[cfg_attr(feature = "serde", serde(default = "EntryStatus::entered"))]
    pub status: EntryStatus,
}

/// The frozen input set of one allocation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct SessionSnapshot {
    pub session: LotterySession,
    pub slots: Vec<Slot>,
    pub groups: Vec<EntryGroup>,
    pub entries: Vec<SlotEntry>,
}

impl SessionSnapshot {
    /// Stable ordering: slots, groups, entries ascending by id.
    pub fn normalize(&mut self) {
        self.slots.sort_by(|a, b| a.slot_id.cmp(&b.slot_id));
        self.groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        self.entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
    }

    pub fn slot(&self, id: &SlotId) -> Option<&Slot> {
        self.slots.iter().find(|s| &s.slot_id == id)
    }

    pub fn group(&self, id: &GroupId) -> Option<&EntryGroup> {
        self.groups.iter().find(|g| &g.group_id == id)
    }
}

// Serde default helpers (named so they can be used in `serde(default = "...")`).
impl GroupStatus {
    pub fn entered() -> Self {
        GroupStatus::Entered
    }
}

impl EntryStatus {
    pub fn entered() -> Self {
        EntryStatus::Entered
    }
}
