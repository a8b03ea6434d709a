#![allow(dead_code)]

use lot_core::{
    CancellationPolicy, EntryGroup, EntryStatus, GroupStatus, LotterySession, SessionSnapshot,
    SessionState, Slot, SlotEntry, WeightingMethod,
};

pub const AT: &str = "2026-03-08T09:00:00Z";

/// Snapshot builder: entries are named `<group>-<slot>`, applicants `U-<group>`.
pub struct Fixture {
    snap: SessionSnapshot,
}

impl Fixture {
    pub fn new(session_id: &str) -> Self {
        Self {
            snap: SessionSnapshot {
                session: LotterySession {
                    session_id: session_id.parse().unwrap(),
                    entry_start: "2026-03-01T00:00:00Z".into(),
                    entry_end: "2026-03-07T00:00:00Z".into(),
                    executed_at: None,
                    weighting: WeightingMethod::Linear,
                    weight_multiplier: 1.0,
                    bonus: Default::default(),
                    per_slot_model_selection: false,
                    cheki_selection: false,
                    state: SessionState::Closed,
                },
                slots: vec![],
                groups: vec![],
                entries: vec![],
            },
        }
    }

    pub fn slot(mut self, id: &str, capacity: u32) -> Self {
        let sequence = self.snap.slots.len() as u32 + 1;
        self.snap.slots.push(Slot {
            slot_id: id.parse().unwrap(),
            sequence,
            capacity,
        });
        self
    }

    pub fn group(mut self, id: &str, policy: CancellationPolicy, slots: &[&str], weight: f64) -> Self {
        self.snap.groups.push(EntryGroup {
            group_id: id.parse().unwrap(),
            session_id: self.snap.session.session_id.clone(),
            applicant_id: format!("U-{id}").parse().unwrap(),
            policy,
            total_slots_applied: slots.len() as u32,
            slots_won: 0,
            status: GroupStatus::Entered,
            revision: 1,
            base_weight: Some(weight),
            bonus_flags: vec![],
        });
        for s in slots {
            self.snap.entries.push(SlotEntry {
                entry_id: format!("{id}-{s}").parse().unwrap(),
                group_id: id.parse().unwrap(),
                slot_id: s.parse().unwrap(),
                preferred_provider: None,
                item_counts: Default::default(),
                custom_weight: None,
                lottery_weight: None,
                status: EntryStatus::Entered,
            });
        }
        self
    }

    /// Another row for a slot `group` already requested, named `<group>-<slot>-<n>`.
    pub fn repeat(mut self, group: &str, slot: &str) -> Self {
        let g = self
            .snap
            .groups
            .iter_mut()
            .find(|g| g.group_id.as_str() == group)
            .unwrap();
        g.total_slots_applied += 1;
        let n = g.total_slots_applied;
        self.snap.entries.push(SlotEntry {
            entry_id: format!("{group}-{slot}-{n}").parse().unwrap(),
            group_id: group.parse().unwrap(),
            slot_id: slot.parse().unwrap(),
            preferred_provider: None,
            item_counts: Default::default(),
            custom_weight: None,
            lottery_weight: None,
            status: EntryStatus::Entered,
        });
        self
    }

    pub fn package(self, id: &str, slots: &[&str], weight: f64) -> Self {
        self.group(id, CancellationPolicy::AllOrNothing, slots, weight)
    }

    pub fn partial(self, id: &str, slots: &[&str], weight: f64) -> Self {
        self.group(id, CancellationPolicy::PartialOk, slots, weight)
    }

    pub fn state(mut self, state: SessionState) -> Self {
        self.snap.session.state = state;
        self
    }

    pub fn build(mut self) -> SessionSnapshot {
        self.snap.normalize();
        self.snap
    }
}
