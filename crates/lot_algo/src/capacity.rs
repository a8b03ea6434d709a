//! Arena-style capacity table indexed by slot position.
//!
//! Slots are stored in ascending `SlotId` order; a slot's position (`SlotIx`) is
//! therefore stable for a given frozen slot set. Capacity only ever decreases.

use lot_core::SlotId;

/// Position of a slot inside a `CapacityTable`.
pub type SlotIx = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapacityTable {
    ids: Vec<SlotId>,
    initial: Vec<u32>,
    remaining: Vec<u32>,
}

impl CapacityTable {
    /// Build from `(slot, capacity)` pairs. Duplicate ids keep the first capacity seen.
    pub fn new<I>(slots: I) -> Self
    where
        I: IntoIterator<Item = (SlotId, u32)>,
    {
        let mut pairs: Vec<(SlotId, u32)> = slots.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|later, first| later.0 == first.0);
        let ids = pairs.iter().map(|(id, _)| id.clone()).collect();
        let initial: Vec<u32> = pairs.iter().map(|(_, c)| *c).collect();
        Self {
            ids,
            remaining: initial.clone(),
            initial,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: &SlotId) -> Option<SlotIx> {
        self.ids.binary_search(id).ok()
    }

    pub fn slot_id(&self, ix: SlotIx) -> &SlotId {
        &self.ids[ix]
    }

    /// Capacity at run start (before any phase consumed it).
    pub fn initial(&self, ix: SlotIx) -> u32 {
        self.initial[ix]
    }

    pub fn remaining(&self, ix: SlotIx) -> u32 {
        self.remaining[ix]
    }

    /// True iff every listed slot still has at least one seat.
    pub fn has_all(&self, ixs: &[SlotIx]) -> bool {
        ixs.iter().all(|&ix| self.remaining[ix] >= 1)
    }

    /// First listed slot with no seat left, if any.
    pub fn first_exhausted(&self, ixs: &[SlotIx]) -> Option<SlotIx> {
        ixs.iter().copied().find(|&ix| self.remaining[ix] == 0)
    }

    /// Consume one seat in every listed slot; all-or-nothing.
    pub fn take_all(&mut self, ixs: &[SlotIx]) -> bool {
        if !self.has_all(ixs) {
            return false;
        }
        for &ix in ixs {
            self.remaining[ix] -= 1;
        }
        true
    }

    /// Consume up to `n` seats of one slot; returns the number actually taken.
    pub fn take(&mut self, ix: SlotIx, n: u32) -> u32 {
        let taken = n.min(self.remaining[ix]);
        self.remaining[ix] -= taken;
        taken
    }

    /// `(ix, id, initial, remaining)` in slot-id order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIx, &SlotId, u32, u32)> + '_ {
        self.ids
            .iter()
            .enumerate()
            .map(move |(ix, id)| (ix, id, self.initial[ix], self.remaining[ix]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SlotId {
        s.parse().unwrap()
    }

    #[test]
    fn table_is_sorted_and_only_decreases() {
        let mut t = CapacityTable::new(vec![(sid("B"), 1), (sid("A"), 2)]);
        assert_eq!(t.slot_id(0), &sid("A"));
        let a = t.index_of(&sid("A")).unwrap();
        let b = t.index_of(&sid("B")).unwrap();
        assert!(t.take_all(&[a, b]));
        assert!(!t.take_all(&[a, b]));
        assert_eq!(t.remaining(a), 1);
        assert_eq!(t.first_exhausted(&[a, b]), Some(b));
        assert_eq!(t.take(a, 5), 1);
        assert_eq!(t.remaining(a), 0);
        assert_eq!(t.initial(a), 2);
    }
}
