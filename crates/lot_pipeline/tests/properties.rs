mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{Fixture, AT};
use lot_core::{CancellationPolicy, EntryStatus, GroupStatus, SessionSnapshot};
use lot_io::canonical_json::to_canonical_bytes;
use lot_pipeline::run_allocation;
use proptest::prelude::*;

const SLOTS: [&str; 4] = ["A", "B", "C", "D"];

/// (package?, slot bitmask 1..16, repeated-slot bitmask, integer weight)
type GroupSpec = (bool, u8, u8, u32);

fn snapshot(caps: &[u32], groups: &[GroupSpec]) -> SessionSnapshot {
    let mut f = Fixture::new("S-fuzz");
    for (id, cap) in SLOTS.iter().zip(caps) {
        f = f.slot(id, *cap);
    }
    for (i, (package, mask, repeats, weight)) in groups.iter().enumerate() {
        let pick = |bits: u8| -> Vec<&'static str> {
            SLOTS
                .iter()
                .enumerate()
                .filter(|(b, _)| bits & (1 << b) != 0)
                .map(|(_, s)| *s)
                .collect()
        };
        let slots = pick(*mask);
        let policy = if *package {
            CancellationPolicy::AllOrNothing
        } else {
            CancellationPolicy::PartialOk
        };
        let id = format!("G{i:02}");
        f = f.group(&id, policy, &slots, *weight as f64);
        for s in pick(mask & repeats) {
            f = f.repeat(&id, s);
        }
    }
    f.build()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn runs_respect_capacity_atomicity_and_conservation(
        caps in prop::collection::vec(0u32..4, 4),
        groups in prop::collection::vec((any::<bool>(), 1u8..16, 0u8..16, 1u32..10), 0..14),
        seed in any::<u64>(),
    ) {
        let snap = snapshot(&caps, &groups);
        let r = run_allocation(&snap, seed, AT).unwrap();

        // conservation
        prop_assert_eq!(r.entries.len(), snap.entries.len());
        prop_assert!(r.entries.iter().all(|e| e.status != EntryStatus::Entered));

        // capacity safety, counted over every won row
        let mut won: BTreeMap<&str, u32> = BTreeMap::new();
        let mut held = BTreeSet::new();
        for e in r.entries.iter().filter(|e| e.status == EntryStatus::Won) {
            *won.entry(e.slot_id.as_str()).or_insert(0) += 1;
            prop_assert!(held.insert((&e.group_id, &e.slot_id)), "{} won twice", e.entry_id);
        }
        for (id, cap) in SLOTS.iter().zip(&caps) {
            let w = won.get(id).copied().unwrap_or(0);
            prop_assert!(w <= *cap, "slot {} won {} > capacity {}", id, w, cap);
            let s = r.slot(&id.parse().unwrap()).unwrap();
            prop_assert_eq!(s.capacity_after, cap - w);
        }

        // package atomicity + derived status
        for g in &r.groups {
            if g.policy == CancellationPolicy::AllOrNothing {
                prop_assert!(g.slots_won == 0 || g.slots_won == g.total_slots_applied);
            }
            prop_assert_eq!(g.status, GroupStatus::derive(g.slots_won, g.total_slots_applied));
        }

        // determinism
        let again = run_allocation(&snap, seed, AT).unwrap();
        prop_assert_eq!(to_canonical_bytes(&r).unwrap(), to_canonical_bytes(&again).unwrap());
    }
}

#[test]
fn heavier_applicant_wins_more_often() {
    // One seat, a rival of weight 2; our weight rises. Win rate must not fall.
    let trials = 1500u64;
    let mut last = 0.0f64;
    for w in [1.0, 2.0, 4.0, 8.0] {
        let snap = Fixture::new("S-mono")
            .slot("A", 1)
            .partial("ME", &["A"], w)
            .partial("RIVAL", &["A"], 2.0)
            .build();
        let wins = (0..trials)
            .filter(|&seed| {
                let r = run_allocation(&snap, seed, AT).unwrap();
                r.entry(&"ME-A".parse().unwrap()).unwrap().status == EntryStatus::Won
            })
            .count();
        let rate = wins as f64 / trials as f64;
        assert!(rate + 0.04 >= last, "weight {w}: rate {rate} fell below {last}");
        last = rate;
    }
    assert!(last > 0.7, "weight 8 vs 2 should win about 80%, got {last}");
}
