//! Property tests for the sampler and the package resolver.

use std::collections::BTreeSet;

use lot_algo::{
    resolve_packages, sample_without_replacement, weighted_order, CapacityTable, Candidate,
    PackageCandidate,
};
use lot_core::{DrawSource, GroupId, LotteryRng, SlotId};
use proptest::prelude::*;

fn sid(i: usize) -> SlotId {
    format!("SL{i:02}").parse().unwrap()
}

fn gid(i: usize) -> GroupId {
    format!("G{i:03}").parse().unwrap()
}

proptest! {
    #[test]
    fn draws_are_distinct_and_sized(
        weights in prop::collection::vec(1u64..1_000_000, 0..40),
        count in 0usize..50,
        seed in any::<u64>(),
    ) {
        let cands: Vec<Candidate<usize>> =
            weights.iter().enumerate().map(|(i, &w)| Candidate::new(i, w)).collect();
        let mut rng = LotteryRng::from_seed_u64(seed);
        let out = sample_without_replacement(&cands, count, &mut rng).unwrap();
        prop_assert_eq!(out.len(), count.min(cands.len()));
        let unique: BTreeSet<_> = out.iter().collect();
        prop_assert_eq!(unique.len(), out.len());
    }

    #[test]
    fn full_order_is_a_permutation_and_replayable(
        weights in prop::collection::vec(1u64..1_000, 1..30),
        seed in any::<u64>(),
    ) {
        let cands: Vec<Candidate<usize>> =
            weights.iter().enumerate().map(|(i, &w)| Candidate::new(i, w)).collect();
        let a = weighted_order(&cands, &mut LotteryRng::from_seed_u64(seed)).unwrap();
        let b = weighted_order(&cands, &mut LotteryRng::from_seed_u64(seed)).unwrap();
        prop_assert_eq!(&a, &b);
        let mut sorted = a.clone();
        sorted.sort();
        prop_assert_eq!(sorted, (0..cands.len()).collect::<Vec<_>>());
    }

    #[test]
    fn packages_never_oversell_a_slot(
        caps in prop::collection::vec(0u32..4, 1..6),
        packages in prop::collection::vec(
            (prop::collection::btree_set(0usize..6, 1..4), 1u64..10),
            0..25,
        ),
        seed in any::<u64>(),
    ) {
        let n_slots = caps.len();
        let table = CapacityTable::new(caps.iter().enumerate().map(|(i, &c)| (sid(i), c)));
        let cands: Vec<PackageCandidate> = packages
            .iter()
            .enumerate()
            .map(|(g, (slots, w))| {
                PackageCandidate::from_entries(
                    gid(g),
                    slots.iter().map(|s| (sid(s % n_slots), *w)),
                )
                .unwrap()
            })
            .collect();
        let out = resolve_packages(&cands, table, &mut LotteryRng::from_seed_u64(seed)).unwrap();
        prop_assert_eq!(out.decisions.len(), cands.len());

        let mut used = vec![0u32; n_slots];
        for g in out.accepted() {
            let c = cands.iter().find(|c| &c.group_id == g).unwrap();
            for s in &c.required_slots {
                used[out.capacity.index_of(s).unwrap()] += 1;
            }
        }
        for (ix, _, initial, remaining) in out.capacity.iter() {
            prop_assert!(used[ix] <= initial);
            prop_assert_eq!(initial - used[ix], remaining);
        }
    }
}

#[test]
fn monotone_in_own_weight() {
    // Raising candidate 0's weight never lowers its chance of a single seat out of 4.
    let others = [3u64, 5, 2];
    let mut last_rate = 0.0f64;
    for w0 in [1u64, 2, 4, 8, 16] {
        let mut cands = vec![Candidate::new(0usize, w0)];
        cands.extend(others.iter().enumerate().map(|(i, &w)| Candidate::new(i + 1, w)));
        let trials = 4_000u64;
        let wins = (0..trials)
            .filter(|&seed| {
                let mut rng = LotteryRng::from_seed_u64(seed);
                sample_without_replacement(&cands, 1, &mut rng).unwrap()[0] == 0
            })
            .count();
        let rate = wins as f64 / trials as f64;
        // Allow small sampling noise between neighbouring steps.
        assert!(rate + 0.02 >= last_rate, "rate {rate} dropped below {last_rate} at w0={w0}");
        last_rate = rate;
    }
    assert!(last_rate > 0.55);
}

#[test]
fn count_zero_leaves_stream_untouched() {
    let cands = vec![Candidate::new(1u8, 1), Candidate::new(2u8, 1)];
    let mut rng = LotteryRng::from_seed_u64(77);
    let _ = sample_without_replacement(&cands, 0, &mut rng).unwrap();
    assert_eq!(rng.words_consumed(), 0);
}
