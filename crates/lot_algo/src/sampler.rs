//! Weighted sampling without replacement.
//!
//! Contract:
//! - Each draw picks a remaining candidate with probability proportional to its
//!   weight, then removes it. Output length = `min(count, candidates.len())`.
//! - Drawing until the pool is empty yields a full weighted ranking (`weighted_order`).
//! - `count == 0` (or an empty pool) returns immediately without touching the RNG.
//! - When a single candidate remains it is taken without a draw.
//!
//! Determinism:
//! - Candidates are indexed in the order given; the caller fixes that order.
//! - Selection uses a Fenwick tree of integer weights and one `gen_range(total)`
//!   per draw, so results depend only on the input order and the RNG stream.

use lot_core::{DrawSource, WeightUnits};

use crate::AlgoError;

/// One entrant of a draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate<K> {
    pub id: K,
    pub weight: WeightUnits,
}

impl<K> Candidate<K> {
    pub fn new(id: K, weight: WeightUnits) -> Self {
        Self { id, weight }
    }
}

/// Draw up to `count` winners, in draw order.
pub fn sample_without_replacement<K, R>(
    candidates: &[Candidate<K>],
    count: usize,
    rng: &mut R,
) -> Result<Vec<K>, AlgoError>
where
    K: Clone,
    R: DrawSource + ?Sized,
{
    if count == 0 || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut tree = CumulativeWeights::new(candidates)?;
    let target = count.min(candidates.len());
    let mut out = Vec::with_capacity(target);

    while out.len() < target {
        let pick = if out.len() + 1 == candidates.len() {
            // Last survivor: position 0 of the running total is the only nonzero bucket.
            tree.find(0)
        } else {
            let r = rng.gen_range(tree.total()).ok_or(AlgoError::ZeroWeight)?;
            tree.find(r)
        };
        tree.remove(pick, candidates[pick].weight);
        out.push(candidates[pick].id.clone());
    }

    Ok(out)
}

/// Full weighted processing order over every candidate.
pub fn weighted_order<K, R>(candidates: &[Candidate<K>], rng: &mut R) -> Result<Vec<K>, AlgoError>
where
    K: Clone,
    R: DrawSource + ?Sized,
{
    sample_without_replacement(candidates, candidates.len(), rng)
}

// ----------------------------- running totals -----------------------------

/// Fenwick tree over candidate weights (1-based internally).
struct CumulativeWeights {
    tree: Vec<u64>,
    total: u64,
}

impl CumulativeWeights {
    fn new<K>(candidates: &[Candidate<K>]) -> Result<Self, AlgoError> {
        let n = candidates.len();
        let mut tree = vec![0u64; n + 1];
        let mut total: u64 = 0;
        for (i, c) in candidates.iter().enumerate() {
            if c.weight == 0 {
                return Err(AlgoError::ZeroWeight);
            }
            total = total.checked_add(c.weight).ok_or(AlgoError::WeightOverflow)?;
            tree[i + 1] += c.weight;
            let parent = (i + 1) + lowbit(i + 1);
            if parent <= n {
                // Partial sums never exceed `total`, which was checked above.
                tree[parent] += tree[i + 1];
            }
        }
        Ok(Self { tree, total })
    }

    fn total(&self) -> u64 {
        self.total
    }

    /// Subtract `weight` from position `ix` (0-based).
    fn remove(&mut self, ix: usize, weight: u64) {
        let n = self.tree.len() - 1;
        let mut i = ix + 1;
        while i <= n {
            self.tree[i] -= weight;
            i += lowbit(i);
        }
        self.total -= weight;
    }

    /// Smallest 0-based position whose inclusive prefix sum exceeds `r`.
    fn find(&self, r: u64) -> usize {
        let n = self.tree.len() - 1;
        let mut pos = 0usize;
        let mut rem = r;
        let mut step = if n == 0 { 0 } else { 1usize << (usize::BITS - 1 - n.leading_zeros()) };
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= rem {
                pos = next;
                rem -= self.tree[next];
            }
            step >>= 1;
        }
        pos
    }
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lot_core::LotteryRng;

    /// Replays a fixed list of draws; panics if asked for more.
    struct Scripted {
        draws: Vec<u64>,
        used: u128,
    }

    impl DrawSource for Scripted {
        fn gen_range(&mut self, n: u64) -> Option<u64> {
            if n == 0 {
                return None;
            }
            let v = self.draws.remove(0);
            self.used += 1;
            Some(v % n)
        }
        fn words_consumed(&self) -> u128 {
            self.used
        }
        fn stream(&self, _id: u64) -> Self {
            Scripted { draws: self.draws.clone(), used: 0 }
        }
    }

    fn cands(ws: &[u64]) -> Vec<Candidate<usize>> {
        ws.iter().enumerate().map(|(i, &w)| Candidate::new(i, w)).collect()
    }

    #[test]
    fn count_zero_does_not_consume_rng() {
        let mut rng = LotteryRng::from_seed_u64(9);
        let out = sample_without_replacement(&cands(&[1, 2, 3]), 0, &mut rng).unwrap();
        assert!(out.is_empty());
        assert_eq!(rng.words_consumed(), 0);
    }

    #[test]
    fn cumulative_search_maps_draws_to_buckets() {
        // weights 2,3,5 → buckets [0,2) [2,5) [5,10)
        let c = cands(&[2, 3, 5]);
        let mut s = Scripted { draws: vec![4], used: 0 };
        assert_eq!(sample_without_replacement(&c, 1, &mut s).unwrap(), vec![1]);
        let mut s = Scripted { draws: vec![9], used: 0 };
        assert_eq!(sample_without_replacement(&c, 1, &mut s).unwrap(), vec![2]);
        let mut s = Scripted { draws: vec![0], used: 0 };
        assert_eq!(sample_without_replacement(&c, 1, &mut s).unwrap(), vec![0]);
    }

    #[test]
    fn removal_reweights_remaining_pool() {
        // First draw 5 → idx 2 (weight 5). Remaining 2,3 → draw 2 → idx 1. Last taken free.
        let c = cands(&[2, 3, 5]);
        let mut s = Scripted { draws: vec![5, 2], used: 0 };
        assert_eq!(weighted_order(&c, &mut s).unwrap(), vec![2, 1, 0]);
        assert_eq!(s.words_consumed(), 2);
    }

    #[test]
    fn output_is_capped_by_pool_size() {
        let mut rng = LotteryRng::from_seed_u64(1);
        let out = sample_without_replacement(&cands(&[1, 1]), 5, &mut rng).unwrap();
        assert_eq!(out.len(), 2);
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn zero_weight_and_overflow_are_rejected() {
        let mut rng = LotteryRng::from_seed_u64(1);
        assert_eq!(
            sample_without_replacement(&cands(&[1, 0]), 1, &mut rng),
            Err(AlgoError::ZeroWeight)
        );
        assert_eq!(
            sample_without_replacement(&cands(&[u64::MAX, 1]), 1, &mut rng),
            Err(AlgoError::WeightOverflow)
        );
    }

    #[test]
    fn equal_weights_degenerate_to_uniform() {
        // Each of 4 equal candidates should win first place ~25% of the time.
        let c = cands(&[7, 7, 7, 7]);
        let trials = 8_000u64;
        let mut firsts = [0u64; 4];
        for seed in 0..trials {
            let mut rng = LotteryRng::from_seed_u64(seed);
            let out = sample_without_replacement(&c, 1, &mut rng).unwrap();
            firsts[out[0]] += 1;
        }
        let expected = trials / 4;
        for f in firsts {
            let dev = (f as i64 - expected as i64).unsigned_abs();
            assert!(dev < expected / 10, "first-place counts {firsts:?} not uniform");
        }
    }

    #[test]
    fn heavier_candidate_wins_proportionally_more() {
        // weights 1 and 3 → heavy wins a single draw ~75% of the time.
        let c = cands(&[1, 3]);
        let trials = 8_000u64;
        let heavy_wins = (0..trials)
            .filter(|&seed| {
                let mut rng = LotteryRng::from_seed_u64(seed);
                sample_without_replacement(&c, 1, &mut rng).unwrap()[0] == 1
            })
            .count() as f64;
        let share = heavy_wins / trials as f64;
        assert!((share - 0.75).abs() < 0.03, "heavy share {share}");
    }
}
