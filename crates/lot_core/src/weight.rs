//! Weight Calculator: applicant attributes → strictly positive lottery weight.
//!
//! Contract:
//! - `linear`: base (default 1.0) × session multiplier.
//! - `bonus` : (base + Σ increments of the applicant's distinct bonus flags) × multiplier.
//! - `custom`: the entry's precomputed `custom_weight`, unmodified.
//! - Values ≤ 0 clamp to `WEIGHT_EPSILON`; NaN/∞ are rejected (clamping cannot repair them).
//!
//! Samplers never see floats: weights are converted once to fixed-point
//! `WeightUnits` (1 unit = 10⁻⁶) so draws and artifacts stay integer-only.

use std::collections::BTreeSet;

use crate::entities::{EntryGroup, LotterySession, SlotEntry, WeightingMethod};
use crate::errors::CoreError;

/// Fixed-point lottery weight (weight × `WEIGHT_SCALE`).
pub type WeightUnits = u64;

pub const WEIGHT_SCALE: f64 = 1_000_000.0;
pub const WEIGHT_EPSILON: f64 = 1.0 / WEIGHT_SCALE;
/// Upper bound for a single entry, leaving headroom for package sums in u64.
pub const MAX_WEIGHT_UNITS: WeightUnits = 1_000_000_000_000;

/// Compute the lottery weight of one slot entry.
pub fn compute_weight(
    group: &EntryGroup,
    entry: &SlotEntry,
    session: &LotterySession,
) -> Result<f64, CoreError> {
    let raw = match session.weighting {
        WeightingMethod::Linear => {
            let mult = finite(session.weight_multiplier)?;
            finite(group.base_weight.unwrap_or(1.0))? * mult
        }
        WeightingMethod::Bonus => {
            let mult = finite(session.weight_multiplier)?;
            let flags: BTreeSet<_> = group.bonus_flags.iter().copied().collect();
            let mut w = finite(group.base_weight.unwrap_or(1.0))?;
            for flag in flags {
                w += finite(session.bonus.increment(flag))?;
            }
            w * mult
        }
        WeightingMethod::Custom => entry.custom_weight.ok_or(CoreError::MissingCustomWeight)?,
    };
    clamp_positive(raw)
}

/// Clamp a finite weight to at least `WEIGHT_EPSILON`.
pub fn clamp_positive(w: f64) -> Result<f64, CoreError> {
    let w = finite(w)?;
    if w <= 0.0 {
        Ok(WEIGHT_EPSILON)
    } else {
        Ok(w)
    }
}

/// Convert a positive weight to fixed-point units in `[1, MAX_WEIGHT_UNITS]`.
pub fn to_weight_units(w: f64) -> WeightUnits {
    let scaled = (w * WEIGHT_SCALE).round();
    if !(scaled >= 1.0) {
        1
    } else if scaled >= MAX_WEIGHT_UNITS as f64 {
        MAX_WEIGHT_UNITS
    } else {
        scaled as WeightUnits
    }
}

#[inline]
fn finite(x: f64) -> Result<f64, CoreError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(CoreError::NonFiniteWeight(x))
    }
}
