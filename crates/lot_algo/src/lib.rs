// crates/lot_algo/src/lib.rs
#![forbid(unsafe_code)]

//! Pure allocation algorithms. No I/O, no logging, no ambient randomness:
//! every draw goes through an injected `DrawSource`.
//!
//! Phase order is the caller's responsibility (`lot_pipeline`): packages first,
//! then independent per-slot draws against the capacity packages left behind.

use lot_core::SlotId;

pub mod capacity;
pub mod independent;
pub mod packages;
pub mod sampler;

pub use capacity::{CapacityTable, SlotIx};
pub use independent::{
    resolve_independent, resolve_slot, slot_stream_id, IndependentOutcome, SlotDraw, SlotPool,
};
pub use packages::{
    resolve_packages, PackageCandidate, PackageDecision, PackageOutcome, PackageVerdict,
    RejectReason,
};
pub use sampler::{sample_without_replacement, weighted_order, Candidate};

/// Errors surfaced by the algorithm layer. All indicate bad input, never bad luck.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlgoError {
    #[error("candidate weight must be positive")]
    ZeroWeight,
    #[error("sum of candidate weights overflows u64")]
    WeightOverflow,
    #[error("unknown slot: {0}")]
    UnknownSlot(SlotId),
    #[error("package requests no slots")]
    EmptyPackage,
}
