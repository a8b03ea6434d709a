//! lot_core: Core types, entry/slot domains, weights, and deterministic RNG.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`lot_algo`, `lot_io`, `lot_pipeline`, `lot_cli`).
//!
//! - Registry tokens: `SessionId`, `SlotId`, `GroupId`, `EntryId`, `ApplicantId`
//! - Entities: `LotterySession`, `Slot`, `EntryGroup`, `SlotEntry`, `SessionSnapshot`
//! - Status domains and the pure `GroupStatus` derivation
//! - Weight Calculator (`linear | bonus | custom`) with fixed-point weight units
//! - Seedable RNG (ChaCha20) behind the `DrawSource` seam
//!
//! Serialization derives are gated behind the `serde` feature.

#![forbid(unsafe_code)]

pub mod entities;
pub mod rng;
pub mod status;
pub mod weight;

pub mod errors {
    use std::fmt;

    /// Minimal error set for core-domain validation & parsing.
    #[derive(Clone, Debug, PartialEq)]
    pub enum CoreError {
        InvalidToken,
        /// Weight input was NaN or infinite; clamping cannot repair it.
        NonFiniteWeight(f64),
        /// `custom` weighting selected but the entry carries no precomputed weight.
        MissingCustomWeight,
        IllegalTransition { from: &'static str, to: &'static str },
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidToken => write!(f, "invalid token"),
                CoreError::NonFiniteWeight(w) => write!(f, "non-finite weight: {w}"),
                CoreError::MissingCustomWeight => write!(f, "custom weight missing"),
                CoreError::IllegalTransition { from, to } => {
                    write!(f, "illegal session transition {from} -> {to}")
                }
            }
        }
    }

    impl std::error::Error for CoreError {}
}

pub mod tokens {
    //! Registry token types with a strict charset.

    use crate::errors::CoreError;
    use std::fmt;
    use std::str::FromStr;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    fn is_token(s: &str) -> bool {
        let len = s.len();
        if !(1..=64).contains(&len) {
            return false;
        }
        s.bytes().all(|b| {
            matches!(b,
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' |
                b'_' | b'-' | b':' | b'.'
            )
        })
    }

    macro_rules! def_token {
        ($name:ident) => {
            #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
            #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
            #[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
            pub struct $name(String);

            impl $name {
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl FromStr for $name {
                type Err = CoreError;
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    if is_token(s) {
                        Ok(Self(s.to_string()))
                    } else {
                        Err(CoreError::InvalidToken)
                    }
                }
            }

            impl TryFrom<String> for $name {
                type Error = CoreError;
                fn try_from(s: String) -> Result<Self, Self::Error> {
                    if is_token(&s) {
                        Ok(Self(s))
                    } else {
                        Err(CoreError::InvalidToken)
                    }
                }
            }

            impl From<$name> for String {
                fn from(t: $name) -> String {
                    t.0
                }
            }
        };
    }

    def_token!(SessionId);
    def_token!(SlotId);
    def_token!(GroupId);
    def_token!(EntryId);
    def_token!(ApplicantId);

    /// Strict "YYYY-MM-DDTHH:MM:SSZ" check (length 20).
    pub fn is_ts_utc_z(s: &str) -> bool {
        let b = s.as_bytes();
        if b.len() != 20 {
            return false;
        }
        b[4] == b'-'
            && b[7] == b'-'
            && b[10] == b'T'
            && b[13] == b':'
            && b[16] == b':'
            && b[19] == b'Z'
            && b.iter().enumerate().all(|(i, c)| match i {
                4 | 7 | 10 | 13 | 16 | 19 => true,
                _ => c.is_ascii_digit(),
            })
    }
}

pub use entities::{
    BonusFlag, BonusSchedule, CancellationPolicy, EntryGroup, LotterySession, SessionSnapshot,
    Slot, SlotEntry, WeightingMethod,
};
pub use errors::CoreError;
pub use rng::{DrawSource, LotteryRng};
pub use status::{EntryStatus, GroupStatus, SessionState};
pub use tokens::{ApplicantId, EntryId, GroupId, SessionId, SlotId};
pub use weight::{compute_weight, to_weight_units, WeightUnits, WEIGHT_EPSILON, WEIGHT_SCALE};
