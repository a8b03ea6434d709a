//! Status domains for slot entries, entry groups, and lottery sessions.
//!
//! `GroupStatus` is never stored independently of its counts: it is always
//! re-derived from `(slots_won, total_slots_applied)` via [`GroupStatus::derive`].

use crate::errors::CoreError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Resolution state of a single (group × slot) request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntryStatus {
    Entered,
    Won,
    Lost,
}

impl EntryStatus {
    pub fn is_resolved(self) -> bool {
        !matches!(self, EntryStatus::Entered)
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryStatus::Entered => "entered",
            EntryStatus::Won => "won",
            EntryStatus::Lost => "lost",
        }
    }
}

/// Aggregate outcome of one applicant's application.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GroupStatus {
    Entered,
    PartiallyWon,
    AllWon,
    AllLost,
}

impl GroupStatus {
    /// 0 → `AllLost`; equal → `AllWon`; strictly between → `PartiallyWon`.
    ///
    /// `total == 0` cannot pass validation upstream; it maps to `AllLost` so the
    /// function stays total.
    pub fn derive(slots_won: u32, total_slots_applied: u32) -> GroupStatus {
        if slots_won == 0 || total_slots_applied == 0 {
            GroupStatus::AllLost
        } else if slots_won >= total_slots_applied {
            GroupStatus::AllWon
        } else {
            GroupStatus::PartiallyWon
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GroupStatus::Entered => "entered",
            GroupStatus::PartiallyWon => "partially_won",
            GroupStatus::AllWon => "all_won",
            GroupStatus::AllLost => "all_lost",
        }
    }
}

/// Lifecycle of a lottery session: `open → closed → executed → committed`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionState {
    Open,
    Closed,
    Executed,
    Committed,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Closed => "closed",
            SessionState::Executed => "executed",
            SessionState::Committed => "committed",
        }
    }

    /// Forward-only transitions; a session is never executed twice.
    pub fn advance(self, to: SessionState) -> Result<SessionState, CoreError> {
        use SessionState::*;
        match (self, to) {
            (Open, Closed) | (Closed, Executed) | (Executed, Committed) => Ok(to),
            _ => Err(CoreError::IllegalTransition {
                from: self.label(),
                to: to.label(),
            }),
        }
    }

    /// True once an allocation result exists for the session.
    pub fn has_run(self) -> bool {
        matches!(self, SessionState::Executed | SessionState::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_status_is_pure_function_of_counts() {
        assert_eq!(GroupStatus::derive(0, 3), GroupStatus::AllLost);
        assert_eq!(GroupStatus::derive(3, 3), GroupStatus::AllWon);
        assert_eq!(GroupStatus::derive(1, 3), GroupStatus::PartiallyWon);
        assert_eq!(GroupStatus::derive(0, 0), GroupStatus::AllLost);
    }

    #[test]
    fn session_transitions_are_forward_only() {
        assert_eq!(SessionState::Open.advance(SessionState::Closed), Ok(SessionState::Closed));
        assert_eq!(
            SessionState::Closed.advance(SessionState::Executed),
            Ok(SessionState::Executed)
        );
        assert!(SessionState::Executed.advance(SessionState::Executed).is_err());
        assert!(SessionState::Committed.advance(SessionState::Executed).is_err());
        assert!(SessionState::Open.advance(SessionState::Executed).is_err());
    }
}
