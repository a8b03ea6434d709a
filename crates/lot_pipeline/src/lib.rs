//! lot_pipeline: deterministic lottery orchestration plus durable commit.
//!
//! Stages: validate → weigh → packages (phase 1) → independent slots (phase 2)
//! → aggregate → result/run record. Everything up to the result is pure and
//! in-memory; only `commit::ResultCommitter` touches a `store::LotteryStore`.
//!
//! JSON shape and hashing go through `lot_io`; draws go through `lot_algo`.

#![forbid(unsafe_code)]

use lot_algo::AlgoError;
use lot_core::{
    ApplicantId, EntryId, EntryStatus, GroupId, SessionId, SessionState, SlotId,
};
use lot_io::IoError;
use serde::{Deserialize, Serialize};

pub mod allocate;
pub mod clock;
pub mod commit;
pub mod events;
pub mod explain;
pub mod result;
pub mod run_record;
pub mod session;
pub mod store;
pub mod validate;
pub mod weigh;

pub use allocate::{check_invariants, run_allocation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use commit::{
    CommitError, CommitPolicy, CommitReport, NoSleep, ResultCommitter, Sleeper, ThreadSleeper,
};
pub use events::{
    events_for, AllocationEvent, DedupSink, EventSink, Outcome, RecordingSink, SinkError,
};
pub use explain::{explain_group, ExplainLine, GroupExplanation, Reason};
pub use result::AllocationResult;
pub use run_record::{build_run_record, RunRecord};
pub use session::{apply_result, execute_session, mark_committed};
pub use store::{CommitBatch, FileStore, LotteryStore, MemoryStore, StoreError};
pub use validate::{ensure_valid, validate, ValidationReport};
pub use weigh::{weigh_entries, WeightTable};

/// Engine identifiers echoed into every run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMeta {
    pub vendor: String,
    pub name: String,
    pub version: String,
    pub build: String,
}

pub fn engine_identifiers() -> EngineMeta {
    EngineMeta {
        vendor: "lot".to_string(),
        name: "lot_engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: if cfg!(debug_assertions) { "dev" } else { "release" }.to_string(),
    }
}

/// Caller or data bugs. Fatal: the run aborts with no side effects and is never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionViolation {
    #[error("session is {}, expected closed", .state.label())]
    SessionNotClosed { state: SessionState },
    #[error("session already {}; a session is executed at most once", .state.label())]
    AlreadyExecuted { state: SessionState },
    #[error("duplicate slot id {0}")]
    DuplicateSlot(SlotId),
    #[error("duplicate group id {0}")]
    DuplicateGroup(GroupId),
    #[error("duplicate entry id {0}")]
    DuplicateEntry(EntryId),
    #[error("applicant {applicant} has more than one entry group")]
    DuplicateApplicant { applicant: ApplicantId },
    #[error("group {group} belongs to session {session}")]
    ForeignGroup { group: GroupId, session: SessionId },
    #[error("entry {entry} references unknown group {group}")]
    UnknownGroup { entry: EntryId, group: GroupId },
    #[error("entry {entry} references unknown slot {slot}")]
    UnknownSlot { entry: EntryId, slot: SlotId },
    #[error("group {group} declares {declared} slots but has {actual} entries")]
    EntryCountMismatch {
        group: GroupId,
        declared: u32,
        actual: u32,
    },
    #[error("entry {entry} is already {}", .status.label())]
    EntryNotPending { entry: EntryId, status: EntryStatus },
    #[error("entry {entry}: {reason}")]
    InvalidWeight { entry: EntryId, reason: String },
    #[error("total lottery weight overflows")]
    WeightOverflow,
}

/// Single error surface for orchestration.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionViolation),
    /// A post-run invariant failed. Indicates an engine bug, never bad input.
    #[error("invariant broken: {0}")]
    Invariant(String),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("build error: {0}")]
    Build(String),
}

impl PipelineError {
    pub fn is_precondition(&self) -> bool {
        matches!(self, PipelineError::Precondition(_))
    }
}

impl From<AlgoError> for PipelineError {
    fn from(e: AlgoError) -> Self {
        match e {
            AlgoError::WeightOverflow => PreconditionViolation::WeightOverflow.into(),
            // Validation rules these out before any draw.
            other => PipelineError::Invariant(other.to_string()),
        }
    }
}
