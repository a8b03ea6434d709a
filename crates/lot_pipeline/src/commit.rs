//! Result Committer: run → commit → emit, with the two retry policies.
//!
//! - Concurrency conflict: the store saw capacity/revision/state drift. Reload a
//!   fresh snapshot and re-run the whole allocation (bounded by
//!   `max_conflict_retries`). Never resumes from stale in-memory state.
//! - Transient unavailability: retry the same call with exponential backoff
//!   (bounded by `max_transient_retries`), without re-running.
//! - Precondition violations return at once and are never retried.
//!
//! After the commit the outbox is drained to the sink. Delivered events are acked;
//! whatever is left (sink failure, crash) goes out again via `redeliver`.

use std::sync::Mutex;
use std::time::Duration;

use lot_core::{EntryId, SessionId};
use lot_io::hasher::{seed_from_session_id, sha256_canonical};
use lot_io::manifest::CommitSettings;
use tracing::{info, warn};

use crate::allocate::run_allocation;
use crate::clock::{Clock, SystemClock};
use crate::events::{EventSink, SinkError};
use crate::result::AllocationResult;
use crate::run_record::{build_run_record, RunRecord};
use crate::store::{CommitBatch, LotteryStore, StoreError};
use crate::{engine_identifiers, EngineMeta, PipelineError, PreconditionViolation};

// ---- backoff ----

pub trait Sleeper {
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Default)]
pub struct NoSleep {
    slept: Mutex<Vec<Duration>>,
}

impl NoSleep {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Sleeper for NoSleep {
    fn sleep(&self, d: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(d);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub max_conflict_retries: u32,
    pub max_transient_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        CommitSettings::default().into()
    }
}

impl From<CommitSettings> for CommitPolicy {
    fn from(s: CommitSettings) -> Self {
        Self {
            max_conflict_retries: s.max_conflict_retries,
            max_transient_retries: s.max_transient_retries,
            backoff_initial: Duration::from_millis(s.backoff_initial_ms),
            backoff_max: Duration::from_millis(s.backoff_max_ms),
        }
    }
}

impl CommitPolicy {
    /// Delay before retry number `retry` (0-based): initial × 2^retry, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.backoff_initial
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

// ---- errors / report ----

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("precondition violated: {0}")]
    Precondition(PreconditionViolation),
    #[error("commit still conflicting after {attempts} allocation runs; manual intervention required")]
    ConflictRetriesExhausted { attempts: u32 },
    #[error("store unavailable after {attempts} attempts: {last}")]
    StoreUnavailable { attempts: u32, last: String },
    #[error(transparent)]
    Store(StoreError),
    #[error("event delivery stopped after {delivered} events: {source}")]
    EventDelivery { delivered: usize, source: SinkError },
    #[error(transparent)]
    Pipeline(PipelineError),
}

impl From<PipelineError> for CommitError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Precondition(v) => CommitError::Precondition(v),
            other => CommitError::Pipeline(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitReport {
    pub result: AllocationResult,
    pub run_record: RunRecord,
    /// Allocation runs performed (1 + conflict re-runs).
    pub runs: u32,
    pub events_delivered: usize,
}

// ---- committer ----

pub struct ResultCommitter<S, C = SystemClock, Z = ThreadSleeper> {
    store: S,
    clock: C,
    sleeper: Z,
    policy: CommitPolicy,
    engine: EngineMeta,
    seed: Option<u64>,
}

impl<S: LotteryStore> ResultCommitter<S> {
    pub fn new(store: S, policy: CommitPolicy) -> Self {
        Self {
            store,
            clock: SystemClock,
            sleeper: ThreadSleeper,
            policy,
            engine: engine_identifiers(),
            seed: None,
        }
    }
}

impl<S: LotteryStore, C: Clock, Z: Sleeper> ResultCommitter<S, C, Z> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ResultCommitter<S, C2, Z> {
        ResultCommitter {
            store: self.store,
            clock,
            sleeper: self.sleeper,
            policy: self.policy,
            engine: self.engine,
            seed: self.seed,
        }
    }

    pub fn with_sleeper<Z2: Sleeper>(self, sleeper: Z2) -> ResultCommitter<S, C, Z2> {
        ResultCommitter {
            store: self.store,
            clock: self.clock,
            sleeper,
            policy: self.policy,
            engine: self.engine,
            seed: self.seed,
        }
    }

    /// Fix the seed; otherwise it is derived from the session id.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Execute and commit `session`, then drain its events into `sink`.
    pub fn execute(
        &self,
        session: &SessionId,
        sink: &mut dyn EventSink,
    ) -> Result<CommitReport, CommitError> {
        let seed = self.seed.unwrap_or_else(|| seed_from_session_id(session));
        let mut runs = 0u32;

        let (result, run_record) = loop {
            runs += 1;
            let snapshot = self
                .retry_transient("load snapshot", || self.store.load_snapshot(session))
                .map_err(|e| self.store_failure(e))?;

            let executed_at = self.clock.now_utc();
            let result = run_allocation(&snapshot, seed, &executed_at)?;
            let digest = sha256_canonical(&snapshot).map_err(PipelineError::from)?;
            let run_record = build_run_record(&result, &digest, &self.engine)?;
            let batch = CommitBatch::new(result)?;

            match self.retry_transient("commit", || self.store.commit(&batch)) {
                Ok(()) => break (batch.result, run_record),
                Err(StoreError::Conflict(why)) => {
                    if runs > self.policy.max_conflict_retries {
                        return Err(CommitError::ConflictRetriesExhausted { attempts: runs });
                    }
                    warn!(
                        session = %session,
                        run = runs,
                        %why,
                        "commit conflict; reloading snapshot and re-running allocation"
                    );
                }
                Err(e) => return Err(self.store_failure(e)),
            }
        };

        info!(
            session = %session,
            result = %result.id,
            runs,
            "session committed"
        );
        let events_delivered = self.deliver_pending(session, sink)?;
        Ok(CommitReport {
            result,
            run_record,
            runs,
            events_delivered,
        })
    }

    /// Deliver events left in the outbox by an earlier interrupted drain.
    pub fn redeliver(
        &self,
        session: &SessionId,
        sink: &mut dyn EventSink,
    ) -> Result<usize, CommitError> {
        let delivered = self.deliver_pending(session, sink)?;
        info!(session = %session, delivered, "redelivered pending events");
        Ok(delivered)
    }

    fn deliver_pending(
        &self,
        session: &SessionId,
        sink: &mut dyn EventSink,
    ) -> Result<usize, CommitError> {
        let pending = self
            .retry_transient("read outbox", || self.store.pending_events(session))
            .map_err(|e| self.store_failure(e))?;

        let mut acked: Vec<EntryId> = Vec::with_capacity(pending.len());
        let mut failure = None;
        for event in &pending {
            match sink.deliver(event) {
                Ok(()) => acked.push(event.idempotency_key().clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if !acked.is_empty() {
            self.retry_transient("ack events", || self.store.ack_events(session, &acked))
                .map_err(|e| self.store_failure(e))?;
        }
        match failure {
            Some(source) => {
                warn!(
                    session = %session,
                    delivered = acked.len(),
                    left = pending.len() - acked.len(),
                    "event delivery interrupted"
                );
                Err(CommitError::EventDelivery {
                    delivered: acked.len(),
                    source,
                })
            }
            None => Ok(acked.len()),
        }
    }

    fn retry_transient<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut retry = 0u32;
        loop {
            match op() {
                Err(e) if e.is_transient() && retry < self.policy.max_transient_retries => {
                    let delay = self.policy.backoff(retry);
                    warn!(
                        operation = what,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store unavailable; backing off"
                    );
                    self.sleeper.sleep(delay);
                    retry += 1;
                }
                other => return other,
            }
        }
    }

    fn store_failure(&self, e: StoreError) -> CommitError {
        match e {
            StoreError::Unavailable(last) => CommitError::StoreUnavailable {
                attempts: self.policy.max_transient_retries + 1,
                last,
            },
            other => CommitError::Store(other),
        }
    }
}
