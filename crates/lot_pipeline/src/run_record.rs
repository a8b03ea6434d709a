// crates/lot_pipeline/src/run_record.rs
//
// Run record: provenance of one allocation run.
//
// - Echoes session, seed, executed_at and engine meta verbatim.
// - Binds the input (`snapshot_sha256`, raw file digest) to the output (`result_id`).
// - `id` = `RUN:<executed_at>:` + SHA-256 of the canonical record without `id`.
//
// Together with the seed, the record is enough to replay and audit a run.

use lot_core::SessionId;
use lot_io::hasher;
use serde::{Deserialize, Serialize};

use crate::result::AllocationResult;
use crate::{EngineMeta, PipelineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub session_id: SessionId,
    pub executed_at: String,
    pub seed: u64,
    pub engine: EngineMeta,
    pub snapshot_sha256: String,
    pub result_id: String,
    pub counts: RunCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub slots: u32,
    pub groups: u32,
    pub entries: u32,
    pub won: u32,
    pub lost: u32,
}

/// Assemble the record for `result`; `snapshot_sha256` is the digest of the input bytes.
pub fn build_run_record(
    result: &AllocationResult,
    snapshot_sha256: &str,
    engine: &EngineMeta,
) -> Result<RunRecord, PipelineError> {
    let counts = RunCounts {
        slots: result.slots.len() as u32,
        groups: result.groups.len() as u32,
        entries: result.entries.len() as u32,
        won: result.won_count() as u32,
        lost: result.lost_count() as u32,
    };

    #[derive(Serialize)]
    struct RunNoId<'a> {
        session_id: &'a SessionId,
        executed_at: &'a str,
        seed: u64,
        engine: &'a EngineMeta,
        snapshot_sha256: &'a str,
        result_id: &'a str,
        counts: &'a RunCounts,
    }
    let body = RunNoId {
        session_id: &result.session_id,
        executed_at: &result.executed_at,
        seed: result.seed,
        engine,
        snapshot_sha256,
        result_id: &result.id,
        counts: &counts,
    };
    let id = hasher::run_id(&result.executed_at, &body)?;

    Ok(RunRecord {
        id,
        session_id: result.session_id.clone(),
        executed_at: result.executed_at.clone(),
        seed: result.seed,
        engine: engine.clone(),
        snapshot_sha256: snapshot_sha256.to_string(),
        result_id: result.id.clone(),
        counts,
    })
}
