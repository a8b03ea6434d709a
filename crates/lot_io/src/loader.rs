//! Snapshot loading.
//!
//! A snapshot is the frozen input of one run: session, slots, groups, entries.
//! The loader enforces the offline posture, a size cap, and strict JSON shape
//! (unknown top-level fields rejected), then returns the snapshot in normalized
//! order together with the SHA-256 of the file bytes exactly as read.
//!
//! Semantic preconditions (state closed, referential integrity, ...) belong to
//! the pipeline's validation stage, not here.

use std::fs;
use std::path::Path;

use lot_core::SessionSnapshot;

use crate::hasher::{check_sha256_hex, sha256_hex};
use crate::{looks_like_url, IoError, IoResult};

/// Upper bound on snapshot file size.
pub const MAX_SNAPSHOT_BYTES: u64 = 64 * 1024 * 1024;

/// A parsed snapshot plus the digest of its source bytes.
#[derive(Clone, Debug)]
pub struct LoadedSnapshot {
    pub snapshot: SessionSnapshot,
    pub sha256: String,
}

/// Read, hash, parse and normalize a snapshot file.
pub fn load_snapshot(path: &Path) -> IoResult<LoadedSnapshot> {
    let shown = path.display().to_string();
    if looks_like_url(&shown) {
        return Err(IoError::Path(format!("snapshot must be a local path: {shown}")));
    }
    let meta = fs::metadata(path).map_err(|e| IoError::Path(format!("{shown}: {e}")))?;
    if meta.len() > MAX_SNAPSHOT_BYTES {
        return Err(IoError::Limit(format!(
            "{shown} is {} bytes (max {MAX_SNAPSHOT_BYTES})",
            meta.len()
        )));
    }
    let bytes = fs::read(path).map_err(|e| IoError::Path(format!("{shown}: {e}")))?;
    parse_snapshot(&bytes)
}

/// Like [`load_snapshot`], but fails unless the file digest equals `expected`.
pub fn load_snapshot_expecting(path: &Path, expected: &str) -> IoResult<LoadedSnapshot> {
    check_sha256_hex(expected)?;
    let loaded = load_snapshot(path)?;
    if loaded.sha256 != expected {
        return Err(IoError::Hash(format!(
            "snapshot digest mismatch: expected {expected}, got {}",
            loaded.sha256
        )));
    }
    Ok(loaded)
}

/// Parse snapshot bytes already in memory.
pub fn parse_snapshot(bytes: &[u8]) -> IoResult<LoadedSnapshot> {
    let sha256 = sha256_hex(bytes);
    let mut snapshot: SessionSnapshot =
        serde_json::from_slice(bytes).map_err(|e| IoError::Json {
            pointer: format!("line {} column {}", e.line(), e.column()),
            msg: e.to_string(),
        })?;
    snapshot.normalize();
    Ok(LoadedSnapshot { snapshot, sha256 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lot_core::SessionState;

    const MINIMAL: &str = r#"{
        "session": {
            "session_id": "S1",
            "entry_start": "2026-03-01T00:00:00Z",
            "entry_end": "2026-03-07T00:00:00Z",
            "weighting": "linear",
            "state": "closed"
        },
        "slots": [
            {"slot_id": "slot-b", "sequence": 2, "capacity": 1},
            {"slot_id": "slot-a", "sequence": 1, "capacity": 2}
        ],
        "groups": [
            {"group_id": "G1", "session_id": "S1", "applicant_id": "U1",
             "policy": "partial_ok", "total_slots_applied": 1}
        ],
        "entries": [
            {"entry_id": "E1", "group_id": "G1", "slot_id": "slot-a"}
        ]
    }"#;

    #[test]
    fn parses_normalizes_and_fills_defaults() {
        let loaded = parse_snapshot(MINIMAL.as_bytes()).unwrap();
        let s = &loaded.snapshot;
        assert_eq!(s.session.state, SessionState::Closed);
        assert_eq!(s.session.weight_multiplier, 1.0);
        assert_eq!(s.slots[0].slot_id.as_str(), "slot-a");
        assert_eq!(s.groups[0].revision, 0);
        assert_eq!(loaded.sha256, sha256_hex(MINIMAL.as_bytes()));
    }

    #[test]
    fn unknown_top_level_field_rejected() {
        let doc = MINIMAL.replacen("\"slots\"", "\"extra\": 1, \"slots\"", 1);
        assert!(matches!(parse_snapshot(doc.as_bytes()), Err(IoError::Json { .. })));
    }

    #[test]
    fn digest_expectation_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("snapshot.json");
        fs::write(&p, MINIMAL).unwrap();
        let good = sha256_hex(MINIMAL.as_bytes());
        assert!(load_snapshot_expecting(&p, &good).is_ok());
        let bad = "0".repeat(64);
        assert!(matches!(load_snapshot_expecting(&p, &bad), Err(IoError::Hash(_))));
    }
}
