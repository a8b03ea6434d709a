//! crates/lot_io/src/hasher.rs
//!
//! Deterministic hashing and ID builders for lottery artifacts.
//!
//! - `sha256_canonical(..)` digests JSON values/structs through `canonical_json`.
//! - `sha256_hex(..)` digests raw bytes (snapshot files as read).
//! - `RES:<hex>` identifies an allocation result; `RUN:<ts>:<hex>` a run record.
//! - `seed_from_session_id(..)` gives the default draw seed when none is configured.
//!
//! Hex digests are always lowercase.

use lot_core::tokens::is_ts_utc_z;
use lot_core::SessionId;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical_json::to_canonical_bytes;
use crate::{IoError, IoResult};

/// SHA-256 over raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over the canonical JSON bytes of `value`.
pub fn sha256_canonical<T: Serialize + ?Sized>(value: &T) -> IoResult<String> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}

/// `RES:<hex>` over the canonical bytes of a result payload (without its own id).
pub fn res_id<T: Serialize + ?Sized>(payload: &T) -> IoResult<String> {
    Ok(format!("RES:{}", sha256_canonical(payload)?))
}

/// `RUN:<timestamp>:<hex>`. The timestamp must already be `YYYY-MM-DDTHH:MM:SSZ`.
pub fn run_id<T: Serialize + ?Sized>(timestamp_utc: &str, payload: &T) -> IoResult<String> {
    if !is_ts_utc_z(timestamp_utc) {
        return Err(IoError::Hash(format!(
            "run timestamp must be YYYY-MM-DDTHH:MM:SSZ, got {timestamp_utc:?}"
        )));
    }
    Ok(format!("RUN:{timestamp_utc}:{}", sha256_canonical(payload)?))
}

/// Validate an expected digest: exactly 64 lowercase hex characters.
pub fn check_sha256_hex(s: &str) -> IoResult<()> {
    if s.len() == 64 && s.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(())
    } else {
        Err(IoError::Hash(format!("expected 64 lowercase hex chars, got {s:?}")))
    }
}

/// Default seed for a session: first 8 bytes (little-endian) of SHA-256(session id).
///
/// Re-running the same session without an explicit seed therefore replays the same draw.
pub fn seed_from_session_id(session_id: &SessionId) -> u64 {
    let digest = Sha256::digest(session_id.as_str().as_bytes());
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_digest_is_lowercase_hex() {
        let h = sha256_hex(b"abc");
        assert_eq!(h, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert!(check_sha256_hex(&h).is_ok());
        assert!(check_sha256_hex(&h.to_uppercase()).is_err());
    }

    #[test]
    fn canonical_digest_ignores_key_order() {
        #[derive(Serialize)]
        struct Counts {
            won: u32,
            lost: u32,
        }
        let a = sha256_canonical(&Counts { won: 2, lost: 1 }).unwrap();
        let b = sha256_canonical(&json!({"lost": 1, "won": 2})).unwrap();
        assert_eq!(a, b);
        assert!(res_id(&json!({"x": 1})).unwrap().starts_with("RES:"));
    }

    #[test]
    fn run_id_requires_utc_seconds() {
        let id = run_id("2026-03-01T12:00:00Z", &json!({"k": 1})).unwrap();
        assert!(id.starts_with("RUN:2026-03-01T12:00:00Z:"));
        assert!(run_id("2026-03-01T12:00:00+09:00", &json!({})).is_err());
    }

    #[test]
    fn session_seed_is_stable_and_distinct() {
        let a: SessionId = "S-2026-spring".parse().unwrap();
        let b: SessionId = "S-2026-summer".parse().unwrap();
        assert_eq!(seed_from_session_id(&a), seed_from_session_id(&a));
        assert_ne!(seed_from_session_id(&a), seed_from_session_id(&b));

        let digest = Sha256::digest(b"S-2026-spring");
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        assert_eq!(seed_from_session_id(&a), u64::from_le_bytes(first));
    }
}
