//! crates/lot_io/src/lib.rs
//! Single-source-of-truth I/O crate for the lottery engine.
//!
//! - Canonical JSON bytes and atomic artifact writes (`canonical_json`)
//! - SHA-256 digests, `RES:`/`RUN:` identifiers, session-derived seeds (`hasher`)
//! - Frozen session snapshots (`loader`) and run manifests (`manifest`)
//!
//! Offline posture: any path carrying a URL scheme is rejected.

#![forbid(unsafe_code)]

use thiserror::Error;

pub mod canonical_json;
pub mod hasher;
pub mod loader;
pub mod manifest;

/// Unified error for lot_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, create_dir_all, rename, fsync, ...).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON (de)serialization errors with a JSON-Pointer-ish location.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// Hashing / digest expectation errors.
    #[error("hash error: {0}")]
    Hash(String),

    /// Manifest shape or policy violations.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Size limits exceeded.
    #[error("limit exceeded: {0}")]
    Limit(String),
}

pub type IoResult<T> = Result<T, IoError>;

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json keeps line/column rather than a pointer; report the root.
        IoError::Json {
            pointer: "/".to_string(),
            msg: e.to_string(),
        }
    }
}

/// Returns true if `s` looks like a URL (any `<scheme>://`, or a bare http/https/file prefix).
#[inline]
pub fn looks_like_url(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    lower.contains("://")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("file:")
}
