//! Run manifest: where the snapshot lives, which seed to use, and how hard the
//! committer may retry.
//!
//! Rules:
//! - Offline only: `snapshot_path` must not carry a URL scheme.
//! - Relative paths resolve against the manifest's own directory.
//! - `expect_snapshot_sha256`, when present, is 64 lowercase hex.
//! - Retry limits are bounded; `backoff_initial_ms <= backoff_max_ms`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::canonical_json::read_json_file;
use crate::hasher::check_sha256_hex;
use crate::{looks_like_url, IoError, IoResult};

/// Hard ceiling for either retry budget.
pub const MAX_RETRIES: u32 = 100;

/// External manifest as written by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    pub snapshot_path: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub expect_snapshot_sha256: Option<String>,
    #[serde(default)]
    pub commit: CommitSettings,
}

/// Committer retry policy as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitSettings {
    /// Re-runs allowed after the store reports concurrent modification.
    pub max_conflict_retries: u32,
    /// Attempts allowed after the store reports a transient outage.
    pub max_transient_retries: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            max_transient_retries: 5,
            backoff_initial_ms: 50,
            backoff_max_ms: 2000,
        }
    }
}

impl CommitSettings {
    pub fn validate(&self) -> IoResult<()> {
        if self.max_conflict_retries > MAX_RETRIES || self.max_transient_retries > MAX_RETRIES {
            return Err(IoError::Manifest(format!(
                "retry limits must be <= {MAX_RETRIES}"
            )));
        }
        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(IoError::Manifest(format!(
                "backoff_initial_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_initial_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }
}

/// Manifest after validation and path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub snapshot_path: PathBuf,
    pub seed: Option<u64>,
    pub expect_snapshot_sha256: Option<String>,
    pub commit: CommitSettings,
}

/// Load, validate and resolve a manifest file.
pub fn load_manifest(path: &Path) -> IoResult<ResolvedManifest> {
    let shown = path.display().to_string();
    if looks_like_url(&shown) {
        return Err(IoError::Manifest(format!("manifest must be a local path: {shown}")));
    }
    let raw: RunManifest = read_json_file(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_manifest(raw, base)
}

/// Validate `raw` and resolve its relative paths against `base_dir`.
pub fn resolve_manifest(raw: RunManifest, base_dir: &Path) -> IoResult<ResolvedManifest> {
    if raw.snapshot_path.trim().is_empty() {
        return Err(IoError::Manifest("snapshot_path is empty".into()));
    }
    if looks_like_url(&raw.snapshot_path) {
        return Err(IoError::Manifest(format!(
            "snapshot_path must be a local path (no URL schemes): {}",
            raw.snapshot_path
        )));
    }
    if let Some(hex) = raw.expect_snapshot_sha256.as_deref() {
        check_sha256_hex(hex).map_err(|e| IoError::Manifest(e.to_string()))?;
    }
    raw.commit.validate()?;

    let p = Path::new(&raw.snapshot_path);
    let snapshot_path = if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    };

    Ok(ResolvedManifest {
        snapshot_path,
        seed: raw.seed,
        expect_snapshot_sha256: raw.expect_snapshot_sha256,
        commit: raw.commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(path: &str) -> RunManifest {
        RunManifest {
            snapshot_path: path.into(),
            seed: None,
            expect_snapshot_sha256: None,
            commit: CommitSettings::default(),
        }
    }

    #[test]
    fn relative_path_resolves_against_manifest_dir() {
        let r = resolve_manifest(raw("inputs/snapshot.json"), Path::new("/srv/run")).unwrap();
        assert_eq!(r.snapshot_path, PathBuf::from("/srv/run/inputs/snapshot.json"));
        assert_eq!(r.commit.max_conflict_retries, 3);
    }

    #[test]
    fn url_schemes_rejected() {
        for p in ["https://x/snap.json", "file:///tmp/s.json", "s3://bucket/s.json"] {
            assert!(matches!(
                resolve_manifest(raw(p), Path::new(".")),
                Err(IoError::Manifest(_))
            ));
        }
    }

    #[test]
    fn bad_digest_and_backoff_rejected() {
        let mut m = raw("s.json");
        m.expect_snapshot_sha256 = Some("ABC".into());
        assert!(resolve_manifest(m, Path::new(".")).is_err());

        let mut m = raw("s.json");
        m.commit.backoff_initial_ms = 5000;
        assert!(resolve_manifest(m, Path::new(".")).is_err());
    }

    #[test]
    fn partial_commit_block_keeps_defaults() {
        let m: RunManifest = serde_json::from_str(
            r#"{"snapshot_path":"s.json","seed":7,"commit":{"max_conflict_retries":1}}"#,
        )
        .unwrap();
        assert_eq!(m.seed, Some(7));
        assert_eq!(m.commit.max_conflict_retries, 1);
        assert_eq!(m.commit.max_transient_retries, 5);
        assert!(serde_json::from_str::<RunManifest>(r#"{"snapshot_path":"s","bogus":1}"#).is_err());
    }
}
