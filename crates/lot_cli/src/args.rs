// crates/lot_cli/src/args.rs
//
// CLI argument surface for `lottery`.
//
// Rules:
// - No networked paths (any scheme:// or bare http:/https:/file: prefix is rejected)
// - Exactly one of: --manifest  XOR  --snapshot
// - --seed accepts a decimal u64 or 0x-hex (1..=16 nybbles); it overrides the manifest seed
// - --validate-only loads and checks preconditions; it never draws, writes or commits
// - --commit drives the durable committer against the snapshot's directory

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use clap::Parser;
use lot_core::{tokens::is_ts_utc_z, GroupId};
use lot_io::looks_like_url;

/// Parsed CLI arguments.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "lottery",
    disable_help_subcommand = true,
    about = "Offline, deterministic multi-slot lottery engine"
)]
pub struct Args {
    // --- Input selection ---
    /// Run manifest JSON (snapshot path, seed, commit retry policy).
    #[arg(long, conflicts_with = "snapshot")]
    pub manifest: Option<PathBuf>,

    /// Session snapshot JSON, used directly with default commit settings.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    // --- Output ---
    /// Directory for result.json and run_record.json (default: current directory).
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    // --- Determinism & control ---
    /// Draw seed. Decimal u64 or 0x-hex (≤16 hex digits). Defaults to a session-derived seed.
    #[arg(long, value_parser = parse_seed)]
    pub seed: Option<u64>,

    /// Pin the execution timestamp (YYYY-MM-DDTHH:MM:SSZ) for reproducible artifacts.
    #[arg(long, value_parser = parse_timestamp)]
    pub executed_at: Option<String>,

    /// Load the snapshot and check preconditions only.
    #[arg(long, conflicts_with_all = ["commit", "explain"])]
    pub validate_only: bool,

    /// Execute and commit through the file store next to the snapshot.
    #[arg(long)]
    pub commit: bool,

    /// Print why each entry of this group won or lost.
    #[arg(long, value_parser = parse_group)]
    pub explain: Option<GroupId>,

    /// Only warnings and errors on stderr.
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Debug-level logs on stderr.
    #[arg(long)]
    pub verbose: bool,
}

/// Errors surfaced by argument validation.
/// Keep messages short/stable (handy for scripts/tests).
#[derive(Debug)]
pub enum CliError {
    Missing(&'static str),
    NonLocalPath(String),
    NotFound(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use CliError::*;
        match self {
            Missing(s) => write!(f, "missing required flag: {s}"),
            NonLocalPath(p) => write!(f, "path must be local file (no scheme): {p}"),
            NotFound(p) => write!(f, "file not found: {p}"),
        }
    }
}
impl std::error::Error for CliError {}

/// Seed parser: decimal u64 or 0x-hex (1..=16 nybbles).
pub fn parse_seed(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty seed".into());
    }
    if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if rest.is_empty() || rest.len() > 16 || !rest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("hex seed must be 1..16 hex digits".into());
        }
        u64::from_str_radix(rest, 16).map_err(|_| "hex seed out of range".into())
    } else {
        s.parse::<u64>().map_err(|_| "decimal seed must be a valid u64".into())
    }
}

fn parse_timestamp(s: &str) -> Result<String, String> {
    if is_ts_utc_z(s) {
        Ok(s.to_string())
    } else {
        Err("expected YYYY-MM-DDTHH:MM:SSZ".into())
    }
}

fn parse_group(s: &str) -> Result<GroupId, String> {
    s.parse::<GroupId>().map_err(|e| e.to_string())
}

/// Entry point used by main.rs
pub fn parse_and_validate() -> Result<Args, CliError> {
    validate_args(Args::parse())
}

/// Mode, locality and existence checks on already-parsed flags, then path normalization.
pub fn validate_args(mut args: Args) -> Result<Args, CliError> {
    for p in [args.manifest.as_deref(), args.snapshot.as_deref(), Some(args.out.as_path())]
        .into_iter()
        .flatten()
    {
        ensure_local_path(p)?;
    }

    match (&args.manifest, &args.snapshot) {
        (Some(m), _) => ensure_local_exists(m, "--manifest")?,
        (None, Some(s)) => ensure_local_exists(s, "--snapshot")?,
        (None, None) => return Err(CliError::Missing("--manifest or --snapshot")),
    }

    args.manifest = args.manifest.take().map(|p| normalize_path(&p));
    args.snapshot = args.snapshot.take().map(|p| normalize_path(&p));
    // Output directory may not exist yet
    args.out = normalize_path(&args.out);
    Ok(args)
}

#[inline]
fn ensure_local_path(p: &Path) -> Result<(), CliError> {
    if let Some(s) = p.to_str() {
        if looks_like_url(s) {
            return Err(CliError::NonLocalPath(s.to_string()));
        }
    }
    Ok(())
}

fn ensure_local_exists(p: &Path, label: &'static str) -> Result<(), CliError> {
    ensure_local_path(p)?;
    let meta = fs::metadata(p).map_err(|_| CliError::NotFound(format!("{label} {}", p.display())))?;
    if !meta.is_file() {
        return Err(CliError::NotFound(format!("{label} {}", p.display())));
    }
    Ok(())
}

/// Best-effort absolute path; falls back to CWD-relative when canonicalize fails.
fn normalize_path(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
        }
    })
}
