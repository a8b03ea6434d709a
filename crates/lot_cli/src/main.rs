// crates/lot_cli/src/main.rs
//
// `lottery`: offline front end over lot_pipeline.
//
// Modes:
// - --validate-only : load + precondition checks, nothing drawn or written
// - default         : run allocation, write canonical result.json + run_record.json to --out
// - --commit        : execute + commit through the FileStore next to the snapshot,
//                     print emitted events as JSON lines on stdout
// - --explain <G>   : after a run or commit, print why each entry of group G won or lost
//
// Logs go to stderr through tracing-subscriber; stdout carries only events and
// explanations so it can be piped.

#![forbid(unsafe_code)]

mod args;

mod exitcodes {
    pub const OK: i32 = 0;
    /// Bad flags, malformed input, digest mismatch, precondition violated
    pub const VALIDATION: i32 = 2;
    /// Commit kept conflicting after every allowed re-run
    pub const CONFLICT: i32 = 3;
    /// Filesystem, store outage, event delivery, engine invariants
    pub const IO: i32 = 4;
}

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use args::{parse_and_validate as parse_cli, Args};
use lot_core::{SessionState, SessionSnapshot};
use lot_io::canonical_json::{to_canonical_bytes, write_canonical_file};
use lot_io::hasher::{seed_from_session_id, sha256_canonical};
use lot_io::loader::{load_snapshot, load_snapshot_expecting, LoadedSnapshot};
use lot_io::manifest::{load_manifest, CommitSettings};
use lot_io::IoError;
use lot_pipeline::{
    build_run_record, engine_identifiers, explain_group, run_allocation, AllocationEvent,
    AllocationResult, Clock, CommitError, CommitPolicy, EventSink, FileStore, LotteryStore,
    PipelineError, ResultCommitter, RunRecord, SinkError, StoreError, SystemClock,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Central error type for CLI → exit-code mapping.
#[derive(Debug)]
enum MainError {
    Validation(String),
    Conflict(String),
    Io(String),
}

impl std::fmt::Display for MainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MainError::Validation(m) | MainError::Conflict(m) | MainError::Io(m) => f.write_str(m),
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_cli() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("lottery: error: {e}");
            return ExitCode::from(exitcodes::VALIDATION as u8);
        }
    };
    init_tracing(&args);

    let rc = match dispatch(&args) {
        Ok(()) => exitcodes::OK,
        Err(e) => {
            eprintln!("lottery: error: {e}");
            map_error(&e)
        }
    };
    ExitCode::from(rc as u8)
}

fn init_tracing(args: &Args) {
    let default = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn dispatch(args: &Args) -> Result<(), MainError> {
    let inputs = resolve_inputs(args)?;
    if args.validate_only {
        validate_only(args, &inputs)
    } else if args.commit {
        commit_once(args, &inputs)
    } else {
        run_once(args, &inputs)
    }
}

// ---- inputs ----

/// Manifest values with CLI overrides applied.
struct RunInputs {
    snapshot_path: PathBuf,
    seed: Option<u64>,
    expect_snapshot_sha256: Option<String>,
    commit: CommitSettings,
}

fn resolve_inputs(args: &Args) -> Result<RunInputs, MainError> {
    if let Some(manifest) = &args.manifest {
        let m = load_manifest(manifest).map_err(map_io_err)?;
        return Ok(RunInputs {
            snapshot_path: m.snapshot_path,
            seed: args.seed.or(m.seed),
            expect_snapshot_sha256: m.expect_snapshot_sha256,
            commit: m.commit,
        });
    }
    let snapshot_path = args
        .snapshot
        .clone()
        .ok_or_else(|| MainError::Validation("missing --manifest or --snapshot".into()))?;
    Ok(RunInputs {
        snapshot_path,
        seed: args.seed,
        expect_snapshot_sha256: None,
        commit: CommitSettings::default(),
    })
}

fn load(inputs: &RunInputs) -> Result<LoadedSnapshot, MainError> {
    match &inputs.expect_snapshot_sha256 {
        Some(hex) => load_snapshot_expecting(&inputs.snapshot_path, hex),
        None => load_snapshot(&inputs.snapshot_path),
    }
    .map_err(map_io_err)
}

/// `--executed-at` when given, wall clock otherwise.
struct CliClock(Option<String>);

impl Clock for CliClock {
    fn now_utc(&self) -> String {
        match &self.0 {
            Some(ts) => ts.clone(),
            None => SystemClock.now_utc(),
        }
    }
}

// ---- modes ----

fn validate_only(args: &Args, inputs: &RunInputs) -> Result<(), MainError> {
    let loaded = load(inputs)?;
    let report = lot_pipeline::validate(&loaded.snapshot);
    if report.pass() {
        if !args.quiet {
            eprintln!(
                "validate-only: snapshot OK (session {}, sha256 {})",
                loaded.snapshot.session.session_id, loaded.sha256
            );
        }
        return Ok(());
    }
    for v in &report.violations {
        eprintln!("lottery: violation: {v}");
    }
    Err(MainError::Validation(format!(
        "{} precondition violation(s)",
        report.violations.len()
    )))
}

fn run_once(args: &Args, inputs: &RunInputs) -> Result<(), MainError> {
    let loaded = load(inputs)?;
    let snapshot = &loaded.snapshot;
    let seed = inputs
        .seed
        .unwrap_or_else(|| seed_from_session_id(&snapshot.session.session_id));
    let executed_at = CliClock(args.executed_at.clone()).now_utc();

    let result = run_allocation(snapshot, seed, &executed_at).map_err(map_pipeline_err)?;
    let run_record = record_for(&result, snapshot)?;
    write_artifacts(&args.out, &result, &run_record)?;
    maybe_explain(args, &result)?;

    if !args.quiet {
        eprintln!("run: artifacts written to {}", args.out.display());
    }
    Ok(())
}

fn commit_once(args: &Args, inputs: &RunInputs) -> Result<(), MainError> {
    // Digest expectation and shape are checked before the store is touched.
    let loaded = load(inputs)?;
    let session = loaded.snapshot.session.session_id.clone();

    let store = FileStore::for_snapshot(&inputs.snapshot_path);
    let committer = ResultCommitter::new(store, CommitPolicy::from(inputs.commit))
        .with_seed(inputs.seed)
        .with_clock(CliClock(args.executed_at.clone()));

    let mut sink = JsonLinesSink { out: io::stdout() };

    let result = if loaded.snapshot.session.state == SessionState::Committed {
        // A committed session is never re-drawn; only outbox leftovers are flushed.
        let delivered = committer
            .redeliver(&session, &mut sink)
            .map_err(map_commit_err)?;
        info!(session = %session, delivered, "session already committed");
        committer
            .store()
            .load_result(&session)
            .map_err(map_store_err)?
            .ok_or_else(|| MainError::Io(format!("no stored result for session {session}")))?
    } else {
        let report = committer.execute(&session, &mut sink).map_err(map_commit_err)?;
        write_artifacts(&args.out, &report.result, &report.run_record)?;
        if !args.quiet {
            eprintln!(
                "commit: session {session} committed as {} ({} run(s), {} event(s))",
                report.result.id, report.runs, report.events_delivered
            );
        }
        report.result
    };

    maybe_explain(args, &result)
}

// ---- outputs ----

/// Writes each event as one canonical JSON line.
struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn deliver(&mut self, event: &AllocationEvent) -> Result<(), SinkError> {
        let mut line = to_canonical_bytes(event).map_err(|e| SinkError(e.to_string()))?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .and_then(|()| self.out.flush())
            .map_err(|e| SinkError(e.to_string()))
    }
}

fn record_for(result: &AllocationResult, snapshot: &SessionSnapshot) -> Result<RunRecord, MainError> {
    let digest = sha256_canonical(snapshot).map_err(map_io_err)?;
    build_run_record(result, &digest, &engine_identifiers()).map_err(map_pipeline_err)
}

fn write_artifacts(out_dir: &Path, result: &AllocationResult, run_record: &RunRecord) -> Result<(), MainError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| MainError::Io(format!("mkdir {}: {e}", out_dir.display())))?;

    write_canonical_file(&out_dir.join("result.json"), result)
        .map_err(|e| MainError::Io(format!("write result.json: {e}")))?;
    write_canonical_file(&out_dir.join("run_record.json"), run_record)
        .map_err(|e| MainError::Io(format!("write run_record.json: {e}")))?;
    Ok(())
}

fn maybe_explain(args: &Args, result: &AllocationResult) -> Result<(), MainError> {
    let Some(group) = &args.explain else {
        return Ok(());
    };
    let explanation = explain_group(result, group)
        .map_err(|e| MainError::Validation(format!("explain: {e}")))?;
    let mut out = io::stdout().lock();
    write!(out, "{explanation}")
        .and_then(|()| out.flush())
        .map_err(|e| MainError::Io(format!("stdout: {e}")))
}

// ---- error mapping ----

fn map_error(e: &MainError) -> i32 {
    use exitcodes::*;
    match e {
        MainError::Validation(_) => VALIDATION,
        MainError::Conflict(_) => CONFLICT,
        MainError::Io(_) => IO,
    }
}

fn map_io_err(e: IoError) -> MainError {
    use IoError::*;
    match e {
        Json { pointer, msg } => MainError::Validation(format!("json {pointer}: {msg}")),
        Manifest(m) => MainError::Validation(format!("manifest: {m}")),
        Hash(m) => MainError::Validation(format!("hash: {m}")),
        Path(m) => MainError::Io(format!("path: {m}")),
        Limit(m) => MainError::Io(format!("limit: {m}")),
    }
}

fn map_pipeline_err(e: PipelineError) -> MainError {
    match e {
        PipelineError::Precondition(v) => MainError::Validation(format!("precondition: {v}")),
        PipelineError::Io(e) => map_io_err(e),
        other => MainError::Io(other.to_string()),
    }
}

fn map_store_err(e: StoreError) -> MainError {
    match e {
        StoreError::NotFound(_) | StoreError::Corrupt(_) => MainError::Validation(e.to_string()),
        StoreError::Conflict(_) => MainError::Conflict(e.to_string()),
        StoreError::Unavailable(_) => MainError::Io(e.to_string()),
    }
}

fn map_commit_err(e: CommitError) -> MainError {
    match e {
        CommitError::Precondition(v) => MainError::Validation(format!("precondition: {v}")),
        CommitError::ConflictRetriesExhausted { .. } => MainError::Conflict(e.to_string()),
        CommitError::Store(s) => map_store_err(s),
        CommitError::Pipeline(p) => map_pipeline_err(p),
        CommitError::StoreUnavailable { .. } | CommitError::EventDelivery { .. } => {
            MainError::Io(e.to_string())
        }
    }
}
