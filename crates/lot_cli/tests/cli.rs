use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const AT: &str = "2026-03-08T09:00:00Z";

// Slot A has one seat, slot B two. G1 wants both as a package.
const SNAPSHOT: &str = r#"{
  "session": {
    "session_id": "S-spring",
    "entry_start": "2026-03-01T00:00:00Z",
    "entry_end": "2026-03-07T00:00:00Z",
    "weighting": "linear",
    "state": "closed"
  },
  "slots": [
    {"slot_id": "A", "sequence": 1, "capacity": 1},
    {"slot_id": "B", "sequence": 2, "capacity": 2}
  ],
  "groups": [
    {"group_id": "G1", "session_id": "S-spring", "applicant_id": "U1",
     "policy": "all_or_nothing", "total_slots_applied": 2, "revision": 1},
    {"group_id": "G2", "session_id": "S-spring", "applicant_id": "U2",
     "policy": "partial_ok", "total_slots_applied": 2, "revision": 1},
    {"group_id": "G3", "session_id": "S-spring", "applicant_id": "U3",
     "policy": "partial_ok", "total_slots_applied": 1, "revision": 1}
  ],
  "entries": [
    {"entry_id": "G1-A", "group_id": "G1", "slot_id": "A"},
    {"entry_id": "G1-B", "group_id": "G1", "slot_id": "B"},
    {"entry_id": "G2-A", "group_id": "G2", "slot_id": "A"},
    {"entry_id": "G2-B", "group_id": "G2", "slot_id": "B"},
    {"entry_id": "G3-B", "group_id": "G3", "slot_id": "B"}
  ]
}"#;

fn lottery() -> Command {
    let mut cmd = Command::cargo_bin("lottery").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_snapshot(dir: &Path, body: &str) -> PathBuf {
    let p = dir.join("snapshot.json");
    fs::write(&p, body).unwrap();
    p
}

#[test]
fn validate_only_accepts_a_closed_session() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), SNAPSHOT);

    lottery()
        .arg("--snapshot")
        .arg(&snap)
        .arg("--validate-only")
        .assert()
        .success()
        .stderr(predicate::str::contains("snapshot OK"));
    assert!(!dir.path().join("result.json").exists());
}

#[test]
fn validate_only_reports_precondition_violations() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), &SNAPSHOT.replace(r#""state": "closed""#, r#""state": "open""#));

    lottery()
        .arg("--snapshot")
        .arg(&snap)
        .arg("--validate-only")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("session is open"));
}

#[test]
fn run_writes_identical_artifacts_for_same_seed() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), SNAPSHOT);
    let (out1, out2) = (dir.path().join("out1"), dir.path().join("out2"));

    for out in [&out1, &out2] {
        lottery()
            .arg("--snapshot")
            .arg(&snap)
            .args(["--seed", "0x2A", "--executed-at", AT, "--quiet", "--out"])
            .arg(out)
            .assert()
            .success();
    }

    let r1 = fs::read(out1.join("result.json")).unwrap();
    let r2 = fs::read(out2.join("result.json")).unwrap();
    assert_eq!(r1, r2);
    assert_eq!(
        fs::read(out1.join("run_record.json")).unwrap(),
        fs::read(out2.join("run_record.json")).unwrap()
    );

    let result: serde_json::Value = serde_json::from_slice(&r1).unwrap();
    assert!(result["id"].as_str().unwrap().starts_with("RES:"));
    assert_eq!(result["seed"], 42);
    // The input file is never modified by a plain run.
    assert_eq!(fs::read_to_string(&snap).unwrap(), SNAPSHOT);
}

#[test]
fn explain_prints_group_breakdown() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), SNAPSHOT);

    lottery()
        .arg("--snapshot")
        .arg(&snap)
        .args(["--seed", "7", "--executed-at", AT, "--quiet", "--explain", "G1", "--out"])
        .arg(dir.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("group G1 (all_or_nothing):"))
        .stdout(predicate::str::contains("G1-A slot A"))
        .stdout(predicate::str::contains("G1-B slot B"));
}

#[test]
fn explain_unknown_group_fails() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), SNAPSHOT);

    lottery()
        .arg("--snapshot")
        .arg(&snap)
        .args(["--executed-at", AT, "--quiet", "--explain", "G9", "--out"])
        .arg(dir.path().join("out"))
        .assert()
        .code(2);
}

#[test]
fn commit_emits_one_event_per_entry_then_nothing_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let snap = write_snapshot(dir.path(), SNAPSHOT);
    let out = dir.path().join("out");

    let first = lottery()
        .arg("--snapshot")
        .arg(&snap)
        .args(["--commit", "--seed", "11", "--executed-at", AT, "--quiet", "--out"])
        .arg(&out)
        .assert()
        .success();
    let stdout = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 5);
    let winners = events.iter().filter(|e| e["outcome"] == "winner").count();
    assert!(winners >= 1 && winners <= 3, "at most 3 seats exist, got {winners}");
    assert!(events.iter().all(|e| e["session_id"] == "S-spring"));

    let committed: serde_json::Value =
        serde_json::from_slice(&fs::read(&snap).unwrap()).unwrap();
    assert_eq!(committed["session"]["state"], "committed");
    assert!(dir.path().join("result.json").exists());
    assert!(out.join("run_record.json").exists());

    // Everything was acked, and a committed session is never drawn again.
    lottery()
        .arg("--snapshot")
        .arg(&snap)
        .args(["--commit", "--quiet", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn manifest_digest_mismatch_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), SNAPSHOT);
    let manifest = dir.path().join("manifest.json");
    fs::write(
        &manifest,
        format!(
            r#"{{"snapshot_path":"snapshot.json","expect_snapshot_sha256":"{}"}}"#,
            "0".repeat(64)
        ),
    )
    .unwrap();

    lottery()
        .arg("--manifest")
        .arg(&manifest)
        .arg("--validate-only")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("digest mismatch"));
}

#[test]
fn manifest_seed_applies_unless_overridden() {
    let dir = tempfile::tempdir().unwrap();
    write_snapshot(dir.path(), SNAPSHOT);
    let manifest = dir.path().join("manifest.json");
    fs::write(&manifest, r#"{"snapshot_path":"snapshot.json","seed":5}"#).unwrap();

    let run = |extra: &[&str], out: &Path| -> serde_json::Value {
        lottery()
            .arg("--manifest")
            .arg(&manifest)
            .args(["--executed-at", AT, "--quiet"])
            .args(extra)
            .arg("--out")
            .arg(out)
            .assert()
            .success();
        serde_json::from_slice(&fs::read(out.join("result.json")).unwrap()).unwrap()
    };

    assert_eq!(run(&[], &dir.path().join("a"))["seed"], 5);
    assert_eq!(run(&["--seed", "6"], &dir.path().join("b"))["seed"], 6);
}

#[test]
fn rejects_remote_and_missing_inputs() {
    lottery()
        .args(["--snapshot", "https://example.org/snapshot.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no scheme"));

    lottery()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing required flag"));
}
