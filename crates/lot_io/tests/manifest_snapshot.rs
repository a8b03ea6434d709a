use std::fs;

use lot_io::hasher::sha256_hex;
use lot_io::loader::load_snapshot_expecting;
use lot_io::manifest::load_manifest;
use lot_io::IoError;

const SNAPSHOT: &str = r#"{
  "session": {
    "session_id": "S-spring",
    "entry_start": "2026-03-01T00:00:00Z",
    "entry_end": "2026-03-07T00:00:00Z",
    "weighting": "bonus",
    "state": "closed"
  },
  "slots": [{"slot_id": "A", "sequence": 1, "capacity": 1}],
  "groups": [{"group_id": "G1", "session_id": "S-spring", "applicant_id": "U1",
              "policy": "all_or_nothing", "total_slots_applied": 1,
              "bonus_flags": ["loyalty"]}],
  "entries": [{"entry_id": "E1", "group_id": "G1", "slot_id": "A"}]
}"#;

#[test]
fn manifest_drives_snapshot_load_with_digest_check() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("in")).unwrap();
    fs::write(dir.path().join("in/snapshot.json"), SNAPSHOT).unwrap();
    let digest = sha256_hex(SNAPSHOT.as_bytes());
    let manifest = format!(
        r#"{{"snapshot_path":"in/snapshot.json","seed":99,"expect_snapshot_sha256":"{digest}"}}"#
    );
    let mpath = dir.path().join("manifest.json");
    fs::write(&mpath, manifest).unwrap();

    let m = load_manifest(&mpath).unwrap();
    assert_eq!(m.seed, Some(99));
    let loaded =
        load_snapshot_expecting(&m.snapshot_path, m.expect_snapshot_sha256.as_deref().unwrap())
            .unwrap();
    assert_eq!(loaded.snapshot.session.session_id.as_str(), "S-spring");
    assert_eq!(loaded.snapshot.groups[0].bonus_flags.len(), 1);
}

#[test]
fn missing_snapshot_is_a_path_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = lot_io::loader::load_snapshot(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, IoError::Path(_)));
}
