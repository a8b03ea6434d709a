//! Directory-backed store for one session.
//!
//! Layout (siblings of the snapshot file):
//! - `<snapshot>`: the session rows; rewritten on commit
//! - `result.json`: the committed AllocationResult
//! - `outbox.json`: events not yet acknowledged
//! - `.lottery.lock`: held for the duration of a commit or ack
//!
//! Every file is replaced by atomic rename. `result.json` and `outbox.json` are
//! written first; the snapshot rename (state `committed`) is the commit point, so
//! a crash before it leaves a `closed` session and both side files are ignored.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;

use lot_core::{EntryId, SessionId, SessionSnapshot, SessionState};
use lot_io::canonical_json::{read_json_file, write_canonical_file};
use lot_io::loader::load_snapshot;
use lot_io::IoError;
use serde::{Deserialize, Serialize};

use super::{committed_snapshot, CommitBatch, LotteryStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::events::AllocationEvent;
use crate::result::AllocationResult;

#[derive(Debug, Clone)]
pub struct FileStore {
    snapshot_path: PathBuf,
    result_path: PathBuf,
    outbox_path: PathBuf,
    lock_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Outbox {
    session_id: SessionId,
    result_id: String,
    events: Vec<AllocationEvent>,
}

/// Exclusive lock file, removed on drop.
///
/// The file names its holder (`pid=<pid> acquired_at=<ts>`). A crashed holder
/// leaves it behind; the `Unavailable` message then names the file to delete.
struct LockGuard(PathBuf);

impl LockGuard {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Unavailable(held_message(path)))
            }
            Err(e) => return Err(StoreError::Unavailable(format!("{}: {e}", path.display()))),
        };
        let guard = Self(path.to_path_buf());
        writeln!(
            file,
            "pid={} acquired_at={}",
            process::id(),
            SystemClock.now_utc()
        )
        .and_then(|()| file.sync_all())
        .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        Ok(guard)
    }
}

fn held_message(path: &Path) -> String {
    let holder = fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown holder".into());
    format!(
        "{} is held ({holder}); delete it if that committer is no longer running",
        path.display()
    )
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn from_io(e: IoError) -> StoreError {
    match e {
        IoError::Path(m) => StoreError::Unavailable(m),
        other => StoreError::Corrupt(other.to_string()),
    }
}

impl FileStore {
    /// Store rooted at `dir`, with the rows in `dir/snapshot.json`.
    pub fn open(dir: &Path) -> Self {
        Self::for_snapshot(&dir.join("snapshot.json"))
    }

    /// Store whose rows live in `snapshot_path`; side files go next to it.
    pub fn for_snapshot(snapshot_path: &Path) -> Self {
        let dir = snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            snapshot_path: snapshot_path.to_path_buf(),
            result_path: dir.join("result.json"),
            outbox_path: dir.join("outbox.json"),
            lock_path: dir.join(".lottery.lock"),
        }
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    fn read_snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError> {
        if !self.snapshot_path.exists() {
            return Err(StoreError::NotFound(session.clone()));
        }
        let snapshot = load_snapshot(&self.snapshot_path).map_err(from_io)?.snapshot;
        if &snapshot.session.session_id != session {
            return Err(StoreError::NotFound(session.clone()));
        }
        Ok(snapshot)
    }

    fn read_outbox(&self, session: &SessionId) -> Result<Option<Outbox>, StoreError> {
        if self.read_snapshot(session)?.session.state != SessionState::Committed
            || !self.outbox_path.exists()
        {
            return Ok(None);
        }
        let outbox: Outbox = read_json_file(&self.outbox_path).map_err(from_io)?;
        if &outbox.session_id != session {
            return Err(StoreError::Corrupt(format!(
                "{} belongs to session {}",
                self.outbox_path.display(),
                outbox.session_id
            )));
        }
        Ok(Some(outbox))
    }
}

impl LotteryStore for FileStore {
    fn load_snapshot(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError> {
        self.read_snapshot(session)
    }

    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        let current = self.read_snapshot(batch.session_id())?;
        let next = committed_snapshot(&current, &batch.result)?;

        let outbox = Outbox {
            session_id: batch.session_id().clone(),
            result_id: batch.result.id.clone(),
            events: batch.events.clone(),
        };
        write_canonical_file(&self.result_path, &batch.result).map_err(from_io)?;
        write_canonical_file(&self.outbox_path, &outbox).map_err(from_io)?;
        write_canonical_file(&self.snapshot_path, &next).map_err(from_io)?;
        Ok(())
    }

    fn pending_events(&self, session: &SessionId) -> Result<Vec<AllocationEvent>, StoreError> {
        Ok(self.read_outbox(session)?.map(|o| o.events).unwrap_or_default())
    }

    fn ack_events(&self, session: &SessionId, keys: &[EntryId]) -> Result<(), StoreError> {
        let _lock = LockGuard::acquire(&self.lock_path)?;
        if let Some(mut outbox) = self.read_outbox(session)? {
            let acked: BTreeSet<&EntryId> = keys.iter().collect();
            outbox.events.retain(|e| !acked.contains(&e.entry_id));
            write_canonical_file(&self.outbox_path, &outbox).map_err(from_io)?;
        }
        Ok(())
    }

    fn load_result(&self, session: &SessionId) -> Result<Option<AllocationResult>, StoreError> {
        if self.read_snapshot(session)?.session.state != SessionState::Committed {
            return Ok(None);
        }
        let result: AllocationResult = read_json_file(&self.result_path).map_err(from_io)?;
        Ok(Some(result))
    }
}
