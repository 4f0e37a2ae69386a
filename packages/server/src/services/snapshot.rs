//! Durable session snapshots.
//!
//! A snapshot is the full session plus its last activity time, written as one
//! JSON record per session. Writes go to a temporary file and are renamed
//! into place, so a reader never sees a half-written record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::game::GameSession;

const RECORD_EXT: &str = "json";
const TMP_EXT: &str = "json.tmp";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("invalid snapshot key {0:?}")]
    InvalidKey(String),
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session: GameSession,
    pub last_activity_ts: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(session: GameSession, last_activity_ts: DateTime<Utc>) -> Self {
        Self {
            session,
            last_activity_ts,
        }
    }

    pub fn encode(session: &GameSession, last_activity_ts: DateTime<Utc>) -> Result<Vec<u8>, SnapshotError> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            session: &'a GameSession,
            last_activity_ts: DateTime<Utc>,
        }
        Ok(serde_json::to_vec(&Borrowed {
            session,
            last_activity_ts,
        })?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// One raw record as found in the backing store. `bytes` holds the read
/// error when the record exists but could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub session_id: String,
    pub bytes: Result<Vec<u8>, String>,
}

impl StoredSnapshot {
    pub fn readable(session_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            bytes: Ok(bytes),
        }
    }

    pub fn unreadable(session_id: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            session_id: session_id.into(),
            bytes: Err(error.to_string()),
        }
    }
}

/// Backing store for session snapshots, keyed by session id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replaces the record for `session_id` atomically.
    async fn write(&self, session_id: &str, bytes: Vec<u8>) -> Result<(), SnapshotError>;

    /// Deletes the record. Removing a missing record succeeds.
    async fn remove(&self, session_id: &str) -> Result<(), SnapshotError>;

    /// Lists every record. Only a failure to list the store is an error; a
    /// record that cannot be read comes back as [`StoredSnapshot::unreadable`].
    async fn load_all(&self) -> Result<Vec<StoredSnapshot>, SnapshotError>;
}

/// Session ids become file names, so only uuid-like keys are accepted.
fn validate_key(session_id: &str) -> Result<(), SnapshotError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= 64
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(SnapshotError::InvalidKey(session_id.to_string()))
    }
}

/// One `<session_id>.json` file per session under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{RECORD_EXT}"))
    }

    fn tmp_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{TMP_EXT}"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn write(&self, session_id: &str, bytes: Vec<u8>) -> Result<(), SnapshotError> {
        validate_key(session_id)?;
        let tmp_path = self.tmp_path(session_id);
        let path = self.record_path(session_id);

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), SnapshotError> {
        validate_key(session_id)?;
        match tokio::fs::remove_file(self.record_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<StoredSnapshot>, SnapshotError> {
        let mut records = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // leftover temp files from an interrupted write are ignored
            let Some(session_id) = name.strip_suffix(&format!(".{RECORD_EXT}")) else {
                continue;
            };
            if validate_key(session_id).is_err() {
                tracing::warn!(file = %path.display(), "Skipping unexpected file in snapshot directory");
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => records.push(StoredSnapshot::readable(session_id, bytes)),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "Failed to read snapshot");
                    records.push(StoredSnapshot::unreadable(session_id, err));
                }
            }
        }
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(records)
    }
}

/// In-process store used by tests and by deployments without a disk.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    unreadable: Mutex<BTreeSet<String>>,
    failing: Mutex<BTreeSet<&'static str>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail until turned off again.
    pub fn fail_writes(&self, fail: bool) {
        self.set_failing("write", fail);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.set_failing("remove", fail);
    }

    fn set_failing(&self, op: &'static str, fail: bool) {
        let mut failing = self.failing.lock();
        if fail {
            failing.insert(op);
        } else {
            failing.remove(op);
        }
    }

    fn check(&self, op: &'static str) -> Result<(), SnapshotError> {
        if self.failing.lock().contains(op) {
            return Err(SnapshotError::Unavailable(format!("{op} disabled")));
        }
        Ok(())
    }

    /// Stores raw bytes as-is, bypassing encoding.
    pub fn insert_raw(&self, session_id: &str, bytes: Vec<u8>) {
        self.records.lock().insert(session_id.to_string(), bytes);
    }

    /// Makes an existing record fail to read on `load_all`.
    pub fn make_unreadable(&self, session_id: &str) {
        self.unreadable.lock().insert(session_id.to_string());
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.records.lock().contains_key(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Vec<u8>> {
        self.records.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn write(&self, session_id: &str, bytes: Vec<u8>) -> Result<(), SnapshotError> {
        validate_key(session_id)?;
        self.check("write")?;
        self.records.lock().insert(session_id.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), SnapshotError> {
        self.check("remove")?;
        self.records.lock().remove(session_id);
        self.unreadable.lock().remove(session_id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StoredSnapshot>, SnapshotError> {
        let unreadable = self.unreadable.lock();
        Ok(self
            .records
            .lock()
            .iter()
            .map(|(session_id, bytes)| {
                if unreadable.contains(session_id) {
                    StoredSnapshot::unreadable(session_id.as_str(), "read disabled")
                } else {
                    StoredSnapshot::readable(session_id.as_str(), bytes.clone())
                }
            })
            .collect())
    }
}
