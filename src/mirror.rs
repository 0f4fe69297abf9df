//! Local mirror store - best-effort last-known-value cache.
//!
//! Gives the UI a synchronous value to paint before the first network round
//! trip resolves, and holds a recovery snapshot for offline use. The mirror
//! is never the source of truth: every full refresh overwrites it from the
//! authoritative server response, and optimistic deltas written here are
//! discarded by the next overwrite.
//!
//! Persistence is a single JSON file shared by every process of the same
//! user profile. Concurrent writers are not locked against; last write wins.
//! That is acceptable only because nothing ever reads the mirror as
//! authoritative - the tests state this assumption explicitly.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// Timestamped copy of a full dataset export.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub total_records: i64,
    /// Raw per-table payloads as exported by the backend
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct MirrorData {
    balance: Option<i64>,
    snapshot: Option<Snapshot>,
}

/// File-backed key/value cache for the last-known balance and backup
/// snapshots.
pub struct MirrorStore {
    path: Option<PathBuf>,
    data: RwLock<MirrorData>,
}

impl MirrorStore {
    /// Opens (or creates) a mirror file at `path`. An unreadable or corrupt
    /// file is treated as absent - the mirror is best-effort by contract, so
    /// starting empty is always safe.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<MirrorData>(&contents) {
                Ok(data) => {
                    info!("Loaded mirror store from {}", path.display());
                    data
                }
                Err(e) => {
                    warn!("Mirror file {} is corrupt, starting empty: {e}", path.display());
                    MirrorData::default()
                }
            },
            Err(_) => MirrorData::default(),
        };
        Self {
            path: Some(path),
            data: RwLock::new(data),
        }
    }

    /// Creates a mirror with no persistence, for tests and ephemeral
    /// sessions.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(MirrorData::default()),
        }
    }

    /// Last-known balance, or `None` when no data has ever been mirrored.
    /// `None` is a distinct "loading" state - callers must not substitute a
    /// fake default.
    #[must_use]
    pub fn read_balance(&self) -> Option<i64> {
        self.data.read().map(|d| d.balance).unwrap_or_default()
    }

    /// Applies a signed optimistic delta to the stored balance. Purely an
    /// accumulator; the next [`set_balance`](Self::set_balance) overwrites
    /// whatever this produced.
    pub fn apply_delta(&self, delta: i64) -> Result<()> {
        let data = {
            let mut guard = self.data.write().map_err(|_| Error::Config {
                message: "Mirror store lock poisoned".to_string(),
            })?;
            guard.balance = Some(guard.balance.unwrap_or(0) + delta);
            guard.clone()
        };
        self.persist(&data)
    }

    /// Authoritative overwrite from a server-confirmed balance. Called on
    /// every full refresh. Rejects negative values rather than persisting
    /// them.
    pub fn set_balance(&self, value: i64) -> Result<()> {
        if value < 0 {
            return Err(Error::InvalidBalance { value });
        }
        let data = {
            let mut guard = self.data.write().map_err(|_| Error::Config {
                message: "Mirror store lock poisoned".to_string(),
            })?;
            guard.balance = Some(value);
            guard.clone()
        };
        self.persist(&data)
    }

    /// Stores a timestamped backup snapshot, replacing any previous one.
    pub fn backup_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let data = {
            let mut guard = self.data.write().map_err(|_| Error::Config {
                message: "Mirror store lock poisoned".to_string(),
            })?;
            guard.snapshot = Some(snapshot);
            guard.clone()
        };
        self.persist(&data)
    }

    /// Returns the most recent backup snapshot, if any.
    #[must_use]
    pub fn restore_snapshot(&self) -> Option<Snapshot> {
        self.data
            .read()
            .map(|d| d.snapshot.clone())
            .unwrap_or_default()
    }

    fn persist(&self, data: &MirrorData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents).map_err(Error::from)
    }
}
