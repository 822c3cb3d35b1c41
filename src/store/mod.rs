//! Snapshot Store
//!
//! Persists the full resource list as one pretty-printed JSON array and
//! supports two update strategies:
//!
//! - [`SnapshotStore::save`] replaces the whole snapshot
//! - [`SnapshotStore::merge_scope`] replaces only the records owned by one
//!   project and keeps everything else untouched, in its original order
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, so readers see either the previous or the new snapshot. Writers
//! take a [`WriteLock`]; concurrent writers are rejected, not serialized.

mod group;
mod lock;

pub use group::{children_by_service, group_by_parent};
pub use lock::WriteLock;

use crate::model::Resource;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Snapshot file name inside the cache directory
pub const CACHE_FILE: &str = "cache.json";

#[derive(Debug, Error)]
pub enum StoreError {
    /// No snapshot has been saved yet
    #[error("no snapshot at {}; run `infrakit sync` first", path.display())]
    NotFound { path: PathBuf },

    /// The snapshot exists but does not parse as a list of resources
    #[error("snapshot {} is corrupt, re-run `infrakit sync`: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another writer holds the lock
    #[error(
        "snapshot is locked by another writer; remove {} if no sync is running",
        path.display()
    )]
    Locked { path: PathBuf },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a scoped merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    /// Records outside the scope, kept as they were
    pub retained: usize,
    /// Records of the scope that were dropped
    pub removed: usize,
    /// Fresh records written for the scope
    pub added: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path of the snapshot file
    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", CACHE_FILE))
    }

    /// Replace the entire snapshot with `records`
    pub fn save(&self, records: &[Resource]) -> Result<(), StoreError> {
        let _lock = WriteLock::acquire(&self.lock_path())?;
        self.write_snapshot(records)
    }

    /// Read the snapshot back
    pub fn load(&self) -> Result<Vec<Resource>, StoreError> {
        let path = self.path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path });
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Like [`load`](Self::load), but a missing snapshot is an empty one
    pub fn load_or_empty(&self) -> Result<Vec<Resource>, StoreError> {
        match self.load() {
            Err(StoreError::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Replace every record belonging to `scope_id` with `new_records`.
    ///
    /// Records outside the scope keep their relative order and come first,
    /// followed by `new_records`. An empty `new_records` wipes the scope.
    pub fn merge_scope(
        &self,
        new_records: Vec<Resource>,
        scope_id: &str,
    ) -> Result<MergeReport, StoreError> {
        let _lock = WriteLock::acquire(&self.lock_path())?;

        let existing = self.load_or_empty()?;
        let (merged, report) = merge_records(existing, new_records, scope_id);

        if report.added == 0 && report.removed > 0 {
            tracing::warn!(
                "Merge for scope {} removed {} records and added none",
                scope_id,
                report.removed
            );
        }

        self.write_snapshot(&merged)?;
        tracing::info!(
            "Merged scope {}: kept {}, removed {}, added {}",
            scope_id,
            report.retained,
            report.removed,
            report.added
        );
        Ok(report)
    }

    fn write_snapshot(&self, records: &[Resource]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let data = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;
        let tmp_path = self
            .dir
            .join(format!("{}.{}.tmp", CACHE_FILE, Uuid::new_v4()));

        let written = write_synced(&tmp_path, &data).and_then(|_| fs::rename(&tmp_path, self.path()));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::debug!("Wrote {} records to {:?}", records.len(), self.path());
        Ok(())
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Pure half of [`SnapshotStore::merge_scope`]
pub fn merge_records(
    existing: Vec<Resource>,
    new_records: Vec<Resource>,
    scope_id: &str,
) -> (Vec<Resource>, MergeReport) {
    let before = existing.len();
    let mut merged: Vec<Resource> = existing
        .into_iter()
        .filter(|r| !r.belongs_to_scope(scope_id))
        .collect();

    let report = MergeReport {
        retained: merged.len(),
        removed: before - merged.len(),
        added: new_records.len(),
    };

    merged.extend(new_records);
    (merged, report)
}
