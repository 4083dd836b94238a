//! Archive Engine: staleness policy and the deep-stash sequence.

use crate::core::archive_storage::ArchiveStorage;
use crate::core::archive_storage::error::ArchiveStorageError;
use crate::core::fs_util;
use crate::core::fs_util::TreeSummary;
use crate::core::fs_util::error::FsError;
use crate::types::{GhostRecord, ItemKind};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ArchiveError {
        #[error("Archive destination is unreachable: {}", .0.display())]
        DestinationUnreachable(PathBuf),

        #[error("Item not found: {}", .0.display())]
        NotFound(PathBuf),

        #[error("Not an archivable item: {}", .0.display())]
        InvalidItem(PathBuf),

        #[error("Source only partly removed, ghost record kept: {}", .0.display())]
        IncompleteRemoval(PathBuf),

        #[error("Archive storage error: {0}")]
        Storage(#[from] ArchiveStorageError),

        #[error("Filesystem error: {0}")]
        Fs(#[from] FsError),
    }
}

use error::ArchiveError;

/// Items this many days short of the threshold are reported as "soon".
pub const EARLY_WARNING_DAYS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    /// Within the early-warning margin; nothing happens yet.
    Soon,
    Stale,
}

/// Whole days since `modified_at`. Negative for timestamps in the future.
pub fn age_in_days(modified_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - modified_at).num_days()
}

pub fn staleness(age_days: i64, threshold_days: u32) -> Staleness {
    let threshold = i64::from(threshold_days);
    if age_days >= threshold {
        Staleness::Stale
    } else if age_days >= threshold - EARLY_WARNING_DAYS {
        Staleness::Soon
    } else {
        Staleness::Fresh
    }
}

/// An item eligible for deep-stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: ItemKind,
    pub modified_at: DateTime<Utc>,
}

/// Result of a sweep.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub archived: Vec<GhostRecord>,
    pub soon: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct ArchiveEngine {
    storage: ArchiveStorage,
    threshold_days: u32,
}

impl ArchiveEngine {
    pub fn new(destination: impl Into<PathBuf>, threshold_days: u32) -> Self {
        Self {
            storage: ArchiveStorage::new(destination),
            threshold_days,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.storage.drive_path
    }

    pub fn threshold_days(&self) -> u32 {
        self.threshold_days
    }

    /// Returns `Err(DestinationUnreachable)` if the drive is missing or unmounted.
    pub fn ensure_reachable(&self) -> Result<(), ArchiveError> {
        if self.storage.is_reachable() {
            Ok(())
        } else {
            Err(ArchiveError::DestinationUnreachable(
                self.storage.drive_path.clone(),
            ))
        }
    }
}

/// Sweep.
impl ArchiveEngine {
    /// Archives every stale candidate and counts the ones about to become stale.
    ///
    /// Nothing is touched if the destination is unreachable. Per-item failures
    /// are collected; the sweep stops only if the destination disappears.
    pub fn sweep(
        &self,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, ArchiveError> {
        self.ensure_reachable()?;

        let mut outcome = SweepOutcome::default();

        for candidate in candidates {
            let age = age_in_days(candidate.modified_at, now);

            match staleness(age, self.threshold_days) {
                Staleness::Fresh => {}
                Staleness::Soon => {
                    debug!(path = %candidate.path.display(), age, "due for deep-stash soon");
                    outcome.soon.push(candidate.path.clone());
                }
                Staleness::Stale => match self.archive(&candidate.path, candidate.kind, now) {
                    Ok(record) => outcome.archived.push(record),
                    Err(e) => {
                        self.ensure_reachable()?;
                        warn!(path = %candidate.path.display(), error = %e, "deep-stash failed");
                        outcome.failed.push((candidate.path.clone(), e.to_string()));
                    }
                },
            }
        }

        Ok(outcome)
    }
}

/// Single-item archival.
impl ArchiveEngine {
    /// Moves one item to the archive and leaves a ghost record at `<path>.ds`.
    ///
    /// Order: copy, verify, write ghost, delete source. An interruption leaves
    /// at worst a duplicate, never an item without a back-reference. If the
    /// source cannot be deleted and is still intact, the ghost is withdrawn and
    /// the item stays local; if it is already partly gone, the ghost stays.
    pub fn archive(
        &self,
        path: &Path,
        kind: ItemKind,
        now: DateTime<Utc>,
    ) -> Result<GhostRecord, ArchiveError> {
        self.ensure_reachable()?;
        if std::fs::symlink_metadata(path).is_err() {
            return Err(ArchiveError::NotFound(path.to_path_buf()));
        }

        // `dir/.` names `dir` but its ghost would land inside it.
        let ghost_path = GhostRecord::path_for(path);
        if ghost_path.starts_with(path) {
            return Err(ArchiveError::InvalidItem(path.to_path_buf()));
        }

        let stored = match kind {
            ItemKind::File => self.storage.store_file(path)?,
            ItemKind::Folder => self.storage.store_folder(path)?,
        };

        let record = GhostRecord {
            kind,
            deep_stash_path: stored.archive_path,
            original_path: path.to_path_buf(),
            modified_at: now,
            size: Some(stored.size),
        };
        let before = fs_util::tree_summary(path)?;
        fs_util::write_json_atomic(&ghost_path, &record)?;

        if let Err(e) = fs_util::remove_item(path) {
            return Err(Self::settle_failed_removal(path, &ghost_path, before, e));
        }

        info!(
            path = %path.display(),
            archive = %record.deep_stash_path.display(),
            "deep-stashed"
        );
        Ok(record)
    }

    /// Decides the ghost's fate after the source could not be deleted.
    fn settle_failed_removal(
        path: &Path,
        ghost_path: &Path,
        before: TreeSummary,
        error: FsError,
    ) -> ArchiveError {
        let intact = fs_util::tree_summary(path).is_ok_and(|after| after == before);
        if !intact {
            warn!(
                path = %path.display(),
                error = %error,
                "source partly removed; ghost record kept"
            );
            return ArchiveError::IncompleteRemoval(path.to_path_buf());
        }

        if let Err(e) = std::fs::remove_file(ghost_path) {
            warn!(ghost = %ghost_path.display(), error = %e, "cannot withdraw ghost record");
        }
        error.into()
    }
}
