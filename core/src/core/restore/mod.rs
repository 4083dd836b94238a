//! Restore Engine: finds ghost records and copies archived items back.

use crate::core::fs_util;
use crate::core::fs_util::error::FsError;
use crate::types::{GhostRecord, ItemKind, STASH_DIR};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RestoreError {
        #[error("Filesystem error: {0}")]
        Fs(#[from] FsError),

        #[error("No archived item at {}", .0.display())]
        NotFound(PathBuf),

        #[error("Archive copy of {} is missing: {}", .original.display(), .archive.display())]
        ArchiveMissing { original: PathBuf, archive: PathBuf },
    }
}

use error::RestoreError;

/// Which ghost records to restore. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreFilter {
    /// Exact original path of one archived item.
    pub path: Option<PathBuf>,
    /// Only items originally below this folder.
    pub folder: Option<PathBuf>,
    /// Only items archived within the last N days.
    pub within_days: Option<u32>,
}

impl RestoreFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: Some(folder.into()),
            ..Self::default()
        }
    }

    pub fn within_days(days: u32) -> Self {
        Self {
            within_days: Some(days),
            ..Self::default()
        }
    }

    /// A filter naming one exact item must find it.
    pub fn is_targeted(&self) -> bool {
        self.path.is_some()
    }

    pub fn matches(&self, record: &GhostRecord, now: DateTime<Utc>) -> bool {
        if let Some(path) = &self.path
            && record.original_path != *path
        {
            return false;
        }

        // Component-wise: `/root/A` does not contain `/root/AB/x`.
        if let Some(folder) = &self.folder
            && !record.original_path.starts_with(folder)
        {
            return false;
        }

        if let Some(days) = self.within_days
            && record.modified_at < now - Duration::days(i64::from(days))
        {
            return false;
        }

        true
    }
}

/// A ghost record and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundGhost {
    pub ghost_path: PathBuf,
    pub record: GhostRecord,
}

/// Result of a restore run.
#[derive(Debug, Default)]
pub struct RestoreOutcome {
    /// Original paths that were restored.
    pub restored: Vec<PathBuf>,
    /// Original paths whose archive copy no longer exists.
    pub missing: Vec<PathBuf>,
    /// Ghost records that could not be read or restored.
    pub failed: Vec<(PathBuf, String)>,
}

pub struct RestoreEngine<'a> {
    root: &'a Path,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// Walks the root for `*.ds` records, in file-name order per directory.
    ///
    /// Unreadable records are returned separately instead of failing the scan.
    pub fn scan(&self) -> Result<(Vec<FoundGhost>, Vec<(PathBuf, String)>), RestoreError> {
        let mut found = Vec::new();
        let mut unreadable = Vec::new();

        let walker = WalkDir::new(self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != STASH_DIR);

        for entry in walker {
            let entry = entry.map_err(FsError::from)?;
            if !entry.file_type().is_file() || !GhostRecord::is_ghost_path(entry.path()) {
                continue;
            }

            let ghost_path = entry.into_path();
            match fs_util::read_json::<GhostRecord>(&ghost_path) {
                Ok(record) => found.push(FoundGhost { ghost_path, record }),
                Err(e) => {
                    warn!(ghost = %ghost_path.display(), error = %e, "unreadable ghost record");
                    unreadable.push((ghost_path, e.to_string()));
                }
            }
        }

        Ok((found, unreadable))
    }

    /// Restores every ghost matching `filter`.
    ///
    /// Missing archive copies are reported and skipped. A targeted filter
    /// returns `Err(NotFound)` when no record matches and
    /// `Err(ArchiveMissing)` when its archive copy is gone.
    pub fn restore(
        &self,
        filter: &RestoreFilter,
        now: DateTime<Utc>,
    ) -> Result<RestoreOutcome, RestoreError> {
        let (found, unreadable) = self.scan()?;
        let mut outcome = RestoreOutcome {
            failed: unreadable,
            ..RestoreOutcome::default()
        };
        let mut matched = false;

        for FoundGhost { ghost_path, record } in found {
            if !filter.matches(&record, now) {
                continue;
            }
            matched = true;

            if !record.deep_stash_path.exists() {
                warn!(
                    original = %record.original_path.display(),
                    archive = %record.deep_stash_path.display(),
                    "archive copy missing"
                );
                if filter.is_targeted() {
                    return Err(RestoreError::ArchiveMissing {
                        original: record.original_path,
                        archive: record.deep_stash_path,
                    });
                }
                outcome.missing.push(record.original_path);
                continue;
            }

            match Self::restore_one(&ghost_path, &record) {
                Ok(()) => outcome.restored.push(record.original_path),
                Err(e) => {
                    warn!(ghost = %ghost_path.display(), error = %e, "restore failed");
                    outcome.failed.push((ghost_path, e.to_string()));
                }
            }
        }

        if let Some(path) = &filter.path
            && !matched
        {
            return Err(RestoreError::NotFound(path.clone()));
        }

        Ok(outcome)
    }

    /// Copies the archive back over the original path, then deletes the ghost.
    /// The ghost survives any failure during the copy.
    fn restore_one(ghost_path: &Path, record: &GhostRecord) -> Result<(), RestoreError> {
        let original = &record.original_path;
        if let Some(parent) = original.parent() {
            std::fs::create_dir_all(parent).map_err(FsError::from)?;
        }

        let is_folder = match record.kind {
            ItemKind::Folder => true,
            ItemKind::File => record.deep_stash_path.is_dir(),
        };
        if is_folder {
            fs_util::copy_tree(&record.deep_stash_path, original)?;
        } else {
            if original.is_dir() {
                std::fs::remove_dir_all(original).map_err(FsError::from)?;
            }
            std::fs::copy(&record.deep_stash_path, original).map_err(FsError::from)?;
        }

        std::fs::remove_file(ghost_path).map_err(FsError::from)?;

        info!(original = %original.display(), "restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
