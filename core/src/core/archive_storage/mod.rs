//! Secondary storage that receives deep-stashed items.

use crate::core::fs_util;
use crate::core::fs_util::error::FsError;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ArchiveStorageError {
        #[error("Filesystem error: {0}")]
        Fs(#[from] FsError),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Path has no file name: {}", .0.display())]
        NoFileName(PathBuf),

        #[error("Archive copy does not match source: {}", .0.display())]
        VerificationFailed(PathBuf),
    }
}

use error::ArchiveStorageError;

/// Subdirectory of the external drive that holds archived items.
pub const ARCHIVE_DIR: &str = "deepstash";

pub struct ArchiveStorage {
    pub drive_path: PathBuf,
}

/// An item copied into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub archive_path: PathBuf,
    pub size: u64,
}

impl ArchiveStorage {
    pub fn new(drive_path: impl Into<PathBuf>) -> Self {
        Self {
            drive_path: drive_path.into(),
        }
    }

    /// The drive is reachable when it exists as a directory (mounted).
    pub fn is_reachable(&self) -> bool {
        self.drive_path.is_dir()
    }

    pub fn deepstash_path(&self) -> PathBuf {
        self.drive_path.join(ARCHIVE_DIR)
    }

    /// Archive location for `original`: `<drive>/deepstash/<basename>`.
    pub fn item_path(&self, original: &Path) -> Result<PathBuf, ArchiveStorageError> {
        let name = original
            .file_name()
            .ok_or_else(|| ArchiveStorageError::NoFileName(original.to_path_buf()))?;
        Ok(self.deepstash_path().join(name))
    }
}

/// Store operations.
impl ArchiveStorage {
    /// Copies a file into the archive and verifies the copy byte-for-byte.
    /// The source is left untouched.
    pub fn store_file(&self, source: &Path) -> Result<StoredItem, ArchiveStorageError> {
        let archive_path = self.item_path(source)?;
        std::fs::create_dir_all(self.deepstash_path())?;

        if archive_path.is_dir() {
            warn!(
                archive = %archive_path.display(),
                source = %source.display(),
                "replacing archived folder with a file of the same name"
            );
            std::fs::remove_dir_all(&archive_path)?;
        }
        let size = std::fs::copy(source, &archive_path)?;

        Self::verify_file(source, &archive_path)?;
        Ok(StoredItem { archive_path, size })
    }

    /// Copies a folder tree into the archive, merging into an existing folder
    /// of the same name, and checks every file arrived.
    pub fn store_folder(&self, source: &Path) -> Result<StoredItem, ArchiveStorageError> {
        let archive_path = self.item_path(source)?;
        std::fs::create_dir_all(self.deepstash_path())?;

        let size = fs_util::copy_tree(source, &archive_path)?;

        Self::verify_tree(source, &archive_path)?;
        Ok(StoredItem { archive_path, size })
    }

    fn verify_file(source: &Path, copy: &Path) -> Result<(), ArchiveStorageError> {
        let copy_metadata = std::fs::metadata(copy)
            .map_err(|_| ArchiveStorageError::VerificationFailed(copy.to_path_buf()))?;

        if copy_metadata.len() != std::fs::metadata(source)?.len()
            || fs_util::file_digest(copy)? != fs_util::file_digest(source)?
        {
            return Err(ArchiveStorageError::VerificationFailed(copy.to_path_buf()));
        }
        Ok(())
    }

    fn verify_tree(source: &Path, copy: &Path) -> Result<(), ArchiveStorageError> {
        if !copy.is_dir() {
            return Err(ArchiveStorageError::VerificationFailed(copy.to_path_buf()));
        }

        for entry in WalkDir::new(source) {
            let entry = entry.map_err(FsError::from)?;
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let target = copy.join(relative);

            let matches = if entry.file_type().is_dir() {
                target.is_dir()
            } else {
                std::fs::metadata(&target)
                    .is_ok_and(|m| m.len() == entry.metadata().map(|s| s.len()).unwrap_or(0))
            };

            if !matches {
                return Err(ArchiveStorageError::VerificationFailed(target));
            }
        }
        Ok(())
    }
}
