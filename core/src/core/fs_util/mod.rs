//! Filesystem helpers shared by sorting, deep-stash and restore.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum FsError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Directory walk error: {0}")]
        Walk(#[from] walkdir::Error),

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),
    }
}

use error::FsError;

const TEMP_SUFFIX: &str = "tmp";

pub fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Appends `.suffix` to the full file name (`a.txt` -> `a.txt.suffix`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Directory entries sorted by file name.
pub fn sorted_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>, FsError> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

// JSON documents

/// Writes to a sibling temp file and renames it over `path`, so readers never
/// observe a half-written document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), FsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = append_suffix(path, TEMP_SUFFIX);
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(&temp_path, json)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FsError> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

// Trees

/// Recursively copies `source` into `dest`, merging into an existing directory.
/// Files already present at the destination are overwritten.
///
/// Returns the number of bytes copied.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<u64, FsError> {
    if dest.is_file() {
        std::fs::remove_file(dest)?;
    }

    let mut bytes = 0;
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            if target.is_file() {
                std::fs::remove_file(&target)?;
            }
            std::fs::create_dir_all(&target)?;
        } else {
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            }
            bytes += std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(bytes)
}

/// Removes a file, a symlink or a whole directory tree.
pub fn remove_item(path: &Path) -> Result<(), FsError> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Moves `source` to `dest`, creating the destination's parent.
///
/// An existing file at `dest` is overwritten. A folder moved onto an existing
/// folder is merged into it.
pub fn move_item(source: &Path, dest: &Path) -> Result<(), FsError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if source.is_dir() && dest.is_dir() {
        copy_tree(source, dest)?;
        std::fs::remove_dir_all(source)?;
        return Ok(());
    }

    std::fs::rename(source, dest)?;
    Ok(())
}

/// Entry count and file bytes of a path and everything below it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    pub entries: u64,
    pub bytes: u64,
}

pub fn tree_summary(path: &Path) -> Result<TreeSummary, FsError> {
    let mut summary = TreeSummary::default();
    for entry in WalkDir::new(path) {
        let entry = entry?;
        summary.entries += 1;
        if entry.file_type().is_file() {
            summary.bytes += entry.metadata()?.len();
        }
    }
    Ok(summary)
}

/// Total size in bytes of a file, or of every file below a directory.
pub fn tree_size(path: &Path) -> Result<u64, FsError> {
    Ok(tree_summary(path)?.bytes)
}

pub fn file_digest(path: &Path) -> Result<blake3::Hash, FsError> {
    let mut hasher = blake3::Hasher::new();
    let mut file = std::fs::File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}
