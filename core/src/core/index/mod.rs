//! Stash Index: inventory and deep-stash configuration of one managed root.

use crate::core::archive::{Staleness, age_in_days, staleness};
use crate::core::fs_util;
use crate::core::fs_util::error::FsError;
use crate::types::{DIRECTORY_CONTENT_TYPE, Location, TrackedItem, content_type_for};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum IndexError {
        #[error("Index file error: {0}")]
        Fs(#[from] FsError),

        #[error("Archive destination must be an existing directory outside the root: {}", .0.display())]
        InvalidDestination(PathBuf),

        #[error("Deep-stash threshold must be at least 1 day, got {0}")]
        InvalidThreshold(u32),
    }
}

use error::IndexError;

pub const DEFAULT_DEEPSTASH_DAYS: u32 = 30;

/// Persisted form of the index, `.stash/stash.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Archive destination; `None` disables deep-stash.
    #[serde(default)]
    pub external_drive: Option<PathBuf>,
    #[serde(default = "default_deepstash_days")]
    pub deepstash_days: u32,
    #[serde(default)]
    pub items: Vec<TrackedItem>,
}

impl Default for IndexData {
    fn default() -> Self {
        Self {
            name: String::new(),
            created_at: None,
            external_drive: None,
            deepstash_days: DEFAULT_DEEPSTASH_DAYS,
            items: Vec::new(),
        }
    }
}

fn default_deepstash_days() -> u32 {
    DEFAULT_DEEPSTASH_DAYS
}

/// One-time setup values.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub external_drive: Option<PathBuf>,
    pub deepstash_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized,
    AlreadyInitialized,
}

/// Read-only summary of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub name: String,
    pub external_drive: Option<PathBuf>,
    pub deepstash_days: u32,
    pub total: usize,
    pub local: usize,
    pub archived: usize,
    /// Local items within the early-warning margin or already past the threshold.
    pub soon: usize,
}

pub struct StashIndex {
    path: PathBuf,
    data: IndexData,
    persisted: bool,
}

impl StashIndex {
    /// Loads the index at `path`. A missing file yields an empty, uninitialized index.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                data: IndexData::default(),
                persisted: false,
            });
        }

        let data = fs_util::read_json(&path)?;
        Ok(Self {
            path,
            data,
            persisted: true,
        })
    }

    pub fn save(&mut self) -> Result<(), IndexError> {
        fs_util::write_json_atomic(&self.path, &self.data)?;
        self.persisted = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.persisted
    }

    pub fn data(&self) -> &IndexData {
        &self.data
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.data.items
    }

    pub fn external_drive(&self) -> Option<&Path> {
        self.data.external_drive.as_deref()
    }

    pub fn deepstash_days(&self) -> u32 {
        self.data.deepstash_days
    }

    /// Sets the archive destination and threshold and writes the index.
    ///
    /// Does nothing if an index already exists.
    pub fn initialize(
        &mut self,
        root: &Path,
        options: InitOptions,
        now: DateTime<Utc>,
    ) -> Result<InitOutcome, IndexError> {
        if self.persisted {
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let deepstash_days = options.deepstash_days.unwrap_or(DEFAULT_DEEPSTASH_DAYS);
        if deepstash_days == 0 {
            return Err(IndexError::InvalidThreshold(deepstash_days));
        }

        let external_drive = options
            .external_drive
            .map(|drive| Self::validate_destination(root, &drive))
            .transpose()?;

        self.data = IndexData {
            name: root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            created_at: Some(now),
            external_drive,
            deepstash_days,
            items: Vec::new(),
        };
        self.save()?;
        Ok(InitOutcome::Initialized)
    }

    fn validate_destination(root: &Path, drive: &Path) -> Result<PathBuf, IndexError> {
        let invalid = || IndexError::InvalidDestination(drive.to_path_buf());

        let drive = std::fs::canonicalize(drive).map_err(|_| invalid())?;
        if !drive.is_dir() || drive.starts_with(root) || root.starts_with(&drive) {
            return Err(invalid());
        }
        Ok(drive)
    }

    /// Counts by location plus the configured threshold and destination.
    pub fn status(&self, now: DateTime<Utc>) -> StatusReport {
        let items = &self.data.items;
        let local = items.iter().filter(|i| i.location == Location::Local);

        StatusReport {
            name: self.data.name.clone(),
            external_drive: self.data.external_drive.clone(),
            deepstash_days: self.data.deepstash_days,
            total: items.len(),
            local: local.clone().count(),
            archived: items
                .iter()
                .filter(|i| i.location == Location::Archived)
                .count(),
            soon: local
                .filter(|i| {
                    staleness(age_in_days(i.modified_at, now), self.data.deepstash_days)
                        != Staleness::Fresh
                })
                .count(),
        }
    }
}

/// Inventory updates.
impl StashIndex {
    pub fn get(&self, path: &Path) -> Option<&TrackedItem> {
        self.data.items.iter().find(|i| i.path == path)
    }

    /// Inserts or refreshes a locally present item. Returns `true` if it was new.
    pub fn observe(&mut self, item: TrackedItem) -> bool {
        match self.data.items.iter_mut().find(|i| i.path == item.path) {
            Some(existing) => {
                existing.size = item.size;
                existing.modified_at = item.modified_at;
                existing.content_type = item.content_type;
                existing.location = Location::Local;
                false
            }
            None => {
                self.data.items.push(TrackedItem {
                    location: Location::Local,
                    ..item
                });
                true
            }
        }
    }

    /// Returns `false` if the path isn't tracked.
    pub fn set_location(&mut self, path: &Path, location: Location) -> bool {
        match self.data.items.iter_mut().find(|i| i.path == path) {
            Some(item) => {
                item.location = location;
                true
            }
            None => false,
        }
    }

    pub fn replace_items(&mut self, items: Vec<TrackedItem>) {
        self.data.items = items;
    }
}

/// Builds an inventory entry from what is on disk at `path`.
pub fn observe_path(path: &Path) -> Result<TrackedItem, FsError> {
    let metadata = std::fs::metadata(path)?;
    let modified_at: DateTime<Utc> = metadata.modified()?.into();
    let created_at = metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or(modified_at);

    let (size, content_type) = if metadata.is_dir() {
        (fs_util::tree_size(path)?, DIRECTORY_CONTENT_TYPE.to_string())
    } else {
        (metadata.len(), content_type_for(path))
    };

    Ok(TrackedItem {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size,
        created_at,
        modified_at,
        content_type,
        location: Location::Local,
    })
}
