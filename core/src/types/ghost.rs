//! Ghost records: the pointer left behind at an archived item's original path.

use crate::types::ItemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix appended to the original file name of an archived item.
pub const GHOST_EXTENSION: &str = "ds";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GhostRecord {
    /// Records written before folders could be archived carry no type.
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    pub deep_stash_path: PathBuf,
    pub original_path: PathBuf,
    /// When the item was archived.
    pub modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl GhostRecord {
    /// `report.pdf` becomes `report.pdf.ds`, keeping the original extension.
    pub fn path_for(original: &Path) -> PathBuf {
        let mut name = original.as_os_str().to_owned();
        name.push(".");
        name.push(GHOST_EXTENSION);
        PathBuf::from(name)
    }

    pub fn is_ghost_path(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == GHOST_EXTENSION)
    }
}
