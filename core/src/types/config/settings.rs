use crate::types::FolderName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Behavior settings of a managed directory, persisted as `.stash/config.toml`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashSettings {
    #[serde(default)]
    pub sorting: SortingSettings,
    #[serde(default)]
    pub archive: ArchiveSettings,
}

impl StashSettings {
    /// Loads settings from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the list of validation errors, empty if the settings are valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if FolderName::try_from(self.sorting.folders_container.as_str()).is_err() {
            errors.push(format!(
                "folders_container {:?} is not a valid folder name",
                self.sorting.folders_container
            ));
        }

        if FolderName::try_from(self.sorting.keep_folder.as_str()).is_err() {
            errors.push(format!(
                "keep_folder {:?} is not a valid folder name",
                self.sorting.keep_folder
            ));
        }

        if self.sorting.folders_container.trim() == self.sorting.keep_folder.trim() {
            errors.push("folders_container and keep_folder must differ".to_string());
        }

        errors
    }

    /// Returns validated settings, replacing invalid values with defaults.
    pub fn with_defaults_for_invalid(&self) -> Self {
        let defaults = SortingSettings::default();
        let valid = |name: &str| FolderName::try_from(name).ok().map(String::from);

        let mut folders_container = valid(self.sorting.folders_container.as_str())
            .unwrap_or(defaults.folders_container);
        let mut keep_folder =
            valid(self.sorting.keep_folder.as_str()).unwrap_or(defaults.keep_folder);
        if folders_container == keep_folder {
            folders_container = default_folders_container();
            keep_folder = default_keep_folder();
        }

        Self {
            sorting: SortingSettings {
                sort_folders: self.sorting.sort_folders,
                folders_container,
                keep_folder,
                unclassified: self.sorting.unclassified,
            },
            archive: self.archive.clone(),
        }
    }
}

/// How top-level entries are sorted into folders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingSettings {
    /// Move top-level folders into `folders_container`.
    #[serde(default = "default_true")]
    pub sort_folders: bool,
    #[serde(default = "default_folders_container")]
    pub folders_container: String,
    /// Entries in this folder are never sorted or archived.
    #[serde(default = "default_keep_folder")]
    pub keep_folder: String,
    #[serde(default)]
    pub unclassified: UnclassifiedPolicy,
}

impl Default for SortingSettings {
    fn default() -> Self {
        Self {
            sort_folders: true,
            folders_container: default_folders_container(),
            keep_folder: default_keep_folder(),
            unclassified: UnclassifiedPolicy::default(),
        }
    }
}

/// What to do with a file no rule matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Ask the injected prompt; no answer leaves the file in place.
    #[default]
    Prompt,
    /// Leave the file in place without asking.
    Skip,
    /// Fail the whole pass.
    Abort,
}

impl fmt::Display for UnclassifiedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnclassifiedPolicy::Prompt => write!(f, "prompt"),
            UnclassifiedPolicy::Skip => write!(f, "skip"),
            UnclassifiedPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Deep-stash settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// Whether whole folders may be deep-stashed, not only files.
    #[serde(default = "default_true")]
    pub archive_folders: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            archive_folders: true,
        }
    }
}

fn default_folders_container() -> String {
    "Folders".to_string()
}

fn default_keep_folder() -> String {
    "Keep".to_string()
}

fn default_true() -> bool {
    true
}

/// Errors that can occur when loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
