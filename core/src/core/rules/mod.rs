//! Rule Store: extension and MIME type to destination folder mappings.

use crate::core::fs_util;
use crate::core::fs_util::error::FsError;
use crate::types::FolderName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RuleError {
        #[error("Rules file error: {0}")]
        Fs(#[from] FsError),

        #[error("Invalid rule folder {0:?}: must be a single relative folder name")]
        InvalidRule(String),

        #[error("Invalid rule key {0:?}")]
        InvalidKey(String),
    }
}

use error::RuleError;

/// Persisted form of the rules, `.stash/rules.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub extensions: BTreeMap<String, FolderName>,
    #[serde(default)]
    pub mime_types: BTreeMap<String, FolderName>,
}

/// Lower-cases an extension and strips a leading dot.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type.trim().to_ascii_lowercase()
}

pub struct RuleStore {
    path: PathBuf,
    rules: RuleSet,
}

impl RuleStore {
    /// Opens the rules file at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RuleError> {
        let path = path.into();
        let rules = if path.exists() {
            let stored: RuleSet = fs_util::read_json(&path)?;
            RuleSet {
                extensions: stored
                    .extensions
                    .into_iter()
                    .map(|(ext, folder)| (normalize_extension(&ext), folder))
                    .collect(),
                mime_types: stored
                    .mime_types
                    .into_iter()
                    .map(|(mime, folder)| (normalize_mime(&mime), folder))
                    .collect(),
            }
        } else {
            RuleSet::default()
        };

        Ok(Self { path, rules })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn save(&self) -> Result<(), RuleError> {
        fs_util::write_json_atomic(&self.path, &self.rules)?;
        Ok(())
    }
}

/// Lookup.
impl RuleStore {
    /// Exact extension match first, then MIME type. No other inference.
    pub fn resolve(&self, extension: Option<&str>, mime_type: Option<&str>) -> Option<&FolderName> {
        let by_extension = extension
            .map(normalize_extension)
            .filter(|ext| !ext.is_empty())
            .and_then(|ext| self.rules.extensions.get(&ext));

        by_extension.or_else(|| {
            mime_type
                .map(normalize_mime)
                .and_then(|mime| self.rules.mime_types.get(&mime))
        })
    }

    /// Every folder some rule points at.
    pub fn destination_folders(&self) -> BTreeSet<&FolderName> {
        self.rules
            .extensions
            .values()
            .chain(self.rules.mime_types.values())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.extensions.is_empty() && self.rules.mime_types.is_empty()
    }
}

/// Mutation. Every recorded rule is persisted before returning.
impl RuleStore {
    /// Adds or overwrites an extension rule.
    ///
    /// Returns `Err(InvalidRule)` if `folder` is absolute, contains a
    /// separator or is a traversal sequence.
    pub fn record(&mut self, extension: &str, folder: &str) -> Result<FolderName, RuleError> {
        let extension = normalize_extension(extension);
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(RuleError::InvalidKey(extension));
        }
        let folder = Self::validate_folder(folder)?;

        self.rules.extensions.insert(extension.clone(), folder.clone());
        self.save()?;

        info!(extension = %extension, folder = %folder, "recorded extension rule");
        Ok(folder)
    }

    /// Adds or overwrites a MIME type rule.
    pub fn record_mime(&mut self, mime_type: &str, folder: &str) -> Result<FolderName, RuleError> {
        let mime_type = normalize_mime(mime_type);
        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(RuleError::InvalidKey(mime_type));
        }
        let folder = Self::validate_folder(folder)?;

        self.rules.mime_types.insert(mime_type.clone(), folder.clone());
        self.save()?;

        info!(mime_type = %mime_type, folder = %folder, "recorded MIME rule");
        Ok(folder)
    }

    fn validate_folder(folder: &str) -> Result<FolderName, RuleError> {
        FolderName::try_from(folder).map_err(|_| RuleError::InvalidRule(folder.to_string()))
    }
}

#[cfg(test)]
mod tests;
