//! Classifier: decides where each top-level entry of the managed root belongs.

use crate::core::fs_util;
use crate::core::fs_util::error::FsError;
use crate::core::rules::RuleStore;
use crate::core::rules::error::RuleError;
use crate::core::rules::normalize_extension;
use crate::types::{FolderName, GhostRecord, STASH_DIR, SortingSettings, UnclassifiedPolicy};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ClassifyError {
        #[error("Filesystem error: {0}")]
        Fs(#[from] FsError),

        #[error("Rule error: {0}")]
        Rule(#[from] RuleError),

        #[error("No rule for {}", .0.display())]
        Unclassified(PathBuf),
    }
}

use error::ClassifyError;

/// A file no rule matched, handed to the prompt.
#[derive(Debug, Clone, Copy)]
pub struct UnclassifiedItem<'a> {
    pub path: &'a Path,
    pub extension: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

/// Supplies a destination folder for a file no rule matches.
///
/// Returning `None` (or an empty answer) leaves the file where it is.
pub trait ClassificationPrompt {
    fn ask(&mut self, item: &UnclassifiedItem<'_>) -> Option<String>;
}

/// Never answers. Used for unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl ClassificationPrompt for NoPrompt {
    fn ask(&mut self, _item: &UnclassifiedItem<'_>) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Policy is `skip`.
    NoRule,
    /// The prompt gave no answer.
    NoAnswer,
    /// The prompt answered with something that is not a folder name.
    InvalidAnswer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Move {
        destination: PathBuf,
        /// Extension rule created from a prompt answer.
        new_rule: Option<(String, FolderName)>,
    },
    Skip(SkipReason),
}

/// Result of one classification pass over the root.
#[derive(Debug, Default)]
pub struct ClassifyOutcome {
    /// `(from, to)` for every entry that was moved.
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// Files left in place because no rule applied.
    pub skipped: Vec<PathBuf>,
    pub rules_added: Vec<(String, FolderName)>,
    /// Entries that could not be inspected or moved.
    pub failed: Vec<(PathBuf, String)>,
}

pub struct Classifier<'a> {
    root: &'a Path,
    settings: &'a SortingSettings,
    rules: &'a mut RuleStore,
    prompt: &'a mut dyn ClassificationPrompt,
}

impl<'a> Classifier<'a> {
    pub fn new(
        root: &'a Path,
        settings: &'a SortingSettings,
        rules: &'a mut RuleStore,
        prompt: &'a mut dyn ClassificationPrompt,
    ) -> Self {
        Self {
            root,
            settings,
            rules,
            prompt,
        }
    }

    /// Names at the top of the root that are never classified as folders:
    /// the stash directory, Keep, the folders container and rule destinations.
    pub fn reserved_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .rules
            .destination_folders()
            .into_iter()
            .map(|f| f.as_str().to_string())
            .collect();
        names.insert(STASH_DIR.to_string());
        names.insert(self.settings.keep_folder.clone());
        names.insert(self.settings.folders_container.clone());
        names
    }
}

/// Single-entry decisions.
impl Classifier<'_> {
    /// Decides the destination of a top-level file.
    ///
    /// Returns `Err(Unclassified)` only under the `abort` policy.
    pub fn classify_file(&mut self, path: &Path) -> Result<Classification, ClassifyError> {
        let Some(file_name) = path.file_name() else {
            return Ok(Classification::Skip(SkipReason::NoRule));
        };

        let extension = path
            .extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .filter(|e| !e.is_empty());
        let mime_type = mime_guess::from_path(path).first_raw();

        if let Some(folder) = self.rules.resolve(extension.as_deref(), mime_type) {
            return Ok(Classification::Move {
                destination: self.root.join(folder.as_str()).join(file_name),
                new_rule: None,
            });
        }

        match self.settings.unclassified {
            UnclassifiedPolicy::Skip => Ok(Classification::Skip(SkipReason::NoRule)),
            UnclassifiedPolicy::Abort => Err(ClassifyError::Unclassified(path.to_path_buf())),
            UnclassifiedPolicy::Prompt => {
                // Without an extension there is no key to remember, and a
                // one-off folder would be swept into the container next pass.
                let Some(extension) = extension else {
                    return Ok(Classification::Skip(SkipReason::NoRule));
                };

                let item = UnclassifiedItem {
                    path,
                    extension: Some(extension.as_str()),
                    mime_type,
                };
                let answer = self.prompt.ask(&item);
                let Some(answer) = answer.filter(|a| !a.trim().is_empty()) else {
                    return Ok(Classification::Skip(SkipReason::NoAnswer));
                };

                let folder = match self.rules.record(&extension, &answer) {
                    Ok(folder) => folder,
                    Err(RuleError::InvalidRule(_)) => {
                        warn!(path = %path.display(), answer = %answer, "rejected folder name");
                        return Ok(Classification::Skip(SkipReason::InvalidAnswer(answer)));
                    }
                    Err(e) => return Err(e.into()),
                };
                let new_rule = Some((extension, folder.clone()));

                Ok(Classification::Move {
                    destination: self.root.join(folder.as_str()).join(file_name),
                    new_rule,
                })
            }
        }
    }

    /// Top-level folders all go into the catch-all container.
    pub fn folder_destination(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?;
        Some(self.root.join(&self.settings.folders_container).join(name))
    }
}

/// Full pass.
impl Classifier<'_> {
    /// Classifies and moves every eligible top-level entry of the root.
    ///
    /// Hidden entries, ghost records and reserved folders are left alone.
    /// Per-entry I/O failures are collected in the outcome; only the `abort`
    /// policy or a failure to persist a rule stops the pass.
    pub fn run(&mut self) -> Result<ClassifyOutcome, ClassifyError> {
        let mut outcome = ClassifyOutcome::default();

        for entry in fs_util::sorted_entries(self.root)? {
            let path = entry.path();
            let name = entry.file_name();

            if fs_util::is_hidden(&name) || GhostRecord::is_ghost_path(&path) {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot inspect entry");
                    outcome.failed.push((path, e.to_string()));
                    continue;
                }
            };

            let destination = if file_type.is_dir() {
                // Re-read per entry: a rule recorded earlier in this pass
                // creates a folder that must not be swept into the container.
                if !self.settings.sort_folders
                    || self
                        .reserved_names()
                        .contains(name.to_string_lossy().as_ref())
                {
                    continue;
                }
                match self.folder_destination(&path) {
                    Some(destination) => destination,
                    None => continue,
                }
            } else {
                match self.classify_file(&path)? {
                    Classification::Move {
                        destination,
                        new_rule,
                    } => {
                        if let Some(rule) = new_rule {
                            outcome.rules_added.push(rule);
                        }
                        destination
                    }
                    Classification::Skip(reason) => {
                        debug!(path = %path.display(), ?reason, "left unclassified");
                        outcome.skipped.push(path);
                        continue;
                    }
                }
            };

            match fs_util::move_item(&path, &destination) {
                Ok(()) => {
                    info!(from = %path.display(), to = %destination.display(), "moved");
                    outcome.moved.push((path, destination));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "move failed");
                    outcome.failed.push((path, e.to_string()));
                }
            }
        }

        Ok(outcome)
    }
}
