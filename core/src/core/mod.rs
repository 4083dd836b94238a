//! Managed-directory facade combining rules, index, sorting and deep-stash.
//!
//! One process per managed root: nothing here locks the index or rules
//! files, so concurrent invocations against the same root are unsupported.

use crate::core::archive::error::ArchiveError;
use crate::core::archive::{ArchiveEngine, Candidate, SweepOutcome};
use crate::core::classify::error::ClassifyError;
use crate::core::classify::{ClassificationPrompt, Classifier, ClassifyOutcome};
use crate::core::fs_util::error::FsError;
use crate::core::index::error::IndexError;
use crate::core::index::{InitOptions, InitOutcome, StashIndex, StatusReport, observe_path};
use crate::core::restore::error::RestoreError;
use crate::core::restore::{RestoreEngine, RestoreFilter, RestoreOutcome};
use crate::core::rules::RuleStore;
use crate::core::rules::error::RuleError;
use crate::types::{
    Config, DIRECTORY_CONTENT_TYPE, FolderName, GhostRecord, ItemKind, Location, STASH_DIR,
    SettingsError, StashSettings, TrackedItem, content_type_for,
};
use chrono::{DateTime, Utc};
use error::{ConfigurationError, StashError};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) mod archive_storage;
pub(crate) mod fs_util;

pub mod archive;
pub mod classify;
pub mod index;
pub mod restore;
pub mod rules;

pub mod error {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ConfigurationError {
        #[error("Stash is not initialized; run `init` first")]
        NotInitialized,

        #[error("No archive destination configured")]
        DestinationUnset,

        #[error("Archive destination is unreachable: {}", .0.display())]
        DestinationUnreachable(PathBuf),

        #[error("Invalid archive destination: {}", .0.display())]
        InvalidDestination(PathBuf),

        #[error("Deep-stash threshold must be at least 1 day")]
        InvalidThreshold,
    }

    #[derive(Debug, Error)]
    pub enum StashError {
        #[error("Configuration error: {0}")]
        Configuration(#[from] ConfigurationError),

        #[error("Classification error: {0}")]
        Classification(#[from] ClassifyError),

        #[error("Rule error: {0}")]
        Rule(#[from] RuleError),

        #[error("Settings error: {0}")]
        Settings(#[from] SettingsError),

        #[error("Index error: {0}")]
        Index(IndexError),

        #[error("Archive error: {0}")]
        Archive(ArchiveError),

        #[error("Restore error: {0}")]
        Restore(RestoreError),

        #[error("Not found: {}", .0.display())]
        NotFound(PathBuf),

        #[error("Not an item of the managed directory: {}", .0.display())]
        InvalidTarget(PathBuf),

        #[error("Filesystem error: {0}")]
        Fs(#[from] FsError),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }

    impl From<IndexError> for StashError {
        fn from(e: IndexError) -> Self {
            match e {
                IndexError::InvalidDestination(path) => {
                    ConfigurationError::InvalidDestination(path).into()
                }
                IndexError::InvalidThreshold(_) => ConfigurationError::InvalidThreshold.into(),
                e => StashError::Index(e),
            }
        }
    }

    impl From<ArchiveError> for StashError {
        fn from(e: ArchiveError) -> Self {
            match e {
                ArchiveError::DestinationUnreachable(path) => {
                    ConfigurationError::DestinationUnreachable(path).into()
                }
                ArchiveError::NotFound(path) => StashError::NotFound(path),
                ArchiveError::InvalidItem(path) => StashError::InvalidTarget(path),
                e => StashError::Archive(e),
            }
        }
    }

    impl From<RestoreError> for StashError {
        fn from(e: RestoreError) -> Self {
            match e {
                RestoreError::NotFound(path) => StashError::NotFound(path),
                e => StashError::Restore(e),
            }
        }
    }
}

pub struct Stash {
    config: Config,
    settings: StashSettings,
    index: StashIndex,
    rules: RuleStore,
}

/// Result of an update pass.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub classified: ClassifyOutcome,
    /// `None` when no archive destination is configured.
    pub sweep: Option<SweepOutcome>,
    /// Items seen for the first time.
    pub newly_tracked: usize,
}

/// Result of a forced deep-stash.
#[derive(Debug, Default)]
pub struct DeepStashOutcome {
    pub archived: Vec<GhostRecord>,
    pub not_found: Vec<PathBuf>,
    /// Existing paths that are not items of the root: anything outside it,
    /// the root itself, the stash directory and ghost records.
    pub rejected: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Result of rebuilding the index from the filesystem.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub dropped: usize,
}

impl Stash {
    /// Opens the managed directory at `root`. Nothing is written.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StashError> {
        let config = Config::new(std::fs::canonicalize(root)?);

        let settings = StashSettings::load(&config.settings_path())?;
        for problem in settings.validate() {
            warn!(problem = %problem, "invalid setting replaced by default");
        }
        let settings = settings.with_defaults_for_invalid();

        let index = StashIndex::load(config.index_path())?;
        let rules = RuleStore::open(config.rules_path())?;

        Ok(Self {
            config,
            settings,
            index,
            rules,
        })
    }

    pub fn root(&self) -> &Path {
        self.config.root()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &StashSettings {
        &self.settings
    }

    pub fn index(&self) -> &StashIndex {
        &self.index
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    fn require_initialized(&self) -> Result<(), StashError> {
        if self.index.is_initialized() {
            Ok(())
        } else {
            Err(ConfigurationError::NotInitialized.into())
        }
    }

    /// The engine for the configured destination, checked for reachability.
    fn archive_engine(&self) -> Result<Option<ArchiveEngine>, StashError> {
        let Some(drive) = self.index.external_drive() else {
            return Ok(None);
        };
        let engine = ArchiveEngine::new(drive, self.index.deepstash_days());
        engine.ensure_reachable()?;
        Ok(Some(engine))
    }
}

/// Setup and inspection.
impl Stash {
    /// One-time setup of destination and threshold; reports
    /// `AlreadyInitialized` instead of failing on a second call.
    pub fn initialize(
        &mut self,
        options: InitOptions,
        now: DateTime<Utc>,
    ) -> Result<InitOutcome, StashError> {
        let outcome = self.index.initialize(self.config.root(), options, now)?;

        if outcome == InitOutcome::Initialized {
            let settings_path = self.config.settings_path();
            if !settings_path.exists() {
                self.settings.save(&settings_path)?;
            }
            info!(root = %self.root().display(), "stash initialized");
        }
        Ok(outcome)
    }

    pub fn status(&self, now: DateTime<Utc>) -> Result<StatusReport, StashError> {
        self.require_initialized()?;
        Ok(self.index.status(now))
    }

    /// Adds an extension rule outside of an update pass.
    pub fn add_rule(&mut self, extension: &str, folder: &str) -> Result<FolderName, StashError> {
        Ok(self.rules.record(extension, folder)?)
    }
}

/// Update pass.
impl Stash {
    /// Sorts the root, tracks what is there and deep-stashes stale items.
    ///
    /// Fails before touching anything if the stash is uninitialized or the
    /// configured destination is unreachable. With no destination configured
    /// only sorting and tracking happen.
    pub fn update(
        &mut self,
        prompt: &mut dyn ClassificationPrompt,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, StashError> {
        self.require_initialized()?;
        let engine = self.archive_engine()?;

        let classified = Classifier::new(
            self.config.root(),
            &self.settings.sorting,
            &mut self.rules,
            prompt,
        )
        .run()?;
        self.rules.save()?;

        let candidates = self.sweep_candidates()?;
        let mut newly_tracked = 0;
        for candidate in &candidates {
            match observe_path(&candidate.path) {
                Ok(item) => {
                    if self.index.observe(item) {
                        newly_tracked += 1;
                    }
                }
                Err(e) => warn!(path = %candidate.path.display(), error = %e, "cannot track"),
            }
        }

        let sweep = match engine {
            Some(engine) => {
                let sweep = engine.sweep(&candidates, now)?;
                for record in &sweep.archived {
                    self.index
                        .set_location(&record.original_path, Location::Archived);
                }
                Some(sweep)
            }
            None => {
                debug!("no archive destination configured; deep-stash skipped");
                None
            }
        };

        self.index.save()?;

        Ok(UpdateOutcome {
            classified,
            sweep,
            newly_tracked,
        })
    }

    /// Items a sweep may archive: the direct children of every category
    /// folder, plus top-level entries that are neither reserved nor categories.
    /// Hidden entries, ghost records and Keep contents never qualify.
    pub fn sweep_candidates(&self) -> Result<Vec<Candidate>, StashError> {
        let sorting = &self.settings.sorting;
        let mut categories: BTreeSet<String> = self
            .rules
            .destination_folders()
            .into_iter()
            .map(|f| f.as_str().to_string())
            .collect();
        categories.insert(sorting.folders_container.clone());

        let mut candidates = Vec::new();
        for entry in fs_util::sorted_entries(self.config.root())? {
            let name = entry.file_name();
            let path = entry.path();

            if Self::never_eligible(&path)
                || name == STASH_DIR
                || name == sorting.keep_folder.as_str()
            {
                continue;
            }

            if path.is_dir() && categories.contains(name.to_string_lossy().as_ref()) {
                for child in fs_util::sorted_entries(&path)? {
                    let child = child.path();
                    if !Self::never_eligible(&child) {
                        self.push_candidate(&mut candidates, child);
                    }
                }
            } else {
                self.push_candidate(&mut candidates, path);
            }
        }

        Ok(candidates)
    }

    fn never_eligible(path: &Path) -> bool {
        path.file_name().is_none_or(fs_util::is_hidden) || GhostRecord::is_ghost_path(path)
    }

    fn push_candidate(&self, candidates: &mut Vec<Candidate>, path: PathBuf) {
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot inspect candidate");
                return;
            }
        };
        if metadata.is_dir() && !self.settings.archive.archive_folders {
            return;
        }
        let Ok(modified) = metadata.modified() else {
            warn!(path = %path.display(), "no modification time");
            return;
        };

        candidates.push(Candidate {
            kind: if metadata.is_dir() {
                ItemKind::Folder
            } else {
                ItemKind::File
            },
            path,
            modified_at: modified.into(),
        });
    }
}

/// Forced deep-stash.
impl Stash {
    /// Archives the named items regardless of age.
    ///
    /// Relative paths are taken from the root. Paths that don't exist are
    /// reported in `not_found`, paths that aren't items of the root in
    /// `rejected`; the others still proceed.
    pub fn deep_stash(
        &mut self,
        paths: &[PathBuf],
        now: DateTime<Utc>,
    ) -> Result<DeepStashOutcome, StashError> {
        self.require_initialized()?;
        let engine = self
            .archive_engine()?
            .ok_or(ConfigurationError::DestinationUnset)?;

        let mut outcome = DeepStashOutcome::default();
        for path in paths {
            let path = match self.resolve_item(path) {
                Ok(path) => path,
                Err(StashError::NotFound(path)) => {
                    warn!(path = %path.display(), "not found");
                    outcome.not_found.push(path);
                    continue;
                }
                Err(StashError::InvalidTarget(path)) => {
                    warn!(path = %path.display(), "not an item of the managed directory");
                    outcome.rejected.push(path);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let Ok(metadata) = std::fs::metadata(&path) else {
                outcome.not_found.push(path);
                continue;
            };

            if let Ok(item) = observe_path(&path) {
                self.index.observe(item);
            }

            let kind = if metadata.is_dir() {
                ItemKind::Folder
            } else {
                ItemKind::File
            };
            match engine.archive(&path, kind, now) {
                Ok(record) => {
                    self.index.set_location(&path, Location::Archived);
                    outcome.archived.push(record);
                }
                Err(ArchiveError::DestinationUnreachable(drive)) => {
                    self.index.save()?;
                    return Err(ConfigurationError::DestinationUnreachable(drive).into());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "deep-stash failed");
                    outcome.failed.push((path, e.to_string()));
                }
            }
        }

        self.index.save()?;
        Ok(outcome)
    }

    /// Canonical path of a named item, which must lie strictly inside the
    /// root, outside the stash directory, and not be a ghost record.
    fn resolve_item(&self, path: &Path) -> Result<PathBuf, StashError> {
        let root = self.config.root();
        let joined = root.join(path);
        let resolved =
            std::fs::canonicalize(&joined).map_err(|_| StashError::NotFound(joined.clone()))?;

        if resolved == root
            || !resolved.starts_with(root)
            || resolved.starts_with(self.config.stash_dir())
            || GhostRecord::is_ghost_path(&resolved)
        {
            return Err(StashError::InvalidTarget(joined));
        }
        Ok(resolved)
    }
}

/// Restore and reconciliation.
impl Stash {
    /// Restores archived items matching `filter`. Works on uninitialized roots
    /// too; the index is only updated when one exists.
    pub fn restore(
        &mut self,
        filter: &RestoreFilter,
        now: DateTime<Utc>,
    ) -> Result<RestoreOutcome, StashError> {
        let filter = RestoreFilter {
            path: filter.path.as_ref().map(|p| self.config.root().join(p)),
            folder: filter.folder.as_ref().map(|p| self.config.root().join(p)),
            within_days: filter.within_days,
        };

        let outcome = RestoreEngine::new(self.config.root()).restore(&filter, now)?;

        if self.index.is_initialized() {
            for path in &outcome.restored {
                match observe_path(path) {
                    Ok(item) => {
                        self.index.observe(item);
                    }
                    Err(_) => {
                        self.index.set_location(path, Location::Local);
                    }
                }
            }
            self.index.save()?;
        }

        Ok(outcome)
    }

    /// Rebuilds the inventory: ghost records define what is archived, live
    /// candidates what is local, and everything else is dropped.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Result<ReconcileOutcome, StashError> {
        self.require_initialized()?;

        let (ghosts, _) = RestoreEngine::new(self.config.root()).scan()?;
        let candidates = self.sweep_candidates()?;

        let previous: HashSet<PathBuf> = self.index.items().iter().map(|i| i.path.clone()).collect();
        let mut items: Vec<TrackedItem> = Vec::new();

        for candidate in &candidates {
            match observe_path(&candidate.path) {
                Ok(mut item) => {
                    if let Some(existing) = self.index.get(&item.path) {
                        item.created_at = existing.created_at;
                    }
                    items.push(item);
                }
                Err(e) => warn!(path = %candidate.path.display(), error = %e, "cannot track"),
            }
        }

        for ghost in ghosts {
            let record = ghost.record;
            let item = match self.index.get(&record.original_path) {
                Some(existing) => TrackedItem {
                    location: Location::Archived,
                    ..existing.clone()
                },
                None => Self::item_from_ghost(&record),
            };
            items.push(item);
        }

        let current: HashSet<PathBuf> = items.iter().map(|i| i.path.clone()).collect();
        let outcome = ReconcileOutcome {
            added: current.difference(&previous).count(),
            updated: current.intersection(&previous).count(),
            dropped: previous.difference(&current).count(),
        };

        self.index.replace_items(items);
        self.index.save()?;

        let report = self.index.status(now);
        info!(
            local = report.local,
            archived = report.archived,
            dropped = outcome.dropped,
            "index reconciled"
        );
        Ok(outcome)
    }

    fn item_from_ghost(record: &GhostRecord) -> TrackedItem {
        TrackedItem {
            filename: record
                .original_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: record.original_path.clone(),
            size: record.size.unwrap_or(0),
            created_at: record.modified_at,
            modified_at: record.modified_at,
            content_type: match record.kind {
                ItemKind::Folder => DIRECTORY_CONTENT_TYPE.to_string(),
                ItemKind::File => content_type_for(&record.original_path),
            },
            location: Location::Archived,
        }
    }
}
