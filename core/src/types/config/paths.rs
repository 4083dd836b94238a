use std::path::{Path, PathBuf};

/// Internal directory holding the index, rules and settings of a managed root.
pub const STASH_DIR: &str = ".stash";

/// Paths of one managed directory.
#[derive(Clone, Debug)]
pub struct Config {
    pub root: PathBuf,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.root.join(STASH_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.stash_dir().join("stash.json")
    }

    pub fn rules_path(&self) -> PathBuf {
        self.stash_dir().join("rules.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.stash_dir().join("config.toml")
    }
}
