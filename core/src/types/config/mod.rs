mod paths;
mod settings;

pub use paths::{Config, STASH_DIR};
pub use settings::{
    ArchiveSettings, SettingsError, SortingSettings, StashSettings, UnclassifiedPolicy,
};
