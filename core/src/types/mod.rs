pub(crate) mod config;
pub use config::{
    ArchiveSettings, Config, STASH_DIR, SettingsError, SortingSettings, StashSettings,
    UnclassifiedPolicy,
};

pub(crate) mod folder_name;
pub use folder_name::{FolderName, FolderNameError, MAX_FOLDER_NAME_LENGTH};

pub(crate) mod item;
pub use item::{DIRECTORY_CONTENT_TYPE, ItemKind, Location, TrackedItem, content_type_for};

pub(crate) mod ghost;
pub use ghost::{GHOST_EXTENSION, GhostRecord};
