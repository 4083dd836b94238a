pub mod core;
pub mod types;

pub use crate::core::Stash;
pub use crate::core::error::{ConfigurationError, StashError};
