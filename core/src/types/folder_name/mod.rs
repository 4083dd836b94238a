use nutype::nutype;

pub const MAX_FOLDER_NAME_LENGTH: usize = 255;

/// A destination folder is a single visible path segment under the managed root.
/// Leading dots are refused: hidden entries are never swept, and `.stash`
/// holds the index and rules.
fn is_simple_segment(name: &str) -> bool {
    !name.starts_with('.') && !name.contains(['/', '\\', '\0'])
}

#[nutype(
    sanitize(trim),
    validate(
        not_empty,
        len_char_max = MAX_FOLDER_NAME_LENGTH,
        predicate = is_simple_segment
    ),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        TryFrom,
        Into,
        Hash,
        Display,
        Serialize,
        Deserialize,
    )
)]
pub struct FolderName(String);
