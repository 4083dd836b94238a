use super::*;
use tempfile::{TempDir, tempdir};

fn create_test_store() -> (RuleStore, TempDir) {
    let temp_dir = tempdir().unwrap();
    let store = RuleStore::open(temp_dir.path().join(".stash").join("rules.json")).unwrap();
    (store, temp_dir)
}

fn folder(name: &str) -> FolderName {
    FolderName::try_from(name).unwrap()
}

mod open {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_store() {
        let (store, _temp) = create_test_store();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_loads_and_normalizes_keys() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{"extensions": {".PDF": "Documents"}, "mime_types": {"Image/PNG": "Images"}}"#,
        )
        .unwrap();

        let store = RuleStore::open(&path).unwrap();
        assert_eq!(store.rules().extensions.get("pdf"), Some(&folder("Documents")));
        assert_eq!(store.rules().mime_types.get("image/png"), Some(&folder("Images")));
    }

    #[test]
    fn test_rejects_traversal_in_stored_rules() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rules.json");
        std::fs::write(&path, r#"{"extensions": {"pdf": "../outside"}}"#).unwrap();

        assert!(matches!(RuleStore::open(&path), Err(RuleError::Fs(_))));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rules.json");
        std::fs::write(&path, r#"{"extensions": {"txt": "Text"}}"#).unwrap();

        let store = RuleStore::open(&path).unwrap();
        assert_eq!(store.rules().extensions.len(), 1);
        assert!(store.rules().mime_types.is_empty());
    }
}

mod resolve {
    use super::*;

    #[test]
    fn test_extension_match() {
        let (mut store, _temp) = create_test_store();
        store.record("pdf", "Documents").unwrap();

        assert_eq!(store.resolve(Some("pdf"), None), Some(&folder("Documents")));
        assert_eq!(store.resolve(Some("PDF"), None), Some(&folder("Documents")));
    }

    #[test]
    fn test_extension_wins_over_mime() {
        let (mut store, _temp) = create_test_store();
        store.record("png", "Screenshots").unwrap();
        store.record_mime("image/png", "Images").unwrap();

        assert_eq!(
            store.resolve(Some("png"), Some("image/png")),
            Some(&folder("Screenshots"))
        );
    }

    #[test]
    fn test_falls_back_to_mime() {
        let (mut store, _temp) = create_test_store();
        store.record_mime("image/jpeg", "Images").unwrap();

        assert_eq!(
            store.resolve(Some("jpeg"), Some("image/jpeg")),
            Some(&folder("Images"))
        );
    }

    #[test]
    fn test_unknown_is_none() {
        let (mut store, _temp) = create_test_store();
        store.record("pdf", "Documents").unwrap();

        assert_eq!(store.resolve(Some("xyz"), Some("chemical/x-xyz")), None);
        assert_eq!(store.resolve(None, None), None);
        assert_eq!(store.resolve(Some(""), None), None);
    }
}

mod record {
    use super::*;

    #[test]
    fn test_persists_immediately() {
        let (mut store, _temp) = create_test_store();
        store.record(".Mp3", "Music").unwrap();

        let reopened = RuleStore::open(store.path()).unwrap();
        assert_eq!(reopened.resolve(Some("mp3"), None), Some(&folder("Music")));
    }

    #[test]
    fn test_overwrites_existing_rule() {
        let (mut store, _temp) = create_test_store();
        store.record("txt", "Text").unwrap();
        store.record("txt", "Notes").unwrap();

        assert_eq!(store.resolve(Some("txt"), None), Some(&folder("Notes")));
        assert_eq!(store.rules().extensions.len(), 1);
    }

    #[test]
    fn test_rejects_absolute_folder() {
        let (mut store, _temp) = create_test_store();
        let result = store.record("txt", "/etc");

        assert!(matches!(result, Err(RuleError::InvalidRule(_))));
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_rejects_traversal_folder() {
        let (mut store, _temp) = create_test_store();
        assert!(matches!(
            store.record("txt", ".."),
            Err(RuleError::InvalidRule(_))
        ));
        assert!(matches!(
            store.record("txt", "../../tmp"),
            Err(RuleError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_rejects_stash_dir_and_hidden_folders() {
        let (mut store, _temp) = create_test_store();
        assert!(matches!(
            store.record("json", ".stash"),
            Err(RuleError::InvalidRule(_))
        ));
        assert!(matches!(
            store.record_mime("application/json", ".cache"),
            Err(RuleError::InvalidRule(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejects_empty_extension() {
        let (mut store, _temp) = create_test_store();
        assert!(matches!(
            store.record(".", "Docs"),
            Err(RuleError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_record_mime_requires_type_and_subtype() {
        let (mut store, _temp) = create_test_store();
        assert!(matches!(
            store.record_mime("image", "Images"),
            Err(RuleError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_destination_folders() {
        let (mut store, _temp) = create_test_store();
        store.record("pdf", "Documents").unwrap();
        store.record("doc", "Documents").unwrap();
        store.record_mime("image/png", "Images").unwrap();

        let folders: Vec<_> = store
            .destination_folders()
            .into_iter()
            .map(|f| f.as_str().to_string())
            .collect();
        assert_eq!(folders, ["Documents", "Images"]);
    }
}
