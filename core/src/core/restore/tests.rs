use super::*;
use crate::core::archive::ArchiveEngine;
use std::io::Write;
use tempfile::{TempDir, tempdir};

mod common {
    use super::*;

    pub(super) fn create_test_dirs() -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("root");
        let drive = temp_dir.path().join("drive");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(drive.join("deepstash")).unwrap();
        (temp_dir, root, drive)
    }

    pub(super) fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    pub(super) fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-30T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Puts `content` in the archive and a ghost at `root/relative.ds`.
    pub(super) fn create_ghost(
        root: &Path,
        drive: &Path,
        relative: &str,
        content: &[u8],
        archived_days_ago: i64,
    ) -> PathBuf {
        let original = root.join(relative);
        let archive_name = relative.replace('/', "_");
        let archive = create_test_file(&drive.join("deepstash"), &archive_name, content);
        let record = GhostRecord {
            kind: ItemKind::File,
            deep_stash_path: archive,
            original_path: original.clone(),
            modified_at: fixed_now() - Duration::days(archived_days_ago),
            size: Some(content.len() as u64),
        };
        let ghost_path = GhostRecord::path_for(&original);
        fs_util::write_json_atomic(&ghost_path, &record).unwrap();
        original
    }
}

mod filter {
    use super::common::fixed_now;
    use super::*;

    fn record(original: &str, archived_days_ago: i64) -> GhostRecord {
        GhostRecord {
            kind: ItemKind::File,
            deep_stash_path: PathBuf::from("/drive/deepstash/x"),
            original_path: PathBuf::from(original),
            modified_at: fixed_now() - Duration::days(archived_days_ago),
            size: None,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = RestoreFilter::all();
        assert!(filter.matches(&record("/root/A/x", 400), fixed_now()));
        assert!(!filter.is_targeted());
    }

    #[test]
    fn test_path_filter_is_exact() {
        let filter = RestoreFilter::path("/root/A/x");
        assert!(filter.matches(&record("/root/A/x", 0), fixed_now()));
        assert!(!filter.matches(&record("/root/A/xy", 0), fixed_now()));
        assert!(filter.is_targeted());
    }

    #[test]
    fn test_folder_filter_is_component_wise() {
        let filter = RestoreFilter::folder("/root/A");
        assert!(filter.matches(&record("/root/A/x", 0), fixed_now()));
        assert!(filter.matches(&record("/root/A/deep/z", 0), fixed_now()));
        assert!(!filter.matches(&record("/root/AB/y", 0), fixed_now()));
        assert!(!filter.matches(&record("/root/B/y", 0), fixed_now()));
    }

    #[test]
    fn test_recency_filter() {
        let filter = RestoreFilter::within_days(7);
        assert!(filter.matches(&record("/root/a", 0), fixed_now()));
        assert!(filter.matches(&record("/root/a", 7), fixed_now()));
        assert!(!filter.matches(&record("/root/a", 8), fixed_now()));
    }

    #[test]
    fn test_criteria_combine() {
        let filter = RestoreFilter {
            path: None,
            folder: Some(PathBuf::from("/root/A")),
            within_days: Some(3),
        };
        assert!(filter.matches(&record("/root/A/x", 1), fixed_now()));
        assert!(!filter.matches(&record("/root/A/x", 10), fixed_now()));
        assert!(!filter.matches(&record("/root/B/x", 1), fixed_now()));
    }
}

mod scan {
    use super::common::*;
    use super::*;

    #[test]
    fn test_finds_nested_ghosts_in_order() {
        let (_temp, root, drive) = create_test_dirs();
        create_ghost(&root, &drive, "B/y.txt", b"y", 1);
        create_ghost(&root, &drive, "A/x.txt", b"x", 1);
        create_ghost(&root, &drive, "top.txt", b"t", 1);

        let (found, unreadable) = RestoreEngine::new(&root).scan().unwrap();

        let originals: Vec<_> = found.iter().map(|g| g.record.original_path.clone()).collect();
        assert_eq!(
            originals,
            vec![root.join("A/x.txt"), root.join("B/y.txt"), root.join("top.txt")]
        );
        assert!(unreadable.is_empty());
    }

    #[test]
    fn test_skips_stash_dir() {
        let (_temp, root, drive) = create_test_dirs();
        create_ghost(&root, &drive, ".stash/internal.txt", b"i", 1);

        let (found, _) = RestoreEngine::new(&root).scan().unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_reports_unreadable_records() {
        let (_temp, root, drive) = create_test_dirs();
        create_test_file(&root, "broken.txt.ds", b"not json");
        create_ghost(&root, &drive, "ok.txt", b"ok", 1);

        let (found, unreadable) = RestoreEngine::new(&root).scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].0, root.join("broken.txt.ds"));
    }
}

mod restore {
    use super::common::*;
    use super::*;

    #[test]
    fn test_archive_then_restore_round_trip() {
        let (_temp, root, drive) = create_test_dirs();
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let file = create_test_file(&root, "Documents/data.bin", &content);
        ArchiveEngine::new(&drive, 30)
            .archive(&file, ItemKind::File, fixed_now())
            .unwrap();
        assert!(!file.exists());

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::all(), fixed_now())
            .unwrap();

        assert_eq!(outcome.restored, vec![file.clone()]);
        assert_eq!(std::fs::read(&file).unwrap(), content);
        assert!(!GhostRecord::path_for(&file).exists());
    }

    #[test]
    fn test_folder_round_trip() {
        let (_temp, root, drive) = create_test_dirs();
        let folder = root.join("Folders/project");
        create_test_file(&folder, "a.txt", b"a");
        create_test_file(&folder, "src/lib.rs", b"pub fn f() {}");
        ArchiveEngine::new(&drive, 30)
            .archive(&folder, ItemKind::Folder, fixed_now())
            .unwrap();

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::all(), fixed_now())
            .unwrap();

        assert_eq!(outcome.restored.len(), 1);
        assert_eq!(
            std::fs::read(folder.join("src/lib.rs")).unwrap(),
            b"pub fn f() {}"
        );
        assert!(!root.join("Folders/project.ds").exists());
    }

    #[test]
    fn test_folder_filter_restores_only_that_folder() {
        let (_temp, root, drive) = create_test_dirs();
        let x = create_ghost(&root, &drive, "A/x", b"x", 1);
        let y = create_ghost(&root, &drive, "B/y", b"y", 1);
        let z = create_ghost(&root, &drive, "A/z", b"z", 1);

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::folder(root.join("A")), fixed_now())
            .unwrap();

        assert_eq!(outcome.restored, vec![x.clone(), z.clone()]);
        assert!(x.exists());
        assert!(z.exists());
        assert!(!y.exists());
        assert!(GhostRecord::path_for(&y).exists());
    }

    #[test]
    fn test_recency_filter_leaves_old_archives() {
        let (_temp, root, drive) = create_test_dirs();
        let recent = create_ghost(&root, &drive, "recent.txt", b"r", 2);
        let old = create_ghost(&root, &drive, "old.txt", b"o", 60);

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::within_days(7), fixed_now())
            .unwrap();

        assert_eq!(outcome.restored, vec![recent]);
        assert!(GhostRecord::path_for(&old).exists());
    }

    #[test]
    fn test_targeted_restore() {
        let (_temp, root, drive) = create_test_dirs();
        let wanted = create_ghost(&root, &drive, "Docs/wanted.txt", b"w", 1);
        let other = create_ghost(&root, &drive, "Docs/other.txt", b"o", 1);

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::path(&wanted), fixed_now())
            .unwrap();

        assert_eq!(outcome.restored, vec![wanted.clone()]);
        assert_eq!(std::fs::read(&wanted).unwrap(), b"w");
        assert!(!other.exists());
    }

    #[test]
    fn test_targeted_restore_not_found() {
        let (_temp, root, drive) = create_test_dirs();
        create_ghost(&root, &drive, "Docs/other.txt", b"o", 1);

        let result = RestoreEngine::new(&root)
            .restore(&RestoreFilter::path(root.join("Docs/nope.txt")), fixed_now());

        assert!(matches!(
            result,
            Err(RestoreError::NotFound(p)) if p == root.join("Docs/nope.txt")
        ));
    }

    #[test]
    fn test_targeted_restore_with_missing_archive() {
        let (_temp, root, drive) = create_test_dirs();
        let original = create_ghost(&root, &drive, "Docs/a.txt", b"a", 1);
        std::fs::remove_file(drive.join("deepstash/Docs_a.txt")).unwrap();

        let result =
            RestoreEngine::new(&root).restore(&RestoreFilter::path(&original), fixed_now());

        assert!(matches!(result, Err(RestoreError::ArchiveMissing { .. })));
        assert!(GhostRecord::path_for(&original).exists());
    }

    #[test]
    fn test_missing_archive_is_skipped_not_fatal() {
        let (_temp, root, drive) = create_test_dirs();
        let lost = create_ghost(&root, &drive, "a.txt", b"a", 1);
        let kept = create_ghost(&root, &drive, "b.txt", b"b", 1);
        std::fs::remove_file(drive.join("deepstash/a.txt")).unwrap();

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::all(), fixed_now())
            .unwrap();

        assert_eq!(outcome.missing, vec![lost.clone()]);
        assert_eq!(outcome.restored, vec![kept]);
        assert!(GhostRecord::path_for(&lost).exists());
    }

    #[test]
    fn test_restore_overwrites_existing_file() {
        let (_temp, root, drive) = create_test_dirs();
        let original = create_ghost(&root, &drive, "a.txt", b"archived", 1);
        create_test_file(&root, "a.txt", b"local");

        RestoreEngine::new(&root)
            .restore(&RestoreFilter::all(), fixed_now())
            .unwrap();

        assert_eq!(std::fs::read(&original).unwrap(), b"archived");
    }

    #[test]
    fn test_nothing_to_restore() {
        let (_temp, root, _drive) = create_test_dirs();

        let outcome = RestoreEngine::new(&root)
            .restore(&RestoreFilter::all(), fixed_now())
            .unwrap();

        assert!(outcome.restored.is_empty());
        assert!(outcome.missing.is_empty());
        assert!(outcome.failed.is_empty());
    }
}
