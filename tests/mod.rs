//! Main test module for snapwatch
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios on real directories
//! - Chaos tests for network loss, failing listeners and crashes
//! - Property-based tests for merge classification

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use crate::integration::{Harness, Mode};
    use ::snapwatch::*;
    use std::fs;

    #[test]
    fn test_empty_directory() {
        let harness = Harness::new(Mode::Succeed);
        assert!(harness.detector.poll());
        assert!(harness.listener.take().is_empty());
        assert_eq!(harness.detector.root().count(), (0, 0));
    }

    #[test]
    fn test_special_filenames() {
        let harness = Harness::new(Mode::Succeed);
        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            if fs::write(harness.root().join(name), name.as_bytes()).is_ok() {
                created.push(name.to_string());
            }
        }

        harness.detector.poll();
        let mut names = harness.listener.names(ChangeKind::Create);
        names.sort();
        created.sort();
        assert_eq!(names, created);

        harness.detector.poll();
        assert!(harness.listener.take().is_empty());
    }

    #[test]
    fn test_unicode_filenames() {
        let harness = Harness::new(Mode::Succeed);
        let unicode_names = vec!["файл.txt", "文件.txt", "ファイル.txt", "αρχείο.txt", "🚀🌟💾.txt"];

        let mut created = 0;
        for name in &unicode_names {
            if fs::write(harness.root().join(name), "unicode").is_ok() {
                created += 1;
            }
        }
        if created == 0 {
            // No unicode support on this system
            return;
        }

        harness.detector.poll();
        assert_eq!(harness.listener.take().len(), created);
        harness.detector.poll();
        assert!(harness.listener.take().is_empty());
    }

    #[test]
    fn test_empty_directories_are_silent() {
        let harness = Harness::new(Mode::Succeed);
        fs::create_dir_all(harness.root().join("a/b/c")).unwrap();

        harness.detector.poll();
        assert!(harness.listener.take().is_empty());
        assert_eq!(harness.detector.root().count(), (0, 3));

        fs::remove_dir_all(harness.root().join("a")).unwrap();
        harness.detector.poll();
        assert!(harness.listener.take().is_empty());
        assert_eq!(harness.detector.root().count(), (0, 0));
    }

    #[test]
    fn test_symlinks_not_followed_by_default() {
        #[cfg(unix)]
        {
            let harness = Harness::new(Mode::Succeed);
            let outside = tempfile::TempDir::new().unwrap();
            fs::write(outside.path().join("secret.txt"), "x").unwrap();
            std::os::unix::fs::symlink(outside.path(), harness.root().join("link")).unwrap();

            harness.detector.poll();
            // The link itself is reported as a file; its target is not walked
            assert_eq!(harness.listener.names(ChangeKind::Create), vec!["link".to_string()]);
        }
    }
}
