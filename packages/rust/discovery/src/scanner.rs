//! Depth-bounded directory scanner.

use std::path::{Path, PathBuf};

use tracing::{debug, error};
use walkdir::WalkDir;

use crate::filter::{SourceFilter, is_dotfile};

/// Traversal depth used when `--recurse` is set.
pub const RECURSE_DEPTH: usize = 10;

/// Traversal depth otherwise: the direct contents of a given directory.
pub const DEFAULT_DEPTH: usize = 1;

/// Scan `paths` (resolved against `working_dir`) and return the files that
/// pass `filter`, in visitation order.
///
/// Plain files are taken as given. Directories are walked up to `depth`
/// levels, siblings in file-name order. Unreadable paths are logged and
/// skipped.
pub fn scan(paths: &[PathBuf], depth: usize, filter: &SourceFilter, working_dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for path in paths {
        let path = working_dir.join(path);

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                error!(path = %path.display(), error = %e, "unable to read source path");
                continue;
            }
        };

        if metadata.is_file() {
            found.push(path);
            continue;
        }

        let walker = WalkDir::new(&path)
            .min_depth(1)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| filter.include_dotfiles() || !is_dotfile(entry.path()));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => found.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    error!(path = %path.display(), error = %e, "unable to read directory entry");
                }
            }
        }
    }

    let before = found.len();
    found.retain(|p| filter.is_included(p));
    debug!(visited = before, kept = found.len(), depth, "scan complete");

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use docweave_shared::SourceConfig;

    fn temp_tree() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dw-scanner-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("lib/nested/deeper")).unwrap();
        std::fs::create_dir_all(dir.join("lib/.cache")).unwrap();
        std::fs::write(dir.join("lib/b.js"), "").unwrap();
        std::fs::write(dir.join("lib/a.js"), "").unwrap();
        std::fs::write(dir.join("lib/notes.txt"), "").unwrap();
        std::fs::write(dir.join("lib/nested/c.js"), "").unwrap();
        std::fs::write(dir.join("lib/nested/deeper/d.js"), "").unwrap();
        std::fs::write(dir.join("lib/.cache/e.js"), "").unwrap();
        dir
    }

    fn default_filter(dir: &Path) -> SourceFilter {
        SourceFilter::new(&SourceConfig::default(), dir).unwrap()
    }

    #[test]
    fn single_file_is_taken_as_given() {
        let dir = temp_tree();
        let files = scan(&["lib/a.js".into()], DEFAULT_DEPTH, &default_filter(&dir), &dir);
        assert_eq!(files, vec![dir.join("lib/a.js")]);
    }

    #[test]
    fn without_recurse_only_top_level_is_visited() {
        let dir = temp_tree();
        let files = scan(&["lib".into()], DEFAULT_DEPTH, &default_filter(&dir), &dir);
        assert_eq!(files, vec![dir.join("lib/a.js"), dir.join("lib/b.js")]);
    }

    #[test]
    fn recurse_descends_into_subdirectories() {
        let dir = temp_tree();
        let files = scan(&["lib".into()], RECURSE_DEPTH, &default_filter(&dir), &dir);
        assert!(files.contains(&dir.join("lib/nested/c.js")));
        assert!(files.contains(&dir.join("lib/nested/deeper/d.js")));
        assert!(!files.contains(&dir.join("lib/.cache/e.js")));
        assert!(!files.iter().any(|f| f.ends_with("notes.txt")));
    }

    #[test]
    fn dotfiles_can_be_included() {
        let dir = temp_tree();
        let filter = SourceFilter::new(
            &SourceConfig {
                include_dotfiles: true,
                ..SourceConfig::default()
            },
            &dir,
        )
        .unwrap();
        let files = scan(&["lib".into()], RECURSE_DEPTH, &filter, &dir);
        assert!(files.contains(&dir.join("lib/.cache/e.js")));
    }

    #[test]
    fn missing_paths_do_not_stop_the_scan() {
        let dir = temp_tree();
        let files = scan(
            &["missing".into(), "lib/a.js".into()],
            DEFAULT_DEPTH,
            &default_filter(&dir),
            &dir,
        );
        assert_eq!(files, vec![dir.join("lib/a.js")]);
    }
}
