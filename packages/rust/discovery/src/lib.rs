//! Source discovery: turn CLI inputs and config includes into the list of
//! files to document.
//!
//! Package metadata (`package.json`) and readme files named among the inputs
//! are pulled out of the list and surfaced separately, then the remaining
//! paths are scanned and filtered.

mod filter;
mod readme;
mod scanner;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use docweave_shared::{Result, SourceConfig, strip_json_comments};
use regex::Regex;
use tracing::{debug, error, info, instrument};

pub use filter::{DEFAULT_INCLUDE_PATTERN, SourceFilter};
pub use readme::{load_readme, markdown_to_html};
pub use scanner::{DEFAULT_DEPTH, RECURSE_DEPTH, scan};

static PACKAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpackage\.json$").expect("valid package pattern"));

static README_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\bREADME|\.md)$").expect("valid readme pattern"));

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Inputs to source discovery, borrowed from the run state.
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
    /// Positional CLI paths.
    pub positional: &'a [PathBuf],
    /// The config's `source` section, if any.
    pub source: Option<&'a SourceConfig>,
    /// Explicit `--package` file.
    pub package: Option<&'a Path>,
    /// Explicit `--readme` file.
    pub readme: Option<&'a Path>,
    /// Whether to descend into subdirectories.
    pub recurse: bool,
    /// Base for relative paths.
    pub working_dir: &'a Path,
}

/// Outcome of source discovery.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    /// Candidates left after metadata/readme extraction, before scanning.
    pub candidates: Vec<PathBuf>,
    /// Files to document, absolute, in scan order.
    pub files: Vec<PathBuf>,
    /// Parsed package metadata.
    pub package_metadata: Option<serde_json::Value>,
    /// Rendered readme.
    pub readme_html: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Seed the candidate list: positional inputs, then `source.include`.
pub fn candidate_list(positional: &[PathBuf], source: Option<&SourceConfig>) -> Vec<PathBuf> {
    positional
        .iter()
        .chain(source.into_iter().flat_map(|s| s.include.iter()))
        .cloned()
        .collect()
}

/// Whether a path names package metadata.
pub fn is_package_file(path: &Path) -> bool {
    PACKAGE_PATTERN.is_match(&path.to_string_lossy())
}

/// Whether a path names a readme.
pub fn is_readme_file(path: &Path) -> bool {
    README_PATTERN.is_match(&path.to_string_lossy())
}

/// Build the candidate list and extract package metadata and readme.
///
/// Every candidate matching either pattern is removed. Only the first match
/// for a role is read, and only when no explicit file was given for it.
#[instrument(skip_all)]
pub fn build_source_list(request: &SourceRequest<'_>) -> SourceSet {
    let mut set = SourceSet {
        candidates: candidate_list(request.positional, request.source),
        ..SourceSet::default()
    };

    if let Some(path) = request.package {
        set.package_metadata = read_package(&request.working_dir.join(path));
    }
    if let Some(path) = request.readme {
        set.readme_html = read_readme(&request.working_dir.join(path));
    }

    let mut package_taken = request.package.is_some();
    let mut readme_taken = request.readme.is_some();

    set.candidates.retain(|candidate| {
        let mut keep = true;

        if is_package_file(candidate) {
            if !package_taken {
                set.package_metadata = read_package(&request.working_dir.join(candidate));
                package_taken = true;
            }
            keep = false;
        }

        if is_readme_file(candidate) {
            if !readme_taken {
                set.readme_html = read_readme(&request.working_dir.join(candidate));
                readme_taken = true;
            }
            keep = false;
        }

        keep
    });

    debug!(candidates = set.candidates.len(), "source list built");
    set
}

/// Resolve the files to document.
///
/// The scan is skipped (empty file list) when the config has no `source`
/// section or no candidates are left.
#[instrument(skip_all, fields(recurse = request.recurse))]
pub fn load_source_files(request: &SourceRequest<'_>) -> Result<SourceSet> {
    let mut set = build_source_list(request);

    let Some(source) = request.source else {
        debug!("no source configuration, skipping scan");
        return Ok(set);
    };
    if set.candidates.is_empty() {
        return Ok(set);
    }

    let filter = SourceFilter::new(source, request.working_dir)?;
    let depth = if request.recurse { RECURSE_DEPTH } else { DEFAULT_DEPTH };
    set.files = scan(&set.candidates, depth, &filter, request.working_dir);

    info!(files = set.files.len(), "source files resolved");
    Ok(set)
}

// ---------------------------------------------------------------------------
// Side-channel readers
// ---------------------------------------------------------------------------

fn read_package(path: &Path) -> Option<serde_json::Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            error!(path = %path.display(), error = %e, "unable to read the package file");
            return None;
        }
    };

    match serde_json::from_str(&strip_json_comments(&text)) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(path = %path.display(), error = %e, "unable to parse the package file");
            None
        }
    }
}

fn read_readme(path: &Path) -> Option<String> {
    match load_readme(path) {
        Ok(html) => Some(html),
        Err(e) => {
            error!(path = %path.display(), error = %e, "unable to read the readme file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dw-discovery-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(dir.join("lib/a.js"), "/** A. */").unwrap();
        std::fs::write(dir.join("package.json"), r#"{ "name": "first" }"#).unwrap();
        std::fs::create_dir_all(dir.join("other")).unwrap();
        std::fs::write(dir.join("other/package.json"), r#"{ "name": "second" }"#).unwrap();
        std::fs::write(dir.join("explicit.json"), r#"{ "name": "explicit" }"#).unwrap();
        std::fs::write(dir.join("README.md"), "# Hello").unwrap();
        dir
    }

    fn request<'a>(
        positional: &'a [PathBuf],
        source: Option<&'a SourceConfig>,
        working_dir: &'a Path,
    ) -> SourceRequest<'a> {
        SourceRequest {
            positional,
            source,
            package: None,
            readme: None,
            recurse: false,
            working_dir,
        }
    }

    #[test]
    fn candidates_are_cli_then_config_includes() {
        let source = SourceConfig {
            include: vec!["a".into(), "b".into()],
            ..SourceConfig::default()
        };
        let list = candidate_list(&["c".into()], Some(&source));
        assert_eq!(list, vec![PathBuf::from("c"), PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn first_package_match_wins_and_all_matches_are_removed() {
        let dir = temp_dir();
        let positional = vec![
            PathBuf::from("lib/a.js"),
            PathBuf::from("package.json"),
            PathBuf::from("other/package.json"),
        ];
        let set = build_source_list(&request(&positional, None, &dir));

        assert_eq!(set.candidates, vec![PathBuf::from("lib/a.js")]);
        assert_eq!(set.package_metadata.expect("metadata")["name"], "first");
    }

    #[test]
    fn explicit_package_is_not_overridden() {
        let dir = temp_dir();
        let positional = vec![PathBuf::from("package.json"), PathBuf::from("lib/a.js")];
        let explicit = PathBuf::from("explicit.json");
        let set = build_source_list(&SourceRequest {
            package: Some(&explicit),
            ..request(&positional, None, &dir)
        });

        assert_eq!(set.candidates, vec![PathBuf::from("lib/a.js")]);
        assert_eq!(set.package_metadata.expect("metadata")["name"], "explicit");
    }

    #[test]
    fn readme_is_extracted_and_rendered() {
        let dir = temp_dir();
        let positional = vec![PathBuf::from("README.md"), PathBuf::from("lib/a.js")];
        let set = build_source_list(&request(&positional, None, &dir));

        assert_eq!(set.candidates, vec![PathBuf::from("lib/a.js")]);
        assert!(set.readme_html.expect("readme").contains("<h1>Hello</h1>"));
    }

    #[test]
    fn first_readme_match_wins_and_all_matches_are_removed() {
        let dir = temp_dir();
        std::fs::write(dir.join("other/README.md"), "# Second").unwrap();
        let positional = vec![
            PathBuf::from("README.md"),
            PathBuf::from("lib/a.js"),
            PathBuf::from("other/README.md"),
        ];
        let set = build_source_list(&request(&positional, None, &dir));

        assert_eq!(set.candidates, vec![PathBuf::from("lib/a.js")]);
        let html = set.readme_html.expect("readme");
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(!html.contains("Second"));
    }

    #[test]
    fn explicit_readme_is_not_overridden() {
        let dir = temp_dir();
        std::fs::write(dir.join("guide.markdown"), "# Guide").unwrap();
        let positional = vec![PathBuf::from("README.md"), PathBuf::from("lib/a.js")];
        let explicit = PathBuf::from("guide.markdown");
        let set = build_source_list(&SourceRequest {
            readme: Some(&explicit),
            ..request(&positional, None, &dir)
        });

        assert_eq!(set.candidates, vec![PathBuf::from("lib/a.js")]);
        let html = set.readme_html.expect("readme");
        assert!(html.contains("<h1>Guide</h1>"));
        assert!(!html.contains("Hello"));
    }

    #[test]
    fn unreadable_explicit_package_leaves_metadata_unset() {
        let dir = temp_dir();
        let missing = PathBuf::from("nope.json");
        let set = build_source_list(&SourceRequest {
            package: Some(&missing),
            ..request(&[], None, &dir)
        });
        assert!(set.package_metadata.is_none());
    }

    #[test]
    fn scan_is_skipped_without_source_config() {
        let dir = temp_dir();
        let positional = vec![PathBuf::from("lib/a.js")];
        let set = load_source_files(&request(&positional, None, &dir)).unwrap();
        assert!(set.files.is_empty());
        assert_eq!(set.candidates.len(), 1);
    }

    #[test]
    fn files_are_scanned_and_made_absolute() {
        let dir = temp_dir();
        let source = SourceConfig::default();
        let positional = vec![PathBuf::from("lib")];
        let set = load_source_files(&request(&positional, Some(&source), &dir)).unwrap();
        assert_eq!(set.files, vec![dir.join("lib/a.js")]);
    }
}
