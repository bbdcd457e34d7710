//! Include/exclude filter built from the config's `source` section.

use std::path::{Path, PathBuf};

use docweave_shared::{DocweaveError, Result, SourceConfig};
use regex::Regex;

/// Default allow-list when the config gives no `includePattern`.
pub const DEFAULT_INCLUDE_PATTERN: &str = r".+\.js(doc|x)?$";

/// Decides which scanned files are documented.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    include_pattern: Regex,
    exclude_pattern: Option<Regex>,
    exclude: Vec<PathBuf>,
    include_dotfiles: bool,
}

impl SourceFilter {
    /// Build a filter; `exclude` paths are resolved against `working_dir`.
    pub fn new(config: &SourceConfig, working_dir: &Path) -> Result<Self> {
        let include_pattern = compile(
            "includePattern",
            config.include_pattern.as_deref().unwrap_or(DEFAULT_INCLUDE_PATTERN),
        )?;
        let exclude_pattern = config
            .exclude_pattern
            .as_deref()
            .map(|p| compile("excludePattern", p))
            .transpose()?;

        Ok(Self {
            include_pattern,
            exclude_pattern,
            exclude: config.exclude.iter().map(|p| working_dir.join(p)).collect(),
            include_dotfiles: config.include_dotfiles,
        })
    }

    /// Whether dot-prefixed entries should be visited at all.
    pub fn include_dotfiles(&self) -> bool {
        self.include_dotfiles
    }

    /// Whether `path` should be documented.
    pub fn is_included(&self, path: &Path) -> bool {
        // Patterns are written with forward slashes on every platform.
        let normalized = path.to_string_lossy().replace('\\', "/");

        if !self.include_pattern.is_match(&normalized) {
            return false;
        }

        if self
            .exclude_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&normalized))
        {
            return false;
        }

        !self.exclude.iter().any(|excluded| path.starts_with(excluded))
    }
}

fn compile(key: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| DocweaveError::config(format!("invalid source.{key} \"{pattern}\": {e}")))
}

/// Whether the last component of `path` starts with a dot.
pub(crate) fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n != "." && n != "..")
}
