//! Configuration file model and loading.
//!
//! The config file is JSON that may carry `//` and `/* */` comments. It is
//! looked up as `--configure <path>`, then `<root>/conf.json`, then
//! `<root>/conf.json.EXAMPLE`, and finally falls back to the compiled-in
//! default below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocweaveError, Result};
use crate::options::RunOptions;

/// Default configuration file name, looked up in the installation root.
pub const CONFIG_FILE_NAME: &str = "conf.json";

/// Example configuration file name, used when `conf.json` is absent.
pub const EXAMPLE_CONFIG_FILE_NAME: &str = "conf.json.EXAMPLE";

/// Configuration used when no file is found on disk.
pub const DEFAULT_CONFIG: &str = include_str!("../conf.json.EXAMPLE");

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level config, deserialized from comment-stripped JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Source inclusion and filter rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConfig>,

    /// Plugin specifiers, installed in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,

    /// Parser configuration, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<serde_json::Value>,

    /// Middle tier of the option merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<RunOptions>,

    /// Anything else (`tags`, `templates`, ...), kept for templates.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `source` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    /// Paths appended after the positional CLI inputs.
    pub include: Vec<PathBuf>,

    /// Paths (and everything below them) to leave out.
    pub exclude: Vec<PathBuf>,

    /// Regex a file path must match to be documented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_pattern: Option<String>,

    /// Regex that removes matching file paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_pattern: Option<String>,

    /// Whether dot-prefixed files and directories are scanned.
    pub include_dotfiles: bool,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Where the effective configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file on disk.
    File(PathBuf),
    /// The compiled-in default.
    Builtin,
}

/// Pick the config file for a run rooted at `root_dir`.
///
/// An explicit path is always returned as-is so that a missing file surfaces
/// as an error naming it.
pub fn resolve_config_path(root_dir: &Path, explicit: Option<&Path>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::File(path.to_path_buf());
    }

    [CONFIG_FILE_NAME, EXAMPLE_CONFIG_FILE_NAME]
        .iter()
        .map(|name| root_dir.join(name))
        .find(|candidate| candidate.is_file())
        .map(ConfigSource::File)
        .unwrap_or(ConfigSource::Builtin)
}

/// Load the configuration from the given source.
pub fn load_config(source: &ConfigSource) -> Result<ConfigFile> {
    match source {
        ConfigSource::File(path) => load_config_from(path),
        ConfigSource::Builtin => {
            tracing::debug!("no config file found, using built-in defaults");
            parse_config(DEFAULT_CONFIG)
                .map_err(|e| DocweaveError::config(format!("built-in config is invalid: {e}")))
        }
    }
}

/// Load the configuration from a specific file path.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DocweaveError::config(format!("Cannot parse the config file {}: {e}", path.display()))
    })?;

    let mut config = parse_config(&content).map_err(|e| {
        DocweaveError::config(format!("Cannot parse the config file {}: {e}", path.display()))
    })?;

    if config.source.is_none() {
        tracing::debug!(path = %path.display(), "config has no source section, using the built-in one");
        config.source = builtin_source();
    }
    Ok(config)
}

/// The `source` section of the compiled-in default config.
fn builtin_source() -> Option<SourceConfig> {
    parse_config(DEFAULT_CONFIG).ok().and_then(|c| c.source)
}

/// Parse config text, stripping comments first.
pub fn parse_config(text: &str) -> serde_json::Result<ConfigFile> {
    serde_json::from_str(&strip_json_comments(text))
}

/// Remove `//` line comments and `/* */` block comments from JSON text.
///
/// Comment markers inside string literals are left alone. Removed comments
/// are replaced with whitespace so that parse errors keep their positions.
pub fn strip_json_comments(text: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        String,
        Escape,
        Line,
        Block,
    }

    let mut out = String::with_capacity(text.len());
    let mut state = State::Code;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '"' => {
                    state = State::String;
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::Line;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::Block;
                }
                _ => out.push(c),
            },
            State::String => {
                match c {
                    '\\' => state = State::Escape,
                    '"' => state = State::Code,
                    _ => {}
                }
                out.push(c);
            }
            State::Escape => {
                state = State::String;
                out.push(c);
            }
            State::Line => {
                if c == '\n' {
                    state = State::Code;
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
            State::Block => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else if c == '\n' {
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
        }
    }

    out
}
