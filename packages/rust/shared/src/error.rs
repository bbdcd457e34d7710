//! Error types for docweave.
//!
//! Library crates use [`DocweaveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docweave operations.
///
/// Every variant is fatal to a run: the orchestrator stops at the first one it
/// sees. Recoverable problems are logged instead of returned.
#[derive(Debug, thiserror::Error)]
pub enum DocweaveError {
    /// Neither host environment could be identified at bootstrap.
    #[error("unable to identify the current host environment")]
    UnknownEnvironment,

    /// Command-line flags could not be parsed.
    #[error("{message}")]
    OptionParse { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A resolved plugin could not be loaded.
    #[error("unable to load plugin \"{plugin}\": {message}")]
    PluginLoad { plugin: String, message: String },

    /// A template could not be loaded.
    #[error("unable to load template: {template}: {message}")]
    TemplateLoad { template: String, message: String },

    /// A template loaded but exposes no publish entry point.
    #[error("{template} does not export a \"publish\" entry point")]
    TemplateMissingPublish { template: String },

    /// The template failed while writing output.
    #[error("render error: {0}")]
    Render(String),

    /// A logged error was escalated to fatal by the severity policy.
    #[error("{message}")]
    Fatal { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocweaveError>;

impl DocweaveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an option-parse error from any displayable message.
    pub fn option_parse(msg: impl Into<String>) -> Self {
        Self::OptionParse {
            message: msg.into(),
        }
    }

    /// Create a fatal error from any displayable message.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
