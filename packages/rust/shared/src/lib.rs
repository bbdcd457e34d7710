//! Shared types, error model, and configuration for docweave.
//!
//! This crate is the foundation depended on by all other docweave crates.
//! It provides:
//! - [`DocweaveError`], the unified error type
//! - The doclet model ([`Doclet`], [`DocletCollection`])
//! - Configuration ([`ConfigFile`], [`SourceConfig`], config loading)
//! - Run options and their merge ([`RunOptions`])

pub mod config;
pub mod error;
pub mod options;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ConfigFile, ConfigSource, DEFAULT_CONFIG, SourceConfig, load_config, load_config_from,
    parse_config, resolve_config_path, strip_json_comments,
};
pub use error::{DocweaveError, Result};
pub use options::{DEFAULT_DESTINATION, DEFAULT_ENCODING, DEFAULT_TEMPLATE, RunOptions};
pub use types::{
    Access, Borrow, Doclet, DocletCollection, DocletKind, DocletMeta, PACKAGE_PREFIX, Scope, Tag,
};
