//! Run options and their three-tier merge.
//!
//! Options come from the command line, from the config file's `opts` object,
//! and from built-in defaults. CLI values win over config values, which win
//! over defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Default output directory.
pub const DEFAULT_DESTINATION: &str = "./out/";

/// Default source encoding.
pub const DEFAULT_ENCODING: &str = "utf8";

/// Default template specifier.
pub const DEFAULT_TEMPLATE: &str = "templates/default";

/// Options controlling a single run.
///
/// Boolean flags can only be switched on from the command line, so merging a
/// flag is a logical OR across tiers. Valued options take the first tier that
/// provides them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Positional input paths, in command-line order.
    #[serde(rename = "_", skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,

    /// Path to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configure: Option<PathBuf>,

    /// Output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Source file encoding name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    pub debug: bool,
    pub verbose: bool,
    pub pedantic: bool,
    pub help: bool,
    pub test: bool,
    pub version: bool,
    pub explain: bool,
    pub recurse: bool,
    pub nocolor: bool,

    /// Directory holding tutorials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutorials: Option<PathBuf>,

    /// Template specifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Explicit package metadata file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PathBuf>,

    /// Explicit readme file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<PathBuf>,

    /// Self-check name filter: a regex or a list of regexes.
    #[serde(
        rename = "match",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_patterns: Option<Vec<String>>,

    /// Rendered readme, attached just before publishing.
    #[serde(skip)]
    pub readme_html: Option<String>,

    /// Options this crate does not know about, kept for templates.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RunOptions {
    /// Built-in defaults, the lowest merge tier.
    pub fn defaults() -> Self {
        Self {
            destination: Some(PathBuf::from(DEFAULT_DESTINATION)),
            encoding: Some(DEFAULT_ENCODING.to_string()),
            template: Some(DEFAULT_TEMPLATE.to_string()),
            ..Self::default()
        }
    }

    /// Fill every unset value in `self` from `lower`.
    ///
    /// Positional files are never inherited: they only come from the
    /// invocation itself.
    pub fn or(self, lower: RunOptions) -> Self {
        let mut extra = lower.extra;
        extra.extend(self.extra);

        Self {
            files: self.files,
            configure: self.configure.or(lower.configure),
            destination: self.destination.or(lower.destination),
            encoding: self.encoding.or(lower.encoding),
            debug: self.debug || lower.debug,
            verbose: self.verbose || lower.verbose,
            pedantic: self.pedantic || lower.pedantic,
            help: self.help || lower.help,
            test: self.test || lower.test,
            version: self.version || lower.version,
            explain: self.explain || lower.explain,
            recurse: self.recurse || lower.recurse,
            nocolor: self.nocolor || lower.nocolor,
            tutorials: self.tutorials.or(lower.tutorials),
            template: self.template.or(lower.template),
            package: self.package.or(lower.package),
            readme: self.readme.or(lower.readme),
            match_patterns: self.match_patterns.or(lower.match_patterns),
            readme_html: self.readme_html.or(lower.readme_html),
            extra,
        }
    }

    /// Merge the three tiers: CLI over config over defaults.
    pub fn merge(cli: RunOptions, config: Option<RunOptions>) -> Self {
        cli.or(config.unwrap_or_default()).or(Self::defaults())
    }

    /// Effective template specifier.
    pub fn template_specifier(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }

    /// Effective encoding name.
    pub fn encoding_name(&self) -> &str {
        self.encoding.as_deref().unwrap_or(DEFAULT_ENCODING)
    }
}

/// Accept either `"a"` or `["a", "b"]`.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => None,
        Some(OneOrMany::One(s)) => Some(vec![s]),
        Some(OneOrMany::Many(v)) => Some(v),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_wins_over_config_and_defaults() {
        let cli = RunOptions {
            destination: Some("cli-out".into()),
            ..RunOptions::default()
        };
        let config = RunOptions {
            destination: Some("conf-out".into()),
            template: Some("templates/haruki".into()),
            ..RunOptions::default()
        };

        let merged = RunOptions::merge(cli, Some(config));
        assert_eq!(merged.destination, Some(PathBuf::from("cli-out")));
        assert_eq!(merged.template.as_deref(), Some("templates/haruki"));
        assert_eq!(merged.encoding.as_deref(), Some(DEFAULT_ENCODING));
    }

    #[test]
    fn flags_merge_as_or() {
        let config = RunOptions {
            recurse: true,
            ..RunOptions::default()
        };
        let merged = RunOptions::merge(RunOptions::default(), Some(config));
        assert!(merged.recurse);
        assert!(!merged.explain);
    }

    #[test]
    fn files_are_not_inherited_from_config() {
        let config: RunOptions =
            serde_json::from_str(r#"{ "_": ["from-config.js"] }"#).expect("parse");
        let cli = RunOptions {
            files: vec!["cli.js".into()],
            ..RunOptions::default()
        };
        let merged = RunOptions::merge(cli, Some(config));
        assert_eq!(merged.files, vec![PathBuf::from("cli.js")]);
    }

    #[test]
    fn match_accepts_string_or_list() {
        let one: RunOptions = serde_json::from_str(r#"{ "match": "config" }"#).expect("parse");
        assert_eq!(one.match_patterns, Some(vec!["config".to_string()]));

        let many: RunOptions =
            serde_json::from_str(r#"{ "match": ["config", "template"] }"#).expect("parse");
        assert_eq!(many.match_patterns.map(|m| m.len()), Some(2));
    }

    #[test]
    fn unknown_opts_are_kept_for_templates() {
        let opts: RunOptions =
            serde_json::from_str(r#"{ "recurse": true, "cleverLinks": true }"#).expect("parse");
        assert!(opts.recurse);
        assert_eq!(opts.extra.get("cleverLinks"), Some(&serde_json::Value::Bool(true)));
    }
}
