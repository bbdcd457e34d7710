//! Readme loading and markdown-to-HTML conversion.

use std::path::Path;

use docweave_shared::{DocweaveError, Result};
use pulldown_cmark::{Options, Parser, html};

/// Read a readme file and return it as HTML.
///
/// Files ending in `.html`/`.htm` are returned verbatim; anything else is
/// treated as markdown.
pub fn load_readme(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;

    let is_html = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));

    if is_html {
        Ok(content)
    } else {
        Ok(markdown_to_html(&content))
    }
}

/// Render markdown with tables, strikethrough and footnotes enabled.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
