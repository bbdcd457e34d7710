//! Built-in plugins.

use docweave_shared::{Access, DocletMeta};
use tracing::debug;

use crate::extensions::{ExtensionCatalog, Plugin};
use crate::parser::{EventKind, Handler, ParserEvent};

/// Register every built-in plugin under its `plugins/<name>` specifier.
pub fn register_builtin(catalog: &mut ExtensionCatalog) {
    catalog.register_plugin("plugins/underscore", || Box::new(Underscore));
    catalog.register_plugin("plugins/summarize", || Box::new(Summarize));
    catalog.register_plugin("plugins/sourcetag", || Box::new(SourceTag));
    catalog.register_plugin("plugins/eventDumper", || Box::new(EventDumper));
}

/// Marks symbols whose name starts with `_` as private, unless an access
/// level was declared.
#[derive(Debug, Default)]
pub struct Underscore;

impl Plugin for Underscore {
    fn handlers(&self) -> Vec<(EventKind, Handler)> {
        vec![(
            EventKind::NewDoclet,
            Box::new(|event: &mut ParserEvent<'_>| {
                if let ParserEvent::NewDoclet { doclet } = event {
                    if doclet.access.is_none() && doclet.name.starts_with('_') {
                        doclet.access = Some(Access::Private);
                    }
                }
            }),
        )]
    }
}

/// Fills in a missing summary with the first sentence of the description.
#[derive(Debug, Default)]
pub struct Summarize;

impl Plugin for Summarize {
    fn handlers(&self) -> Vec<(EventKind, Handler)> {
        vec![(
            EventKind::NewDoclet,
            Box::new(|event: &mut ParserEvent<'_>| {
                let ParserEvent::NewDoclet { doclet } = event else { return };
                if doclet.summary.is_none() {
                    doclet.summary = doclet.description.as_deref().map(first_sentence);
                }
            }),
        )]
    }
}

fn first_sentence(text: &str) -> String {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(i, c)| {
            c == '.' && text[i + 1..].chars().next().is_none_or(char::is_whitespace)
        })
        .map(|(i, _)| i + 1)
        .unwrap_or(text.len());
    text[..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies `@source <file> <line>` to the doclet's location and drops the
/// tag.
#[derive(Debug, Default)]
pub struct SourceTag;

impl Plugin for SourceTag {
    fn handlers(&self) -> Vec<(EventKind, Handler)> {
        vec![(
            EventKind::NewDoclet,
            Box::new(|event: &mut ParserEvent<'_>| {
                let ParserEvent::NewDoclet { doclet } = event else { return };
                let Some(pos) = doclet.tags.iter().position(|t| t.title == "source") else {
                    return;
                };
                let tag = doclet.tags.remove(pos);

                let mut parts = tag.value.split(&[',', ' '][..]).filter(|p| !p.is_empty());
                let filename = parts.next().map(str::to_string);
                let lineno = parts.next().and_then(|n| n.parse::<usize>().ok());

                let meta = doclet.meta.get_or_insert_with(|| DocletMeta {
                    path: Default::default(),
                    filename: String::new(),
                    lineno: 0,
                });
                if let Some(filename) = filename {
                    meta.filename = filename;
                }
                if let Some(lineno) = lineno {
                    meta.lineno = lineno;
                }
            }),
        )]
    }
}

/// Logs every parser event at debug level.
#[derive(Debug, Default)]
pub struct EventDumper;

impl Plugin for EventDumper {
    fn handlers(&self) -> Vec<(EventKind, Handler)> {
        [
            EventKind::ParseBegin,
            EventKind::FileBegin,
            EventKind::CommentFound,
            EventKind::NewDoclet,
            EventKind::FileComplete,
            EventKind::ParseComplete,
            EventKind::ProcessingComplete,
        ]
        .into_iter()
        .map(|kind| {
            let handler: Handler = Box::new(move |event: &mut ParserEvent<'_>| dump(kind, event));
            (kind, handler)
        })
        .collect()
    }
}

fn dump(kind: EventKind, event: &ParserEvent<'_>) {
    match event {
        ParserEvent::ParseBegin { source_files } => {
            debug!(event = kind.as_str(), files = source_files.len());
        }
        ParserEvent::FileBegin { filename } | ParserEvent::FileComplete { filename } => {
            debug!(event = kind.as_str(), file = %filename.display());
        }
        ParserEvent::CommentFound { comment, filename, lineno } => {
            debug!(event = kind.as_str(), file = %filename.display(), lineno, comment = %comment);
        }
        ParserEvent::NewDoclet { doclet } => {
            debug!(event = kind.as_str(), longname = %doclet.longname, kind = ?doclet.kind);
        }
        ParserEvent::ParseComplete { doclets, .. } | ParserEvent::ProcessingComplete { doclets } => {
            debug!(event = kind.as_str(), doclets = doclets.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{LoadedPlugin, install_plugins};
    use crate::parser::DocParser;
    use docweave_shared::DocletCollection;
    use std::path::Path;

    fn parse_with(plugin: Box<dyn Plugin>, source: &str) -> DocletCollection {
        let mut parser = DocParser::new(None);
        install_plugins(
            &mut parser,
            &[LoadedPlugin {
                specifier: "test".into(),
                plugin,
            }],
        );
        parser.attach_standard_handlers();
        let mut docs = DocletCollection::new();
        parser.parse_source(Path::new("/src/fixture.js"), source, &mut docs);
        docs
    }

    #[test]
    fn underscore_marks_leading_underscore_private() {
        let docs = parse_with(
            Box::new(Underscore),
            "/** Normal. */\nvar normal = 1;\n/** Hidden. */\nvar _hidden = 2;\n\
             /** Prop. */\nthis._privateProp = 3;\n/**\n * Open.\n * @public\n */\nvar _open = 4;\n",
        );
        assert_eq!(docs.by_longname("normal")[0].access, None);
        assert_eq!(docs.by_longname("_hidden")[0].access, Some(Access::Private));
        assert_eq!(docs.by_longname("_open")[0].access, Some(Access::Public));
        let prop = docs.iter().find(|d| d.name == "_privateProp").expect("prop");
        assert_eq!(prop.access, Some(Access::Private));
    }

    #[test]
    fn summarize_takes_first_sentence() {
        let docs = parse_with(
            Box::new(Summarize),
            "/**\n * Draws the shape. Uses the current pen.\n */\nfunction draw() {}\n",
        );
        assert_eq!(docs.by_longname("draw")[0].summary.as_deref(), Some("Draws the shape."));
    }

    #[test]
    fn first_sentence_ignores_inner_dots() {
        assert_eq!(first_sentence("Version 1.2 of the api. More."), "Version 1.2 of the api.");
        assert_eq!(first_sentence("No period"), "No period");
    }

    #[test]
    fn sourcetag_overrides_location() {
        let docs = parse_with(
            Box::new(SourceTag),
            "/**\n * Handler.\n * @source sourcetag.js 13\n */\nfunction newDoclet() {}\n",
        );
        let doclet = docs.by_longname("newDoclet")[0];
        let meta = doclet.meta.as_ref().expect("meta");
        assert_eq!(meta.filename, "sourcetag.js");
        assert_eq!(meta.lineno, 13);
        assert!(doclet.tag("source").is_none());
    }

    #[test]
    fn event_dumper_listens_to_every_event() {
        assert_eq!(EventDumper.handlers().len(), 7);
    }
}
