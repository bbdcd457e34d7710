//! Doc-comment parser and its event bus.
//!
//! The parser walks `/** ... */` blocks in each source file, turns them into
//! doclets and fires events along the way. Plugins hook in by registering one
//! handler per [`EventKind`]; registering again for the same event replaces
//! the earlier handler.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use docweave_shared::{
    Access, Borrow, Doclet, DocletCollection, DocletKind, DocletMeta, Scope, Tag,
};
use regex::Regex;
use tracing::{debug, error, instrument, warn};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Names of the events a plugin can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    ParseBegin,
    FileBegin,
    CommentFound,
    NewDoclet,
    FileComplete,
    ParseComplete,
    ProcessingComplete,
}

impl EventKind {
    /// Event name as written in plugin manifests and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseBegin => "parseBegin",
            Self::FileBegin => "fileBegin",
            Self::CommentFound => "jsdocCommentFound",
            Self::NewDoclet => "newDoclet",
            Self::FileComplete => "fileComplete",
            Self::ParseComplete => "parseComplete",
            Self::ProcessingComplete => "processingComplete",
        }
    }
}

/// Payload handed to a handler.
///
/// Events fired before a doclet is final carry mutable data; the completion
/// events are read-only.
#[derive(Debug)]
pub enum ParserEvent<'a> {
    ParseBegin { source_files: &'a mut Vec<PathBuf> },
    FileBegin { filename: &'a Path },
    CommentFound { comment: &'a mut String, filename: &'a Path, lineno: usize },
    NewDoclet { doclet: &'a mut Doclet },
    FileComplete { filename: &'a Path },
    ParseComplete { source_files: &'a [PathBuf], doclets: &'a DocletCollection },
    ProcessingComplete { doclets: &'a DocletCollection },
}

impl ParserEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ParseBegin { .. } => EventKind::ParseBegin,
            Self::FileBegin { .. } => EventKind::FileBegin,
            Self::CommentFound { .. } => EventKind::CommentFound,
            Self::NewDoclet { .. } => EventKind::NewDoclet,
            Self::FileComplete { .. } => EventKind::FileComplete,
            Self::ParseComplete { .. } => EventKind::ParseComplete,
            Self::ProcessingComplete { .. } => EventKind::ProcessingComplete,
        }
    }
}

/// An event handler.
pub type Handler = Box<dyn FnMut(&mut ParserEvent<'_>)>;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Supported source encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
}

impl Encoding {
    /// Parse an encoding name; unknown names fall back to UTF-8 with a warning.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Self::Utf8,
            "latin1" | "latin-1" | "iso-8859-1" | "binary" => Self::Latin1,
            other => {
                warn!(encoding = other, "unsupported encoding, reading sources as utf8");
                Self::Utf8
            }
        }
    }

    fn decode(self, bytes: Vec<u8>) -> std::result::Result<String, std::string::FromUtf8Error> {
        match self {
            Self::Utf8 => String::from_utf8(bytes),
            Self::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Turns source files into doclets.
pub struct DocParser {
    handlers: BTreeMap<EventKind, Handler>,
    standard_handlers: bool,
    config: Option<serde_json::Value>,
    stop: Option<Box<dyn Fn() -> bool>>,
}

impl std::fmt::Debug for DocParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocParser")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("standard_handlers", &self.standard_handlers)
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

impl DocParser {
    /// Create a parser. `config` is the config file's `parser` value.
    pub fn new(config: Option<serde_json::Value>) -> Self {
        Self {
            handlers: BTreeMap::new(),
            standard_handlers: false,
            config,
            stop: None,
        }
    }

    /// Parser configuration as given in the config file.
    pub fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// Register `handler` for `kind`, replacing any earlier one.
    pub fn on(&mut self, kind: EventKind, handler: Handler) {
        if self.handlers.insert(kind, handler).is_some() {
            debug!(event = kind.as_str(), "replacing earlier event handler");
        }
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Turn on doclet creation from comments. Without this the parser only
    /// fires file-level events.
    pub fn attach_standard_handlers(&mut self) {
        self.standard_handlers = true;
    }

    /// Stop parsing before the next file once `check` returns true.
    pub fn stop_when(&mut self, check: impl Fn() -> bool + 'static) {
        self.stop = Some(Box::new(check));
    }

    fn should_stop(&self) -> bool {
        self.stop.as_ref().is_some_and(|check| check())
    }

    fn fire(&mut self, event: &mut ParserEvent<'_>) {
        if let Some(handler) = self.handlers.get_mut(&event.kind()) {
            handler(event);
        }
    }

    /// Parse every file and return the doclets found.
    ///
    /// `parseBegin` handlers may edit `source_files`; the edited list is what
    /// gets parsed and is left in place for the caller. Unreadable files are
    /// logged and skipped. `on_file` is called after each file with its
    /// position in the list. When the stop check fires, the remaining files
    /// are skipped and `parseComplete` is not sent.
    #[instrument(skip_all, fields(files = source_files.len()))]
    pub fn parse(
        &mut self,
        source_files: &mut Vec<PathBuf>,
        encoding: Encoding,
        mut on_file: impl FnMut(&Path, usize, usize),
    ) -> DocletCollection {
        self.fire(&mut ParserEvent::ParseBegin {
            source_files: &mut *source_files,
        });

        let mut doclets = DocletCollection::new();
        let total = source_files.len();

        for (i, file) in source_files.iter().enumerate() {
            if self.should_stop() {
                debug!(skipped = total - i, "parsing stopped");
                return doclets;
            }

            let source = match std::fs::read(file).map(|b| encoding.decode(b)) {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    error!(path = %file.display(), error = %e, "source file is not valid for the configured encoding");
                    continue;
                }
                Err(e) => {
                    error!(path = %file.display(), error = %e, "unable to read source file");
                    continue;
                }
            };

            self.parse_source(file, &source, &mut doclets);
            on_file(file, i + 1, total);
        }

        self.fire(&mut ParserEvent::ParseComplete {
            source_files: source_files.as_slice(),
            doclets: &doclets,
        });

        debug!(doclets = doclets.len(), "parse complete");
        doclets
    }

    /// Parse one file's text into `doclets`.
    pub fn parse_source(&mut self, file: &Path, source: &str, doclets: &mut DocletCollection) {
        self.fire(&mut ParserEvent::FileBegin { filename: file });

        for block in comment_blocks(source) {
            let mut comment = block.text;
            self.fire(&mut ParserEvent::CommentFound {
                comment: &mut comment,
                filename: file,
                lineno: block.lineno,
            });

            if !self.standard_handlers {
                continue;
            }

            let Some(mut doclet) = doclet_from_comment(&comment, block.next_line) else {
                continue;
            };
            doclet.meta = Some(DocletMeta {
                path: file.to_path_buf(),
                filename: file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                lineno: block.lineno,
            });

            self.fire(&mut ParserEvent::NewDoclet { doclet: &mut doclet });
            doclets.push(doclet);
        }

        self.fire(&mut ParserEvent::FileComplete { filename: file });
    }

    /// Notify listeners that post-processing finished.
    pub fn fire_processing_complete(&mut self, doclets: &DocletCollection) {
        self.fire(&mut ParserEvent::ProcessingComplete { doclets });
    }
}

// ---------------------------------------------------------------------------
// Comment extraction
// ---------------------------------------------------------------------------

struct CommentBlock {
    text: String,
    lineno: usize,
    /// First non-blank line of code after the comment.
    next_line: Option<String>,
}

fn comment_blocks(source: &str) -> Vec<CommentBlock> {
    let mut blocks = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("/**") {
        let body_start = start + 3;
        // `/**/` is an empty plain comment, not a doc comment.
        if rest[body_start..].starts_with('/') {
            offset += body_start;
            rest = &rest[body_start..];
            continue;
        }
        let Some(len) = rest[body_start..].find("*/") else {
            break;
        };

        let raw = &rest[body_start..body_start + len];
        let lineno = source[..offset + start].matches('\n').count() + 1;
        let after = &rest[body_start + len + 2..];
        let next_line = after
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string);

        blocks.push(CommentBlock {
            text: clean_comment(raw),
            lineno,
            next_line,
        });

        let consumed = body_start + len + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    blocks
}

/// Strip the leading `*` decoration from each comment line.
fn clean_comment(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line.strip_prefix('*').unwrap_or(line);
            line.strip_prefix(' ').unwrap_or(line).trim_end()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Doclet construction
// ---------------------------------------------------------------------------

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:async\s+)?function\*?\s+([A-Za-z_$][\w$]*)").expect("valid regex")
});
static CLASS_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?class\s+([A-Za-z_$][\w$]*)").expect("valid regex")
});
static VAR_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*(function|class)?").expect("valid regex")
});
static PROTOTYPE_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$.]*)\.prototype\.([A-Za-z_$][\w$]*)\s*=\s*(function)?").expect("valid regex")
});
static THIS_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^this\.([A-Za-z_$][\w$]*)\s*=").expect("valid regex")
});
static STATIC_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$.]*)\.([A-Za-z_$][\w$]*)\s*=\s*(function)?").expect("valid regex")
});

/// What the code after a comment says about the symbol.
#[derive(Debug, Default, PartialEq)]
struct CodeHint {
    name: Option<String>,
    kind: Option<DocletKind>,
    memberof: Option<String>,
    scope: Option<Scope>,
}

fn kind_of(keyword: Option<regex::Match<'_>>) -> DocletKind {
    match keyword.map(|m| m.as_str()) {
        Some("function") => DocletKind::Function,
        Some("class") => DocletKind::Class,
        _ => DocletKind::Member,
    }
}

fn hint_from_code(line: &str) -> CodeHint {
    if let Some(c) = FUNCTION_DECL.captures(line) {
        return CodeHint {
            name: Some(c[1].to_string()),
            kind: Some(DocletKind::Function),
            ..CodeHint::default()
        };
    }
    if let Some(c) = CLASS_DECL.captures(line) {
        return CodeHint {
            name: Some(c[1].to_string()),
            kind: Some(DocletKind::Class),
            ..CodeHint::default()
        };
    }
    if let Some(c) = VAR_DECL.captures(line) {
        return CodeHint {
            name: Some(c[1].to_string()),
            kind: Some(kind_of(c.get(2))),
            ..CodeHint::default()
        };
    }
    if let Some(c) = PROTOTYPE_ASSIGN.captures(line) {
        return CodeHint {
            name: Some(c[2].to_string()),
            kind: Some(kind_of(c.get(3))),
            memberof: Some(c[1].to_string()),
            scope: Some(Scope::Instance),
        };
    }
    if let Some(c) = THIS_ASSIGN.captures(line) {
        return CodeHint {
            name: Some(c[1].to_string()),
            kind: Some(DocletKind::Member),
            scope: Some(Scope::Instance),
            ..CodeHint::default()
        };
    }
    if let Some(c) = STATIC_ASSIGN.captures(line) {
        return CodeHint {
            name: Some(c[2].to_string()),
            kind: Some(kind_of(c.get(3))),
            memberof: Some(c[1].to_string()),
            scope: Some(Scope::Static),
        };
    }
    CodeHint::default()
}

/// Build a doclet from a cleaned comment and the code line that follows it.
///
/// Returns `None` when no name can be found either in the tags or the code.
fn doclet_from_comment(comment: &str, next_line: Option<String>) -> Option<Doclet> {
    let mut description = Vec::new();
    let mut tags: Vec<(String, String)> = Vec::new();

    for line in comment.lines() {
        if let Some(tag) = line.strip_prefix('@') {
            let (title, value) = tag.split_once(char::is_whitespace).unwrap_or((tag, ""));
            tags.push((title.to_string(), value.trim().to_string()));
        } else if let Some((_, value)) = tags.last_mut() {
            if !line.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
            }
        } else {
            description.push(line);
        }
    }

    let hint = next_line.as_deref().map(hint_from_code).unwrap_or_default();

    let mut name = hint.name;
    let mut kind = hint.kind;
    let mut memberof = hint.memberof;
    let mut scope = hint.scope;
    let mut access = None;
    let mut summary = None;
    let mut explicit_description = None;
    let mut augments = Vec::new();
    let mut mixes = Vec::new();
    let mut implements = Vec::new();
    let mut borrowed = Vec::new();
    let mut extra = Vec::new();

    for (title, value) in tags {
        let first_word = value.split_whitespace().next().map(str::to_string);
        match title.as_str() {
            "name" => name = first_word,
            "kind" => kind = first_word.as_deref().and_then(DocletKind::from_tag),
            "memberof" => memberof = first_word,
            "instance" => scope = Some(Scope::Instance),
            "static" => scope = Some(Scope::Static),
            "inner" => scope = Some(Scope::Inner),
            "global" => scope = Some(Scope::Global),
            "private" => access = Some(Access::Private),
            "protected" => access = Some(Access::Protected),
            "public" => access = Some(Access::Public),
            "access" => {
                access = match first_word.as_deref() {
                    Some("private") => Some(Access::Private),
                    Some("protected") => Some(Access::Protected),
                    Some("public") => Some(Access::Public),
                    _ => access,
                }
            }
            "summary" => summary = Some(value),
            "description" | "desc" => explicit_description = Some(value),
            "augments" | "extends" => augments.extend(first_word),
            "mixes" => mixes.extend(first_word),
            "implements" => implements.extend(first_word),
            "borrows" => match value.split_once(" as ") {
                Some((from, as_name)) => borrowed.push(Borrow {
                    from: from.trim().to_string(),
                    as_name: as_name.trim().to_string(),
                }),
                None => borrowed.push(Borrow {
                    from: value.clone(),
                    as_name: value.rsplit(&['.', '#', '~'][..]).next().unwrap_or(&value).to_string(),
                }),
            },
            other => match DocletKind::from_tag(other) {
                Some(k) => {
                    kind = Some(k);
                    if first_word.is_some() {
                        name = first_word;
                    }
                }
                None => extra.push(Tag {
                    title: other.to_string(),
                    value,
                }),
            },
        }
    }

    let name = name?;
    let mut doclet = Doclet::new(name, kind.unwrap_or(DocletKind::Member));

    let text = description.join("\n").trim().to_string();
    doclet.description = explicit_description.or((!text.is_empty()).then_some(text));
    doclet.undocumented = doclet.description.is_none() && extra.is_empty();
    doclet.summary = summary;
    doclet.access = access;
    doclet.augments = augments;
    doclet.mixes = mixes;
    doclet.implements = implements;
    doclet.borrowed = borrowed;
    doclet.tags = extra;

    match memberof {
        Some(parent) => doclet.set_member_of(&parent, scope.unwrap_or(Scope::Static)),
        None => doclet.scope = scope.or(Some(Scope::Global)),
    }

    Some(doclet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn parse(source: &str) -> DocletCollection {
        let mut parser = DocParser::new(None);
        parser.attach_standard_handlers();
        let mut docs = DocletCollection::new();
        parser.parse_source(Path::new("/src/shapes.js"), source, &mut docs);
        docs
    }

    #[test]
    fn extracts_blocks_with_line_numbers() {
        let blocks = comment_blocks("var a;\n/** First. */\nfunction a() {}\n\n/**\n * Second.\n */\nclass B {}\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].lineno, 2);
        assert_eq!(blocks[0].text, "First.");
        assert_eq!(blocks[1].lineno, 5);
        assert_eq!(blocks[1].next_line.as_deref(), Some("class B {}"));
    }

    #[test]
    fn names_come_from_code_when_no_tag_is_given() {
        let docs = parse("/** Make a shape. */\nfunction makeShape() {}\n/** A square. */\nclass Square {}\n");
        assert_eq!(docs.by_longname("makeShape")[0].kind, DocletKind::Function);
        assert_eq!(docs.by_longname("Square")[0].kind, DocletKind::Class);
    }

    #[test]
    fn prototype_assignments_are_instance_members() {
        let docs = parse("/** Area. */\nShape.prototype.area = function() {};\n");
        let area = docs.by_longname("Shape#area");
        assert_eq!(area.len(), 1);
        assert_eq!(area[0].scope, Some(Scope::Instance));
        assert_eq!(area[0].kind, DocletKind::Function);
    }

    #[test]
    fn relationship_tags_are_recorded() {
        let docs = parse(
            "/**\n * A square.\n * @class\n * @augments Shape\n * @mixes Colorful\n * @borrows trim as clean\n */\nfunction Square() {}\n",
        );
        let square = &docs.by_longname("Square")[0];
        assert_eq!(square.kind, DocletKind::Class);
        assert_eq!(square.augments, vec!["Shape".to_string()]);
        assert_eq!(square.mixes, vec!["Colorful".to_string()]);
        assert_eq!(square.borrowed[0].as_name, "clean");
    }

    #[test]
    fn unknown_tags_are_kept() {
        let docs = parse("/**\n * @name thing\n * @source shapes.js 12\n */\n");
        assert_eq!(docs.by_longname("thing")[0].tag("source").map(|t| t.value.as_str()), Some("shapes.js 12"));
    }

    #[test]
    fn later_handler_replaces_earlier_one() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut parser = DocParser::new(None);
        parser.attach_standard_handlers();

        let first = Rc::clone(&seen);
        parser.on(EventKind::NewDoclet, Box::new(move |_: &mut ParserEvent<'_>| first.borrow_mut().push("first")));
        let second = Rc::clone(&seen);
        parser.on(EventKind::NewDoclet, Box::new(move |_: &mut ParserEvent<'_>| second.borrow_mut().push("second")));

        let mut docs = DocletCollection::new();
        parser.parse_source(Path::new("/src/a.js"), "/** A. */\nvar a = 1;\n", &mut docs);
        assert_eq!(*seen.borrow(), vec!["second"]);
    }

    #[test]
    fn new_doclet_handlers_can_edit_doclets() {
        let mut parser = DocParser::new(None);
        parser.attach_standard_handlers();
        parser.on(
            EventKind::NewDoclet,
            Box::new(|event: &mut ParserEvent<'_>| {
                if let ParserEvent::NewDoclet { doclet } = event {
                    doclet.access = Some(Access::Private);
                }
            }),
        );
        let mut docs = DocletCollection::new();
        parser.parse_source(Path::new("/src/a.js"), "/** A. */\nvar a = 1;\n", &mut docs);
        assert_eq!(docs.by_longname("a")[0].access, Some(Access::Private));
    }

    #[test]
    fn without_standard_handlers_no_doclets_are_made() {
        let mut parser = DocParser::new(None);
        let mut docs = DocletCollection::new();
        parser.parse_source(Path::new("/src/a.js"), "/** A. */\nvar a = 1;\n", &mut docs);
        assert!(docs.is_empty());
    }

    fn source_dir(names: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dw-parser-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            let stem = name.trim_end_matches(".js");
            std::fs::write(dir.join(name), format!("/** {stem}. */\nfunction {stem}() {{}}\n")).unwrap();
        }
        dir
    }

    #[test]
    fn files_added_at_parse_begin_are_parsed_and_kept() {
        let dir = source_dir(&["alpha.js", "beta.js"]);
        let extra = dir.join("beta.js");

        let mut parser = DocParser::new(None);
        parser.attach_standard_handlers();
        parser.on(
            EventKind::ParseBegin,
            Box::new(move |event: &mut ParserEvent<'_>| {
                if let ParserEvent::ParseBegin { source_files } = event {
                    source_files.push(extra.clone());
                }
            }),
        );

        let mut files = vec![dir.join("alpha.js")];
        let docs = parser.parse(&mut files, Encoding::Utf8, |_, _, _| {});

        assert_eq!(files, vec![dir.join("alpha.js"), dir.join("beta.js")]);
        assert_eq!(docs.by_longname("alpha").len(), 1);
        assert_eq!(docs.by_longname("beta").len(), 1);
    }

    #[test]
    fn stop_check_skips_remaining_files() {
        let dir = source_dir(&["one.js", "two.js", "three.js"]);
        let parsed = Rc::new(std::cell::Cell::new(0));

        let mut parser = DocParser::new(None);
        parser.attach_standard_handlers();
        let seen = Rc::clone(&parsed);
        parser.stop_when(move || seen.get() >= 1);

        let complete = Rc::new(std::cell::Cell::new(false));
        let flag = Rc::clone(&complete);
        parser.on(
            EventKind::ParseComplete,
            Box::new(move |_: &mut ParserEvent<'_>| flag.set(true)),
        );

        let mut files = vec![dir.join("one.js"), dir.join("two.js"), dir.join("three.js")];
        let counter = Rc::clone(&parsed);
        let docs = parser.parse(&mut files, Encoding::Utf8, |_, _, _| counter.set(counter.get() + 1));

        assert_eq!(parsed.get(), 1);
        assert_eq!(docs.by_longname("one").len(), 1);
        assert!(docs.by_longname("two").is_empty());
        assert!(!complete.get());
    }

    #[test]
    fn latin1_decoding_never_fails() {
        let text = Encoding::Latin1.decode(vec![0x63, 0x61, 0x66, 0xe9]).unwrap();
        assert_eq!(text, "café");
        assert!(Encoding::Utf8.decode(vec![0xe9]).is_err());
    }
}
