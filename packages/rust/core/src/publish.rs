//! Built-in templates.
//!
//! `templates/default` writes a static HTML site; `templates/haruki` writes
//! the doclet tree as a single JSON document for other tools to consume.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use docweave_shared::{
    Access, Doclet, DocletCollection, DocletKind, DocweaveError, Result, RunOptions,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::extensions::{ExtensionCatalog, Template};
use crate::tutorials::TutorialNode;

/// Register the built-in templates under their specifiers.
pub fn register_builtin(catalog: &mut ExtensionCatalog) {
    catalog.register_template("templates/default", || Box::new(DefaultTemplate));
    catalog.register_template("templates/haruki", || Box::new(HarukiTemplate));
}

fn destination(options: &RunOptions) -> PathBuf {
    options
        .destination
        .clone()
        .unwrap_or_else(|| PathBuf::from(docweave_shared::DEFAULT_DESTINATION))
}

/// Doclets a reader should see: documented, not private, not the package.
fn visible(doclet: &Doclet) -> bool {
    doclet.kind != DocletKind::Package
        && doclet.access != Some(Access::Private)
        && !(doclet.undocumented && doclet.description.is_none())
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Static HTML output: `index.html` plus one page per tutorial.
#[derive(Debug, Default)]
pub struct DefaultTemplate;

const SECTIONS: &[(DocletKind, &str)] = &[
    (DocletKind::Module, "Modules"),
    (DocletKind::Namespace, "Namespaces"),
    (DocletKind::Class, "Classes"),
    (DocletKind::Interface, "Interfaces"),
    (DocletKind::Mixin, "Mixins"),
    (DocletKind::Function, "Functions"),
    (DocletKind::Member, "Members"),
    (DocletKind::Constant, "Constants"),
    (DocletKind::Typedef, "Type Definitions"),
    (DocletKind::Event, "Events"),
];

impl Template for DefaultTemplate {
    #[instrument(skip_all, fields(doclets = doclets.len()))]
    fn publish(&self, doclets: &DocletCollection, options: &RunOptions, tutorials: &TutorialNode) -> Result<()> {
        let out = destination(options);
        std::fs::create_dir_all(&out).map_err(|e| DocweaveError::io(&out, e))?;

        let title = doclets
            .iter()
            .find(|d| d.kind == DocletKind::Package && !d.name.is_empty())
            .map(|d| match &d.version {
                Some(v) => format!("{} {v}", d.name),
                None => d.name.clone(),
            })
            .unwrap_or_else(|| "Home".to_string());

        let mut body = String::new();
        if let Some(readme) = &options.readme_html {
            let _ = writeln!(body, "<section class=\"readme\">{readme}</section>");
        }

        for (kind, heading) in SECTIONS {
            let top: Vec<&Doclet> = doclets
                .iter()
                .filter(|d| d.kind == *kind && d.memberof.is_none() && visible(d))
                .collect();
            if top.is_empty() {
                continue;
            }
            let _ = writeln!(body, "<h2>{heading}</h2>");
            for doclet in top {
                render_doclet(&mut body, doclets, doclet);
            }
        }

        if !tutorials.children.is_empty() {
            let _ = writeln!(body, "<h2>Tutorials</h2>");
            render_tutorial_index(&mut body, tutorials);
            write_tutorial_pages(&out, tutorials)?;
        }

        write_atomic(&out.join("index.html"), &page(&title, &body))?;
        info!(path = %out.display(), "HTML documentation written");
        Ok(())
    }
}

fn render_doclet(out: &mut String, all: &DocletCollection, doclet: &Doclet) {
    let _ = write!(
        out,
        "<article id=\"{id}\"><h3>{name}</h3>",
        id = html_escape(&doclet.longname),
        name = html_escape(&doclet.name)
    );
    if let Some(summary) = &doclet.summary {
        let _ = write!(out, "<p class=\"summary\">{}</p>", html_escape(summary));
    }
    if let Some(description) = &doclet.description {
        let _ = write!(out, "<p>{}</p>", html_escape(description));
    }
    if !doclet.augments.is_empty() {
        let _ = write!(out, "<p class=\"extends\">Extends {}</p>", html_escape(&doclet.augments.join(", ")));
    }

    let members: Vec<&Doclet> = all.members_of(&doclet.longname).filter(|m| visible(m)).collect();
    if !members.is_empty() {
        out.push_str("<ul class=\"members\">");
        for member in members {
            let mut flags = Vec::new();
            if member.inherited {
                flags.push("inherited");
            }
            if member.mixed {
                flags.push("mixed");
            }
            let _ = write!(
                out,
                "<li id=\"{id}\"><code>{longname}</code>",
                id = html_escape(&member.longname),
                longname = html_escape(&member.longname)
            );
            if !flags.is_empty() {
                let _ = write!(out, " <em>({})</em>", flags.join(", "));
            }
            if let Some(description) = &member.description {
                let _ = write!(out, " {}", html_escape(description));
            }
            out.push_str("</li>");
        }
        out.push_str("</ul>");
    }
    out.push_str("</article>\n");
}

fn render_tutorial_index(out: &mut String, node: &TutorialNode) {
    out.push_str("<ul class=\"tutorials\">");
    for child in &node.children {
        let _ = write!(
            out,
            "<li><a href=\"{href}\">{title}</a>",
            href = tutorial_file(&child.name),
            title = html_escape(&child.title)
        );
        if !child.children.is_empty() {
            render_tutorial_index(out, child);
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>\n");
}

fn write_tutorial_pages(out_dir: &Path, node: &TutorialNode) -> Result<()> {
    for child in &node.children {
        write_atomic(&out_dir.join(tutorial_file(&child.name)), &page(&child.title, &child.content))?;
        write_tutorial_pages(out_dir, child)?;
    }
    Ok(())
}

fn tutorial_file(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("tutorial-{safe}.html")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = html_escape(title)
    )
}

/// Escape HTML special characters for safe embedding in HTML documents.
fn html_escape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Machine-readable output: `doclets.json` with members nested under their
/// parents.
#[derive(Debug, Default)]
pub struct HarukiTemplate;

#[derive(Debug, Serialize)]
struct HarukiNode<'a> {
    name: &'a str,
    longname: &'a str,
    kind: DocletKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access: Option<Access>,
    #[serde(skip_serializing_if = "is_empty")]
    extends: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    inherited: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<HarukiNode<'a>>,
}

#[derive(Debug, Serialize)]
struct HarukiDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<&'a Doclet>,
    symbols: Vec<HarukiNode<'a>>,
    #[serde(skip_serializing_if = "is_empty")]
    tutorials: &'a [TutorialNode],
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

fn haruki_node<'a>(all: &'a DocletCollection, doclet: &'a Doclet, depth: usize) -> HarukiNode<'a> {
    let members = if depth < 16 {
        all.members_of(&doclet.longname)
            .filter(|m| m.access != Some(Access::Private))
            .map(|m| haruki_node(all, m, depth + 1))
            .collect()
    } else {
        Vec::new()
    };

    HarukiNode {
        name: &doclet.name,
        longname: &doclet.longname,
        kind: doclet.kind,
        description: doclet.description.as_deref(),
        access: doclet.access,
        extends: &doclet.augments,
        inherited: doclet.inherited,
        members,
    }
}

impl Template for HarukiTemplate {
    #[instrument(skip_all, fields(doclets = doclets.len()))]
    fn publish(&self, doclets: &DocletCollection, options: &RunOptions, tutorials: &TutorialNode) -> Result<()> {
        let out = destination(options);
        std::fs::create_dir_all(&out).map_err(|e| DocweaveError::io(&out, e))?;

        let document = HarukiDocument {
            package: doclets.iter().find(|d| d.kind == DocletKind::Package),
            symbols: doclets
                .iter()
                .filter(|d| d.kind != DocletKind::Package && d.memberof.is_none())
                .filter(|d| d.access != Some(Access::Private))
                .map(|d| haruki_node(doclets, d, 0))
                .collect(),
            tutorials: &tutorials.children,
        };

        write_json(&out.join("doclets.json"), &document)?;
        info!(path = %out.display(), "JSON documentation written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write through a temp file and rename into place.
fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| DocweaveError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| DocweaveError::io(target, e))?;

    debug!(file = %target.display(), size = content.len(), "wrote output file");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| DocweaveError::Render(format!("cannot serialize {}: {e}", path.display())))?;
    write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docweave_shared::Scope;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dw-publish-test-{}", uuid::Uuid::now_v7()))
    }

    fn sample() -> DocletCollection {
        let mut shape = Doclet::new("Shape", DocletKind::Class);
        shape.description = Some("A <shape>.".into());
        let mut area = Doclet::new("area", DocletKind::Function);
        area.description = Some("Area.".into());
        area.set_member_of("Shape", Scope::Instance);
        let mut secret = Doclet::new("_secret", DocletKind::Member);
        secret.description = Some("Hidden.".into());
        secret.access = Some(Access::Private);
        let package = Doclet::package(Some(&serde_json::json!({ "name": "shapes", "version": "1.0.0" })), &[]);
        [shape, area, secret, package].into_iter().collect()
    }

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            destination: Some(dir.to_path_buf()),
            readme_html: Some("<p>Readme body</p>".into()),
            ..RunOptions::default()
        }
    }

    #[test]
    fn default_template_writes_index() {
        let dir = temp_dir();
        DefaultTemplate.publish(&sample(), &options(&dir), &TutorialNode::root()).unwrap();

        let html = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(html.contains("<title>shapes 1.0.0</title>"));
        assert!(html.contains("<p>Readme body</p>"));
        assert!(html.contains("A &lt;shape&gt;."));
        assert!(html.contains("Shape#area"));
        assert!(!html.contains("_secret"));
    }

    #[test]
    fn default_template_writes_tutorial_pages() {
        let dir = temp_dir();
        let mut root = TutorialNode::root();
        root.children.push(TutorialNode {
            name: "intro".into(),
            title: "Intro".into(),
            content: "<p>Welcome</p>".into(),
            children: Vec::new(),
        });
        DefaultTemplate.publish(&sample(), &options(&dir), &root).unwrap();

        let page = std::fs::read_to_string(dir.join("tutorial-intro.html")).unwrap();
        assert!(page.contains("<p>Welcome</p>"));
    }

    #[test]
    fn haruki_nests_members() {
        let dir = temp_dir();
        HarukiTemplate.publish(&sample(), &options(&dir), &TutorialNode::root()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("doclets.json")).unwrap()).unwrap();
        assert_eq!(json["package"]["name"], "shapes");
        assert_eq!(json["symbols"][0]["name"], "Shape");
        assert_eq!(json["symbols"][0]["members"][0]["longname"], "Shape#area");
        assert_eq!(json["symbols"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
