//! Doclet data model.
//!
//! A doclet describes one documented symbol. The collection owns every
//! doclet produced in a run plus a longname index that later stages use to
//! find inheritance and borrow targets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Longname prefix of the synthetic package doclet.
pub const PACKAGE_PREFIX: &str = "package:";

// ---------------------------------------------------------------------------
// Doclet
// ---------------------------------------------------------------------------

/// What kind of symbol a doclet documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocletKind {
    Class,
    Constant,
    Event,
    Function,
    Interface,
    Member,
    Mixin,
    Module,
    Namespace,
    Package,
    Typedef,
}

impl DocletKind {
    /// Parse a kind name as written in a comment tag.
    pub fn from_tag(name: &str) -> Option<Self> {
        Some(match name {
            "class" | "constructor" => Self::Class,
            "constant" | "const" => Self::Constant,
            "event" => Self::Event,
            "function" | "func" | "method" => Self::Function,
            "interface" => Self::Interface,
            "member" | "var" => Self::Member,
            "mixin" => Self::Mixin,
            "module" => Self::Module,
            "namespace" => Self::Namespace,
            "typedef" => Self::Typedef,
            _ => return None,
        })
    }
}

/// How a member relates to the symbol it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Inner,
    Instance,
    Static,
}

impl Scope {
    /// Separator placed between a parent longname and a member name.
    pub fn separator(self) -> &'static str {
        match self {
            Self::Instance => "#",
            Self::Inner => "~",
            Self::Static | Self::Global => ".",
        }
    }
}

/// Declared visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    Protected,
    Private,
}

/// An explicit `@borrows <from> as <as>` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrow {
    pub from: String,
    #[serde(rename = "as")]
    pub as_name: String,
}

/// A tag the parser kept without interpreting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// Where a doclet came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocletMeta {
    pub path: PathBuf,
    pub filename: String,
    pub lineno: usize,
}

/// One documented symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doclet {
    pub name: String,
    pub longname: String,
    pub kind: DocletKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memberof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub augments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub borrowed: Vec<Borrow>,

    /// Set on members copied from an ancestor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inherited: bool,
    /// Longname of the ancestor member this one was copied from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    /// Set on members copied from a mixin.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mixed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub undocumented: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DocletMeta>,

    /// Package doclet only: the documented files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
    /// Package doclet only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Doclet {
    /// Create a bare doclet whose longname equals its name.
    pub fn new(name: impl Into<String>, kind: DocletKind) -> Self {
        let name = name.into();
        Self {
            longname: name.clone(),
            name,
            kind,
            memberof: None,
            scope: None,
            access: None,
            description: None,
            summary: None,
            augments: Vec::new(),
            mixes: Vec::new(),
            implements: Vec::new(),
            borrowed: Vec::new(),
            inherited: false,
            inherits: None,
            mixed: false,
            undocumented: false,
            tags: Vec::new(),
            meta: None,
            files: Vec::new(),
            version: None,
        }
    }

    /// Make this doclet a member of `parent` with the given scope and
    /// recompute its longname.
    pub fn set_member_of(&mut self, parent: &str, scope: Scope) {
        self.memberof = Some(parent.to_string());
        self.scope = Some(scope);
        self.longname = format!("{parent}{}{}", scope.separator(), self.name);
    }

    /// Build the package doclet from optional package metadata.
    pub fn package(metadata: Option<&serde_json::Value>, files: &[PathBuf]) -> Self {
        let field = |key: &str| {
            metadata
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let name = field("name").unwrap_or_default();
        let mut doclet = Doclet::new(name.clone(), DocletKind::Package);
        doclet.longname = format!("{PACKAGE_PREFIX}{}", if name.is_empty() { "undefined" } else { name.as_str() });
        doclet.description = field("description");
        doclet.version = field("version");
        doclet.files = files.to_vec();
        doclet
    }

    /// First tag with the given title, if any.
    pub fn tag(&self, title: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.title == title)
    }

    /// Path of the file the doclet was parsed from, if known.
    pub fn source_path(&self) -> Option<&Path> {
        self.meta.as_ref().map(|m| m.path.as_path())
    }
}

// ---------------------------------------------------------------------------
// DocletCollection
// ---------------------------------------------------------------------------

/// All doclets of a run, in creation order, with a longname index.
///
/// The index is rebuilt by [`DocletCollection::reindex`] and kept current by
/// [`DocletCollection::push`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct DocletCollection {
    doclets: Vec<Doclet>,
    #[serde(skip)]
    index: HashMap<String, Vec<usize>>,
}

impl DocletCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a doclet, indexing it under its longname.
    pub fn push(&mut self, doclet: Doclet) {
        self.index
            .entry(doclet.longname.clone())
            .or_default()
            .push(self.doclets.len());
        self.doclets.push(doclet);
    }

    /// Rebuild the longname index from scratch.
    pub fn reindex(&mut self) {
        self.index.clear();
        for (i, doclet) in self.doclets.iter().enumerate() {
            self.index.entry(doclet.longname.clone()).or_default().push(i);
        }
    }

    /// Positions of every doclet with the given longname.
    pub fn positions(&self, longname: &str) -> &[usize] {
        self.index.get(longname).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every doclet with the given longname.
    pub fn by_longname(&self, longname: &str) -> Vec<&Doclet> {
        self.positions(longname).iter().map(|&i| &self.doclets[i]).collect()
    }

    /// Direct members of `parent`, in creation order.
    pub fn members_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Doclet> + 'a {
        self.doclets
            .iter()
            .filter(move |d| d.memberof.as_deref() == Some(parent))
    }

    pub fn len(&self) -> usize {
        self.doclets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doclets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Doclet> {
        self.doclets.iter()
    }

    pub fn as_slice(&self) -> &[Doclet] {
        &self.doclets
    }

    pub fn get(&self, i: usize) -> Option<&Doclet> {
        self.doclets.get(i)
    }

    /// Mutable access by position. Changing a longname requires
    /// [`DocletCollection::reindex`] afterwards.
    pub fn get_mut(&mut self, i: usize) -> Option<&mut Doclet> {
        self.doclets.get_mut(i)
    }
}

impl<'a> IntoIterator for &'a DocletCollection {
    type Item = &'a Doclet;
    type IntoIter = std::slice::Iter<'a, Doclet>;

    fn into_iter(self) -> Self::IntoIter {
        self.doclets.iter()
    }
}

impl FromIterator<Doclet> for DocletCollection {
    fn from_iter<I: IntoIterator<Item = Doclet>>(iter: I) -> Self {
        let mut collection = Self::new();
        for doclet in iter {
            collection.push(doclet);
        }
        collection
    }
}
