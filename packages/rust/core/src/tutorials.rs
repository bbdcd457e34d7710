//! Tutorial loading and tree resolution.
//!
//! Tutorials are markdown or HTML files in one directory. JSON files next to
//! them set titles and nest tutorials under each other: `intro.json` applies
//! to the `intro` tutorial, any other JSON file maps tutorial names to their
//! settings.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use docweave_discovery::markdown_to_html;
use docweave_shared::{DocweaveError, Result, strip_json_comments};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Name of the synthetic root node.
pub const ROOT_NAME: &str = "";

/// One tutorial and the tutorials nested under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TutorialNode {
    pub name: String,
    pub title: String,
    /// Rendered HTML.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TutorialNode>,
}

impl TutorialNode {
    /// An empty root.
    pub fn root() -> Self {
        Self {
            name: ROOT_NAME.to_string(),
            title: String::new(),
            content: String::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first search by name.
    pub fn find(&self, name: &str) -> Option<&TutorialNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TutorialConfig {
    title: Option<String>,
    #[serde(default)]
    children: Option<Children>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Children {
    Names(Vec<String>),
    Nested(BTreeMap<String, TutorialConfig>),
}

#[derive(Debug, Clone)]
struct Tutorial {
    title: String,
    content: String,
    children: Vec<String>,
}

const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm", "xhtml", "xml"];

/// Collects tutorials and builds their tree.
#[derive(Debug, Default)]
pub struct TutorialResolver {
    tutorials: BTreeMap<String, Tutorial>,
    configs: Vec<(String, TutorialConfig)>,
    root: TutorialNode,
}

impl TutorialResolver {
    pub fn new() -> Self {
        Self {
            root: TutorialNode::root(),
            ..Self::default()
        }
    }

    /// Read every tutorial and config file in `dir`. `recurse` descends up to
    /// ten levels.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(&mut self, dir: &Path, recurse: bool) -> Result<()> {
        std::fs::read_dir(dir).map_err(|e| DocweaveError::io(dir, e))?;

        let mut config_files = Vec::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(if recurse { 10 } else { 1 })
            .sort_by_file_name();

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().map(|s| s.to_string_lossy().into_owned()),
                path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()),
            ) else {
                continue;
            };

            if ext == "json" {
                config_files.push((stem, path.to_path_buf()));
                continue;
            }
            if !CONTENT_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            let text = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;
            let content = if ext == "md" || ext == "markdown" {
                markdown_to_html(&text)
            } else {
                text
            };

            if self.tutorials.contains_key(&stem) {
                warn!(tutorial = %stem, "duplicate tutorial name, keeping the first");
                continue;
            }
            self.tutorials.insert(
                stem.clone(),
                Tutorial {
                    title: stem,
                    content,
                    children: Vec::new(),
                },
            );
        }

        for (stem, path) in config_files {
            let text = std::fs::read_to_string(&path).map_err(|e| DocweaveError::io(&path, e))?;
            let cleaned = strip_json_comments(&text);

            if self.tutorials.contains_key(&stem) {
                let config: TutorialConfig = serde_json::from_str(&cleaned).map_err(|e| {
                    DocweaveError::config(format!("invalid tutorial config {}: {e}", path.display()))
                })?;
                self.configs.push((stem, config));
            } else {
                let map: BTreeMap<String, TutorialConfig> = serde_json::from_str(&cleaned).map_err(|e| {
                    DocweaveError::config(format!("invalid tutorial config {}: {e}", path.display()))
                })?;
                self.configs.extend(map);
            }
        }

        debug!(tutorials = self.tutorials.len(), configs = self.configs.len(), "tutorials loaded");
        Ok(())
    }

    /// Apply configs and build the tree under [`TutorialResolver::root`].
    #[instrument(skip_all)]
    pub fn resolve(&mut self) {
        for (name, config) in std::mem::take(&mut self.configs) {
            self.apply_config(&name, config);
        }

        let mut parent_of: BTreeMap<String, String> = BTreeMap::new();
        for (name, tutorial) in &self.tutorials {
            for child in &tutorial.children {
                if !self.tutorials.contains_key(child) {
                    warn!(tutorial = %name, child = %child, "Missing child tutorial");
                    continue;
                }
                if let Some(existing) = parent_of.get(child) {
                    warn!(%child, parent = %existing, ignored = %name, "tutorial already has a parent");
                    continue;
                }
                parent_of.insert(child.clone(), name.clone());
            }
        }

        let mut visited = HashSet::new();
        let mut root = TutorialNode::root();

        for name in self.tutorials.keys().filter(|n| !parent_of.contains_key(*n)) {
            root.children.push(self.build_node(name, &parent_of, &mut visited));
        }

        // Tutorials only reachable through a cycle.
        let stranded: Vec<String> = self
            .tutorials
            .keys()
            .filter(|n| !visited.contains(*n))
            .cloned()
            .collect();
        for name in stranded {
            if visited.contains(&name) {
                continue;
            }
            warn!(tutorial = %name, "circular tutorial nesting, attaching to the root");
            root.children.push(self.build_node(&name, &parent_of, &mut visited));
        }

        self.root = root;
    }

    fn apply_config(&mut self, name: &str, config: TutorialConfig) {
        let Some(tutorial) = self.tutorials.get_mut(name) else {
            warn!(tutorial = %name, "config for unknown tutorial");
            return;
        };
        if let Some(title) = config.title {
            tutorial.title = title;
        }
        match config.children {
            Some(Children::Names(names)) => tutorial.children.extend(names),
            Some(Children::Nested(map)) => {
                tutorial.children.extend(map.keys().cloned());
                for (child, child_config) in map {
                    self.apply_config(&child, child_config);
                }
            }
            None => {}
        }
    }

    fn build_node(
        &self,
        name: &str,
        parent_of: &BTreeMap<String, String>,
        visited: &mut HashSet<String>,
    ) -> TutorialNode {
        visited.insert(name.to_string());
        let tutorial = &self.tutorials[name];

        let children = tutorial
            .children
            .iter()
            .filter(|c| parent_of.get(*c).map(String::as_str) == Some(name))
            .filter(|c| !visited.contains(*c))
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|c| self.build_node(&c, parent_of, visited))
            .collect();

        TutorialNode {
            name: name.to_string(),
            title: tutorial.title.clone(),
            content: tutorial.content.clone(),
            children,
        }
    }

    /// Root of the resolved tree.
    pub fn root(&self) -> &TutorialNode {
        &self.root
    }
}
