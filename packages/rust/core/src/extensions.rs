//! Plugin and template resolution.
//!
//! A specifier such as `plugins/underscore` or `templates/default` is looked
//! up as a directory under the working directory, the installed-extensions
//! directory and the installation root, in that order. An on-disk extension
//! names its implementation in a small TOML manifest; the implementation
//! itself always comes from the [`ExtensionCatalog`]. Specifiers with no
//! directory on disk fall back to a catalog entry of the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use docweave_shared::{DocletCollection, DocweaveError, Result, RunOptions};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use crate::parser::{DocParser, EventKind, Handler};
use crate::tutorials::TutorialNode;

/// Name of the manifest a template directory must contain.
pub const TEMPLATE_MANIFEST: &str = "publish.toml";

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// A parser extension.
pub trait Plugin {
    /// Event handlers to register, in order.
    fn handlers(&self) -> Vec<(EventKind, Handler)> {
        Vec::new()
    }

    /// Direct access to the parser, called after the handlers are registered.
    fn install(&self, _parser: &mut DocParser) {}
}

/// An output generator.
pub trait Template {
    fn publish(
        &self,
        doclets: &DocletCollection,
        options: &RunOptions,
        tutorials: &TutorialNode,
    ) -> Result<()>;
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin>>;
type TemplateFactory = Box<dyn Fn() -> Box<dyn Template>>;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Compiled-in plugin and template implementations, by name.
#[derive(Default)]
pub struct ExtensionCatalog {
    plugins: BTreeMap<String, PluginFactory>,
    templates: BTreeMap<String, TemplateFactory>,
}

impl fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionCatalog")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtensionCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shipped with docweave.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        crate::plugins::register_builtin(&mut catalog);
        crate::publish::register_builtin(&mut catalog);
        catalog
    }

    pub fn register_plugin<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + 'static,
    {
        self.plugins.insert(name.into(), Box::new(factory));
    }

    pub fn register_template<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Template> + 'static,
    {
        self.templates.insert(name.into(), Box::new(factory));
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Instantiate the named plugin.
    pub fn plugin(&self, name: &str) -> Option<Box<dyn Plugin>> {
        self.plugins.get(name).map(|make| make())
    }

    /// Instantiate the named template.
    pub fn template(&self, name: &str) -> Option<Box<dyn Template>> {
        self.templates.get(name).map(|make| make())
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// Where a specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    /// A directory on disk.
    Directory(PathBuf),
    /// A catalog entry with no directory on disk.
    BuiltIn(String),
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "{}", dir.display()),
            Self::BuiltIn(name) => write!(f, "{name} (built-in)"),
        }
    }
}

/// Searches the resource roots for extension directories.
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    working_dir: PathBuf,
    installed_dir: Option<PathBuf>,
    root_dir: PathBuf,
}

impl ResourceLocator {
    /// Locator over the working directory, the user's installed-extensions
    /// directory and the installation root.
    pub fn new(working_dir: impl Into<PathBuf>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            installed_dir: dirs::data_dir().map(|d| d.join("docweave").join("extensions")),
            root_dir: root_dir.into(),
        }
    }

    /// Replace the installed-extensions directory.
    pub fn with_installed_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.installed_dir = dir;
        self
    }

    /// First existing directory for `specifier`.
    pub fn find_dir(&self, specifier: &str) -> Option<PathBuf> {
        let spec = Path::new(specifier);
        if spec.is_absolute() {
            return is_readable_dir(spec).then(|| spec.to_path_buf());
        }

        [Some(&self.working_dir), self.installed_dir.as_ref(), Some(&self.root_dir)]
            .into_iter()
            .flatten()
            .map(|base| base.join(spec))
            .find(|candidate| is_readable_dir(candidate))
    }
}

fn is_readable_dir(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok()
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

/// A plugin specifier with a known location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlugin {
    pub specifier: String,
    pub basename: String,
    pub location: ResourceLocation,
}

/// A plugin ready to install.
pub struct LoadedPlugin {
    pub specifier: String,
    pub plugin: Box<dyn Plugin>,
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin").field("specifier", &self.specifier).finish()
    }
}

#[derive(Debug, Deserialize)]
struct PluginManifest {
    entry: String,
}

/// Resolve one plugin specifier, or `None` when nothing matches.
pub fn resolve_plugin(
    specifier: &str,
    locator: &ResourceLocator,
    catalog: &ExtensionCatalog,
) -> Option<ResolvedPlugin> {
    let spec = Path::new(specifier);
    let basename = spec.file_name()?.to_string_lossy().into_owned();
    let dirname = spec
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());

    let location = match locator.find_dir(&dirname) {
        Some(dir) if dir.join(format!("{basename}.toml")).is_file() => ResourceLocation::Directory(dir),
        found => {
            if catalog.has_plugin(specifier) {
                ResourceLocation::BuiltIn(specifier.to_string())
            } else {
                ResourceLocation::Directory(found?)
            }
        }
    };

    Some(ResolvedPlugin {
        specifier: specifier.to_string(),
        basename,
        location,
    })
}

/// Resolve every specifier in order. Unresolvable ones are logged and
/// dropped.
#[instrument(skip_all, fields(plugins = specifiers.len()))]
pub fn resolve_plugins(
    specifiers: &[String],
    locator: &ResourceLocator,
    catalog: &ExtensionCatalog,
) -> Vec<ResolvedPlugin> {
    specifiers
        .iter()
        .filter_map(|spec| {
            let resolved = resolve_plugin(spec, locator, catalog);
            if resolved.is_none() {
                error!("Unable to find the plugin \"{spec}\"");
            }
            resolved
        })
        .collect()
}

/// Instantiate a resolved plugin.
pub fn load_plugin(resolved: &ResolvedPlugin, catalog: &ExtensionCatalog) -> Result<LoadedPlugin> {
    let load_err = |message: String| DocweaveError::PluginLoad {
        plugin: resolved.specifier.clone(),
        message,
    };

    let entry = match &resolved.location {
        ResourceLocation::BuiltIn(name) => name.clone(),
        ResourceLocation::Directory(dir) => {
            let manifest_path = dir.join(format!("{}.toml", resolved.basename));
            let text = std::fs::read_to_string(&manifest_path)
                .map_err(|e| load_err(format!("cannot read {}: {e}", manifest_path.display())))?;
            let manifest: PluginManifest = toml::from_str(&text)
                .map_err(|e| load_err(format!("invalid manifest {}: {e}", manifest_path.display())))?;
            manifest.entry
        }
    };

    let plugin = catalog
        .plugin(&entry)
        .ok_or_else(|| load_err(format!("no plugin implementation named \"{entry}\"")))?;

    debug!(plugin = %resolved.specifier, %entry, "plugin loaded");
    Ok(LoadedPlugin {
        specifier: resolved.specifier.clone(),
        plugin,
    })
}

/// Load every resolved plugin, stopping at the first failure.
pub fn load_plugins(resolved: &[ResolvedPlugin], catalog: &ExtensionCatalog) -> Result<Vec<LoadedPlugin>> {
    resolved.iter().map(|r| load_plugin(r, catalog)).collect()
}

/// Register each plugin's handlers, then run its install hook.
pub fn install_plugins(parser: &mut DocParser, plugins: &[LoadedPlugin]) {
    for loaded in plugins {
        for (kind, handler) in loaded.plugin.handlers() {
            parser.on(kind, handler);
        }
        loaded.plugin.install(parser);
        debug!(plugin = %loaded.specifier, "plugin installed");
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// A template ready to publish.
pub struct LoadedTemplate {
    pub location: ResourceLocation,
    pub template: Box<dyn Template>,
}

impl fmt::Debug for LoadedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedTemplate").field("location", &self.location).finish()
    }
}

#[derive(Debug, Deserialize)]
struct TemplateManifest {
    publish: Option<String>,
}

/// Resolve a template specifier.
///
/// An unresolvable specifier comes back as a directory named by the
/// specifier itself, so the load error names what the user asked for.
pub fn resolve_template(
    specifier: &str,
    locator: &ResourceLocator,
    catalog: &ExtensionCatalog,
) -> ResourceLocation {
    match locator.find_dir(specifier) {
        Some(dir) if dir.join(TEMPLATE_MANIFEST).is_file() => ResourceLocation::Directory(dir),
        found => {
            if catalog.has_template(specifier) {
                ResourceLocation::BuiltIn(specifier.to_string())
            } else {
                ResourceLocation::Directory(found.unwrap_or_else(|| PathBuf::from(specifier)))
            }
        }
    }
}

/// Instantiate the template at `location`.
pub fn load_template(location: &ResourceLocation, catalog: &ExtensionCatalog) -> Result<LoadedTemplate> {
    let name = match location {
        ResourceLocation::BuiltIn(name) => name.clone(),
        ResourceLocation::Directory(dir) => {
            let manifest_path = dir.join(TEMPLATE_MANIFEST);
            let text = std::fs::read_to_string(&manifest_path).map_err(|e| DocweaveError::TemplateLoad {
                template: dir.display().to_string(),
                message: format!("cannot read {TEMPLATE_MANIFEST}: {e}"),
            })?;
            let manifest: TemplateManifest = toml::from_str(&text).map_err(|e| DocweaveError::TemplateLoad {
                template: dir.display().to_string(),
                message: format!("invalid {TEMPLATE_MANIFEST}: {e}"),
            })?;
            manifest.publish.ok_or_else(|| DocweaveError::TemplateMissingPublish {
                template: dir.display().to_string(),
            })?
        }
    };

    let template = catalog
        .template(&name)
        .ok_or_else(|| DocweaveError::TemplateMissingPublish {
            template: location.to_string(),
        })?;

    debug!(template = %location, %name, "template loaded");
    Ok(LoadedTemplate {
        location: location.clone(),
        template,
    })
}
