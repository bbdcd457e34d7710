//! Library entry point for hosts that want doclets without rendering.

use std::path::{Path, PathBuf};

use docweave_discovery::{SourceRequest, load_source_files};
use docweave_shared::{ConfigFile, DocletCollection, DocweaveError, Result, RunOptions};
use tracing::instrument;

use crate::extensions::{ExtensionCatalog, ResourceLocator};
use crate::pipeline::{ParseJob, post_process};
use crate::postprocess::StandardPostProcessor;

/// Parses sources with a caller-supplied configuration.
///
/// ```no_run
/// use docweave_core::session::Session;
/// use docweave_shared::{ConfigFile, RunOptions};
///
/// let options = RunOptions {
///     files: vec!["lib".into()],
///     ..RunOptions::default()
/// };
/// let mut session = Session::new("/work/project", ConfigFile::default(), options);
/// let json = session.dump_results()?;
/// # Ok::<(), docweave_shared::DocweaveError>(())
/// ```
#[derive(Debug)]
pub struct Session {
    working_dir: PathBuf,
    config: ConfigFile,
    options: RunOptions,
    catalog: ExtensionCatalog,
    installed_dir: Option<Option<PathBuf>>,
}

impl Session {
    /// `options` are used as given; they are not merged with defaults beyond
    /// the built-in ones.
    pub fn new(working_dir: impl Into<PathBuf>, config: ConfigFile, options: RunOptions) -> Self {
        Self {
            working_dir: working_dir.into(),
            options: RunOptions::merge(options, None),
            config,
            catalog: ExtensionCatalog::builtin(),
            installed_dir: None,
        }
    }

    pub fn with_catalog(mut self, catalog: ExtensionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Override the installed-extensions directory searched for plugins.
    pub fn with_installed_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.installed_dir = Some(dir);
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Discover, parse and post-process the configured sources.
    ///
    /// When the config has no `source` section the positional files are
    /// parsed as given.
    #[instrument(skip_all, fields(working_dir = %self.working_dir.display()))]
    pub fn parse_files(&mut self) -> Result<DocletCollection> {
        let request = SourceRequest {
            positional: &self.options.files,
            source: self.config.source.as_ref(),
            package: self.options.package.as_deref(),
            readme: self.options.readme.as_deref(),
            recurse: self.options.recurse,
            working_dir: &self.working_dir,
        };
        let set = load_source_files(&request)?;
        let mut files = if self.config.source.is_some() {
            set.files
        } else {
            set.candidates.iter().map(|p| self.working_dir.join(p)).collect()
        };

        let mut locator = ResourceLocator::new(&self.working_dir, &self.working_dir);
        if let Some(dir) = &self.installed_dir {
            locator = locator.with_installed_dir(dir.clone());
        }

        let job = ParseJob {
            config: &self.config,
            options: &self.options,
            package_metadata: set.package_metadata.as_ref(),
            locator: &locator,
            catalog: &self.catalog,
        };
        let mut parser = job.create_parser()?;
        let mut doclets = job.parse(&mut parser, &mut files, |_, _, _| {});
        post_process(&mut StandardPostProcessor, &mut parser, &mut doclets);
        Ok(doclets)
    }

    /// [`Session::parse_files`] rendered as pretty JSON.
    pub fn dump_results(&mut self) -> Result<String> {
        let doclets = self.parse_files()?;
        serde_json::to_string_pretty(&doclets)
            .map_err(|e| DocweaveError::Render(format!("cannot serialize doclets: {e}")))
    }
}
