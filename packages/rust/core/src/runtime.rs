//! Environment bootstrap and the per-run state.
//!
//! docweave runs either standalone (the `docweave` binary) or embedded in a
//! host that exports its own module location through
//! [`EMBED_MODULE_VAR`]. Each host derives the installation root and working
//! directory differently; after [`initialize`] nothing downstream cares which
//! one is active.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use docweave_shared::{ConfigFile, DocweaveError, Result, RunOptions};
use tracing::debug;
use url::Url;

/// Environment variable an embedding host sets to the `file://` URI of its
/// own module.
pub const EMBED_MODULE_VAR: &str = "DOCWEAVE_HOST_MODULE";

/// Program name used when re-parsing raw arguments.
const PROGRAM_NAME: &str = "docweave";

// ---------------------------------------------------------------------------
// Host detection
// ---------------------------------------------------------------------------

/// Which host is executing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Hosted inside another program that exports its module URI.
    Embedded,
    /// The `docweave` binary.
    Standalone,
}

/// What the process exposes about its host, captured once.
#[derive(Debug, Clone, Default)]
pub struct HostSignals {
    /// Value of [`EMBED_MODULE_VAR`].
    pub embed_module_uri: Option<String>,
    /// Value of `PWD`.
    pub pwd: Option<PathBuf>,
    /// Path of the running executable.
    pub current_exe: Option<PathBuf>,
    /// Process current directory.
    pub current_dir: Option<PathBuf>,
    /// Full argv, program name first.
    pub args: Vec<String>,
}

impl HostSignals {
    /// Capture signals from the running process.
    pub fn from_process() -> Self {
        Self {
            embed_module_uri: std::env::var(EMBED_MODULE_VAR).ok().filter(|v| !v.is_empty()),
            pwd: std::env::var_os("PWD").map(PathBuf::from),
            current_exe: std::env::current_exe().ok(),
            current_dir: std::env::current_dir().ok(),
            args: std::env::args().collect(),
        }
    }

    /// Probe the signals for a known host.
    pub fn detect(&self) -> Result<HostKind> {
        if self.embed_module_uri.is_some() {
            Ok(HostKind::Embedded)
        } else if self.current_exe.is_some() {
            Ok(HostKind::Standalone)
        } else {
            Err(DocweaveError::UnknownEnvironment)
        }
    }
}

/// Roots derived by a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoots {
    pub root_dir: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
}

impl HostKind {
    /// Derive root directory, working directory and arguments for this host.
    pub fn resolve_roots(self, signals: &HostSignals) -> Result<HostRoots> {
        match self {
            Self::Embedded => resolve_embedded(signals),
            Self::Standalone => resolve_standalone(signals),
        }
    }
}

fn resolve_embedded(signals: &HostSignals) -> Result<HostRoots> {
    let uri = signals
        .embed_module_uri
        .as_deref()
        .ok_or(DocweaveError::UnknownEnvironment)?;

    let module_path = Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| DocweaveError::config(format!("{EMBED_MODULE_VAR} is not a file URI: {uri}")))?;

    let root_dir = module_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(module_path);

    let working_dir = signals
        .pwd
        .clone()
        .or_else(|| signals.current_dir.clone())
        .unwrap_or_else(|| root_dir.clone());

    Ok(HostRoots {
        root_dir,
        working_dir,
        args: signals.args.iter().skip(1).cloned().collect(),
    })
}

fn resolve_standalone(signals: &HostSignals) -> Result<HostRoots> {
    let exe = signals
        .current_exe
        .as_deref()
        .ok_or(DocweaveError::UnknownEnvironment)?;

    let exe = resolve_symlink_once(exe);
    let root_dir = exe.parent().map(Path::to_path_buf).unwrap_or_else(|| exe.clone());

    let working_dir = match &signals.current_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|e| DocweaveError::io(".", e))?,
    };

    Ok(HostRoots {
        root_dir,
        working_dir,
        args: signals.args.iter().skip(1).cloned().collect(),
    })
}

/// Follow one level of symbolic link, relative links resolved against the
/// link's own directory.
fn resolve_symlink_once(path: &Path) -> PathBuf {
    let is_link = std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);

    if !is_link {
        return path.to_path_buf();
    }

    match std::fs::read_link(path) {
        Ok(target) => path
            .parent()
            .map(|dir| dir.join(&target))
            .unwrap_or(target),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Everything a run knows, threaded through each stage.
#[derive(Debug, Clone)]
pub struct RunState {
    pub host: HostKind,
    /// Installation root; never changes after bootstrap.
    pub root_dir: PathBuf,
    pub working_dir: PathBuf,
    /// Command-line tokens without the program name.
    pub raw_args: Vec<String>,
    pub options: RunOptions,
    pub config: ConfigFile,
    /// Written once by source discovery.
    pub source_files: Vec<PathBuf>,
    pub package_metadata: Option<serde_json::Value>,
    pub readme_html: Option<String>,
}

impl RunState {
    /// Fresh state for an already-resolved host.
    pub fn new(host: HostKind, roots: HostRoots) -> Self {
        Self {
            host,
            root_dir: roots.root_dir,
            working_dir: roots.working_dir,
            raw_args: roots.args,
            options: RunOptions::default(),
            config: ConfigFile::default(),
            source_files: Vec::new(),
            package_metadata: None,
            readme_html: None,
        }
    }

    /// Parse `raw_args` into `options`.
    ///
    /// Positional files already present in `options` stay ahead of the ones
    /// parsed from the arguments.
    pub fn parse_options(&mut self) -> Result<&RunOptions> {
        let argv = std::iter::once(OsString::from(PROGRAM_NAME))
            .chain(self.raw_args.iter().map(OsString::from));

        let parsed = CliArgs::try_parse_from(argv)
            .map_err(|e| DocweaveError::option_parse(e.to_string().trim_end()))?;

        let mut files = std::mem::take(&mut self.options.files);
        let mut options = parsed.into_options();
        files.append(&mut options.files);
        options.files = files;

        self.options = options;
        Ok(&self.options)
    }
}

/// Detect the host and build the run state. Call once per process.
pub fn initialize(signals: &HostSignals) -> Result<RunState> {
    let host = signals.detect()?;
    let roots = host.resolve_roots(signals)?;

    debug!(
        ?host,
        root_dir = %roots.root_dir.display(),
        working_dir = %roots.working_dir.display(),
        "environment initialized"
    );

    Ok(RunState::new(host, roots))
}

// ---------------------------------------------------------------------------
// Flag schema
// ---------------------------------------------------------------------------

/// docweave: generate reference documentation from annotated sources.
#[derive(Debug, Parser)]
#[command(
    name = "docweave",
    about = "Generate reference documentation from annotated source files.",
    override_usage = "docweave [OPTIONS] <FILES>...",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct CliArgs {
    /// Files or directories to document.
    pub files: Vec<PathBuf>,

    /// The path to the configuration file. Default: <root>/conf.json
    #[arg(short = 'c', long)]
    pub configure: Option<PathBuf>,

    /// The path to the output folder. Default: ./out/
    #[arg(short = 'd', long)]
    pub destination: Option<PathBuf>,

    /// Assume this encoding when reading all source files. Default: utf8
    #[arg(short = 'e', long)]
    pub encoding: Option<String>,

    /// Log information for debugging.
    #[arg(long)]
    pub debug: bool,

    /// Log detailed information to the console.
    #[arg(long)]
    pub verbose: bool,

    /// Treat errors as fatal errors, and treat warnings as errors.
    #[arg(long)]
    pub pedantic: bool,

    /// Print this message and quit.
    #[arg(short = 'h', long)]
    pub help: bool,

    /// Check the configuration, plugins and template, then quit.
    #[arg(short = 'T', long)]
    pub test: bool,

    /// Display the version number and quit.
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Dump all found doclet internals to the console and quit.
    #[arg(short = 'X', long)]
    pub explain: bool,

    /// Directory in which to find tutorials.
    #[arg(short = 'u', long)]
    pub tutorials: Option<PathBuf>,

    /// The template to use. Default: templates/default
    #[arg(short = 't', long)]
    pub template: Option<String>,

    /// The path to the package metadata file. Default: first package.json among the inputs
    #[arg(short = 'P', long)]
    pub package: Option<PathBuf>,

    /// The path to the readme file. Default: first README.md among the inputs
    #[arg(short = 'R', long)]
    pub readme: Option<PathBuf>,

    /// Recurse into subdirectories when scanning for source files.
    #[arg(short = 'r', long)]
    pub recurse: bool,

    /// When running self-checks, only run those whose name matches this regex.
    #[arg(short = 'm', long = "match")]
    pub match_patterns: Vec<String>,

    /// Disable colored log output.
    #[arg(long)]
    pub nocolor: bool,
}

impl CliArgs {
    /// Convert to the CLI tier of the option merge.
    pub fn into_options(self) -> RunOptions {
        RunOptions {
            files: self.files,
            configure: self.configure,
            destination: self.destination,
            encoding: self.encoding,
            debug: self.debug,
            verbose: self.verbose,
            pedantic: self.pedantic,
            help: self.help,
            test: self.test,
            version: self.version,
            explain: self.explain,
            recurse: self.recurse,
            nocolor: self.nocolor,
            tutorials: self.tutorials,
            template: self.template,
            package: self.package,
            readme: self.readme,
            match_patterns: (!self.match_patterns.is_empty()).then_some(self.match_patterns),
            ..RunOptions::default()
        }
    }
}

/// Rendered usage text.
pub fn help_text() -> String {
    CliArgs::command().render_help().to_string()
}
