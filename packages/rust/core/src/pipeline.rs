//! End-to-end run: configure → discover → parse → post-process → dump or render.

use std::io::Write;
use std::path::{Path, PathBuf};

use docweave_discovery::{SourceRequest, load_source_files};
use docweave_shared::{
    ConfigFile, ConfigSource, Doclet, DocletCollection, DocweaveError, Result, RunOptions, load_config,
    resolve_config_path,
};
use regex::Regex;
use tracing::{debug, info, info_span, instrument};
use uuid::Uuid;

use crate::extensions::{
    ExtensionCatalog, ResourceLocator, install_plugins, load_plugin, load_plugins, load_template,
    resolve_plugin, resolve_plugins, resolve_template,
};
use crate::parser::{DocParser, Encoding};
use crate::postprocess::{PostProcessor, StandardPostProcessor};
use crate::reporter::{LogControl, LogSettings, RunReporter};
use crate::runtime::{RunState, help_text};
use crate::tutorials::TutorialResolver;

/// Version line printed by `--version` and at the top of the help text.
pub fn version_line() -> String {
    format!("docweave {}", env!("CARGO_PKG_VERSION"))
}

// ---------------------------------------------------------------------------
// Stages and progress
// ---------------------------------------------------------------------------

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Configuring,
    HelpPrinted,
    Parsing,
    Postprocessing,
    Dumped,
    Rendering,
    Done,
    Failed,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each source file is parsed.
    fn file_parsed(&self, path: &Path, current: usize, total: usize);
    /// Called when the doclets are final.
    fn done(&self, doclets: &DocletCollection);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_parsed(&self, _path: &Path, _current: usize, _total: usize) {}
    fn done(&self, _doclets: &DocletCollection) {}
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
    /// Final doclets, when parsing happened.
    pub doclets: Option<DocletCollection>,
    pub exit_code: u8,
    /// The fatal error that ended the run, if any.
    pub error: Option<DocweaveError>,
}

struct CommandResult {
    exit_code: u8,
    doclets: Option<DocletCollection>,
}

impl CommandResult {
    fn exit(exit_code: u8) -> Self {
        Self {
            exit_code,
            doclets: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared parse sequence
// ---------------------------------------------------------------------------

/// Inputs to the parse and post-process sequence.
pub(crate) struct ParseJob<'a> {
    pub config: &'a ConfigFile,
    pub options: &'a RunOptions,
    pub package_metadata: Option<&'a serde_json::Value>,
    pub locator: &'a ResourceLocator,
    pub catalog: &'a ExtensionCatalog,
}

impl ParseJob<'_> {
    /// Create the parser, install configured plugins and attach the standard
    /// handlers.
    pub fn create_parser(&self) -> Result<DocParser> {
        let mut parser = DocParser::new(self.config.parser.clone());

        if let Some(specifiers) = &self.config.plugins {
            let resolved = resolve_plugins(specifiers, self.locator, self.catalog);
            let plugins = load_plugins(&resolved, self.catalog)?;
            install_plugins(&mut parser, &plugins);
        }

        parser.attach_standard_handlers();
        Ok(parser)
    }

    /// Parse the sources and append the package doclet. `source_files` ends
    /// up holding the list as edited by `parseBegin` handlers.
    pub fn parse(
        &self,
        parser: &mut DocParser,
        source_files: &mut Vec<PathBuf>,
        on_file: impl FnMut(&Path, usize, usize),
    ) -> DocletCollection {
        let encoding = Encoding::from_name(self.options.encoding_name());
        let mut doclets = parser.parse(source_files, encoding, on_file);
        doclets.push(Doclet::package(self.package_metadata, source_files));
        doclets
    }
}

/// Index, augment, resolve borrows, then notify listeners.
pub(crate) fn post_process(post: &mut dyn PostProcessor, parser: &mut DocParser, doclets: &mut DocletCollection) {
    debug!("Indexing doclets...");
    post.index(doclets);
    debug!("Adding inherited symbols, mixins, and interface implementations...");
    post.augment(doclets);
    debug!("Adding borrowed doclets...");
    post.resolve_borrows(doclets);
    debug!("Post-processing complete.");
    parser.fire_processing_complete(doclets);
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One command-line run over an initialized [`RunState`].
pub struct Pipeline<'a> {
    state: RunState,
    reporter: RunReporter,
    catalog: ExtensionCatalog,
    installed_dir: Option<Option<PathBuf>>,
    post: Box<dyn PostProcessor + 'a>,
    progress: &'a dyn ProgressReporter,
    log: &'a mut dyn LogControl,
    out: &'a mut dyn Write,
    config_source: Option<ConfigSource>,
    stages: Vec<Stage>,
}

impl<'a> Pipeline<'a> {
    /// A pipeline with the built-in catalog and post-processor. Help, dumps
    /// and version output go to `out`.
    pub fn new(
        state: RunState,
        progress: &'a dyn ProgressReporter,
        log: &'a mut dyn LogControl,
        out: &'a mut dyn Write,
    ) -> Self {
        Self {
            state,
            reporter: RunReporter::new(),
            catalog: ExtensionCatalog::builtin(),
            installed_dir: None,
            post: Box::new(StandardPostProcessor),
            progress,
            log,
            out,
            config_source: None,
            stages: vec![Stage::Idle],
        }
    }

    /// Use `reporter`, for callers that already wired its gate into a
    /// subscriber.
    pub fn with_reporter(mut self, reporter: RunReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_catalog(mut self, catalog: ExtensionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_post_processor(mut self, post: impl PostProcessor + 'a) -> Self {
        self.post = Box::new(post);
        self
    }

    /// Override the installed-extensions directory searched for plugins and
    /// templates.
    pub fn with_installed_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.installed_dir = Some(dir);
        self
    }

    /// The reporter tracking this run.
    pub fn reporter(&self) -> &RunReporter {
        &self.reporter
    }

    /// Run to completion.
    pub fn run(mut self) -> RunOutcome {
        let run_id = Uuid::now_v7();
        let span = info_span!("run", %run_id);
        let _guard = span.enter();

        let result = self.run_command();

        let (exit_code, doclets, error) = match result {
            Ok(command) => {
                self.transition(Stage::Done);
                let code = command.exit_code.max(self.reporter.exit_code(&Ok(())));
                (code, command.doclets, None)
            }
            Err(e) => {
                self.transition(Stage::Failed);
                (1, None, Some(e))
            }
        };

        RunOutcome {
            stages: self.stages,
            doclets,
            exit_code,
            error,
        }
    }

    fn transition(&mut self, stage: Stage) {
        debug!(from = ?self.stages.last(), to = ?stage, "stage transition");
        self.stages.push(stage);
    }

    fn locator(&self) -> ResourceLocator {
        let locator = ResourceLocator::new(&self.state.working_dir, &self.state.root_dir);
        match &self.installed_dir {
            Some(dir) => locator.with_installed_dir(dir.clone()),
            None => locator,
        }
    }

    fn run_command(&mut self) -> Result<CommandResult> {
        self.configure()?;
        self.reporter.check_fatal()?;

        let opts = &self.state.options;
        if opts.help {
            self.print_help()?;
            self.transition(Stage::HelpPrinted);
            Ok(CommandResult::exit(0))
        } else if opts.test {
            self.self_check()
        } else if opts.version {
            writeln!(self.out, "{}", version_line()).map_err(|e| DocweaveError::io("<output>", e))?;
            Ok(CommandResult::exit(0))
        } else {
            self.main()
        }
    }

    // -- Configuring ---------------------------------------------------------

    #[instrument(skip_all)]
    fn configure(&mut self) -> Result<()> {
        self.transition(Stage::Configuring);
        self.progress.phase("Configuring");

        self.state.parse_options()?;

        let explicit = self
            .state
            .options
            .configure
            .as_ref()
            .map(|p| self.state.working_dir.join(p));
        let source = resolve_config_path(&self.state.root_dir, explicit.as_deref());
        let config = load_config(&source)?;

        let cli = std::mem::take(&mut self.state.options);
        self.state.options = RunOptions::merge(cli, config.opts.clone());
        self.state.config = config;
        self.config_source = Some(source);

        let opts = &self.state.options;
        self.log.install(
            LogSettings::from_flags(opts.debug, opts.verbose, opts.nocolor),
            self.reporter.gate(),
        );
        if !opts.test {
            self.reporter.arm(opts.pedantic);
        }

        debug!("{}", version_line());
        debug!(
            config = %serde_json::to_string(&self.state.config).unwrap_or_default(),
            opts = %serde_json::to_string(&self.state.options).unwrap_or_default(),
            "Environment info"
        );
        Ok(())
    }

    fn print_help(&mut self) -> Result<()> {
        write!(self.out, "{}\n\n{}\n", version_line(), help_text()).map_err(|e| DocweaveError::io("<output>", e))
    }

    // -- Self-check ----------------------------------------------------------

    #[instrument(skip_all)]
    fn self_check(&mut self) -> Result<CommandResult> {
        let filter = match &self.state.options.match_patterns {
            Some(patterns) if !patterns.is_empty() => Some(
                Regex::new(&patterns.join("|"))
                    .map_err(|e| DocweaveError::config(format!("invalid --match pattern: {e}")))?,
            ),
            _ => None,
        };

        let locator = self.locator();
        let mut checks: Vec<(String, std::result::Result<(), String>)> = Vec::new();

        let config_desc = match &self.config_source {
            Some(ConfigSource::File(path)) => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        };
        checks.push((format!("config {config_desc}"), Ok(())));

        for spec in self.state.config.plugins.iter().flatten() {
            let outcome = match resolve_plugin(spec, &locator, &self.catalog) {
                None => Err("not found".to_string()),
                Some(resolved) => load_plugin(&resolved, &self.catalog).map(|_| ()).map_err(|e| e.to_string()),
            };
            checks.push((format!("plugin {spec}"), outcome));
        }

        let template_spec = self.state.options.template_specifier().to_string();
        let location = resolve_template(&template_spec, &locator, &self.catalog);
        checks.push((
            format!("template {template_spec}"),
            load_template(&location, &self.catalog).map(|_| ()).map_err(|e| e.to_string()),
        ));

        for file in &self.state.options.files {
            let outcome = if self.state.working_dir.join(file).exists() {
                Ok(())
            } else {
                Err("does not exist".to_string())
            };
            checks.push((format!("input {}", file.display()), outcome));
        }

        let io_err = |e| DocweaveError::io("<output>", e);
        writeln!(self.out, "Running checks...").map_err(io_err)?;

        let mut ran = 0;
        let mut failed = 0;
        for (name, outcome) in checks {
            if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
                continue;
            }
            ran += 1;
            match outcome {
                Ok(()) => writeln!(self.out, "  ok    {name}").map_err(io_err)?,
                Err(reason) => {
                    failed += 1;
                    writeln!(self.out, "  FAIL  {name}: {reason}").map_err(io_err)?;
                }
            }
        }
        writeln!(self.out, "{ran} checks, {failed} failed").map_err(io_err)?;

        Ok(CommandResult::exit(if failed > 0 { 1 } else { 0 }))
    }

    // -- Main ----------------------------------------------------------------

    #[instrument(skip_all, fields(recurse = self.state.options.recurse))]
    fn main(&mut self) -> Result<CommandResult> {
        self.reporter.start();
        self.discover_sources()?;
        self.reporter.check_fatal()?;

        if self.state.source_files.is_empty() {
            writeln!(self.out, "There are no input files to process.\n").map_err(|e| DocweaveError::io("<output>", e))?;
            self.print_help()?;
            self.transition(Stage::HelpPrinted);
            self.reporter.finish();
            return Ok(CommandResult::exit(0));
        }

        let locator = self.locator();
        let job = ParseJob {
            config: &self.state.config,
            options: &self.state.options,
            package_metadata: self.state.package_metadata.as_ref(),
            locator: &locator,
            catalog: &self.catalog,
        };

        // -- Parsing --
        self.stages.push(Stage::Parsing);
        debug!(to = ?Stage::Parsing, "stage transition");
        self.progress.phase("Parsing source files");
        let mut parser = job.create_parser()?;
        self.reporter.check_fatal()?;
        let signal = self.reporter.fatal_signal();
        parser.stop_when(move || signal.is_raised());

        let progress = self.progress;
        let mut doclets = job.parse(&mut parser, &mut self.state.source_files, |path, current, total| {
            progress.file_parsed(path, current, total)
        });
        info!(files = self.state.source_files.len(), doclets = doclets.len(), "parsing complete");
        self.reporter.check_fatal()?;

        // -- Postprocessing --
        self.stages.push(Stage::Postprocessing);
        debug!(to = ?Stage::Postprocessing, "stage transition");
        self.progress.phase("Post-processing");
        post_process(self.post.as_mut(), &mut parser, &mut doclets);
        self.reporter.check_fatal()?;

        if self.state.options.explain {
            self.transition(Stage::Dumped);
            self.dump(&doclets)?;
        } else {
            self.transition(Stage::Rendering);
            self.render(&doclets, &locator)?;
        }
        self.reporter.check_fatal()?;

        self.reporter.finish();
        self.progress.done(&doclets);

        Ok(CommandResult {
            exit_code: 0,
            doclets: Some(doclets),
        })
    }

    #[instrument(skip_all)]
    fn discover_sources(&mut self) -> Result<()> {
        self.progress.phase("Discovering source files");
        let opts = &self.state.options;
        let request = SourceRequest {
            positional: &opts.files,
            source: self.state.config.source.as_ref(),
            package: opts.package.as_deref(),
            readme: opts.readme.as_deref(),
            recurse: opts.recurse,
            working_dir: &self.state.working_dir,
        };

        let set = load_source_files(&request)?;
        self.state.source_files = set.files;
        self.state.package_metadata = set.package_metadata;
        self.state.readme_html = set.readme_html;
        Ok(())
    }

    fn dump(&mut self, doclets: &DocletCollection) -> Result<()> {
        let json = serde_json::to_string_pretty(doclets)
            .map_err(|e| DocweaveError::Render(format!("cannot serialize doclets: {e}")))?;
        writeln!(self.out, "{json}").map_err(|e| DocweaveError::io("<output>", e))
    }

    #[instrument(skip_all)]
    fn render(&mut self, doclets: &DocletCollection, locator: &ResourceLocator) -> Result<()> {
        let opts = &self.state.options;

        let mut tutorials = TutorialResolver::new();
        if let Some(dir) = &opts.tutorials {
            self.progress.phase("Resolving tutorials");
            tutorials.load(&self.state.working_dir.join(dir), opts.recurse)?;
            tutorials.resolve();
        }
        self.reporter.check_fatal()?;

        let location = resolve_template(opts.template_specifier(), locator, &self.catalog);
        let template = load_template(&location, &self.catalog)?;

        let mut render_opts = opts.clone();
        render_opts.destination = opts.destination.as_ref().map(|d| self.state.working_dir.join(d));
        render_opts.readme_html = self.state.readme_html.clone();

        self.progress.phase("Generating output files");
        info!(template = %template.location, "Generating output files...");
        template.template.publish(doclets, &render_opts, tutorials.root())?;
        info!("complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Template;
    use crate::reporter::KeepCurrentLogger;
    use crate::runtime::{HostKind, HostRoots};
    use crate::tutorials::TutorialNode;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tracing_subscriber::layer::SubscriberExt;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dw-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(
            dir.join("lib/shapes.js"),
            "/**\n * A shape.\n * @class\n */\nfunction Shape() {}\n\n/** Area. */\nShape.prototype.area = function() {};\n",
        )
        .unwrap();
        std::fs::write(dir.join("conf.json"), r#"{ "source": { "include": [] }, "plugins": [] }"#).unwrap();
        dir
    }

    fn state(dir: &Path, args: &[&str]) -> RunState {
        RunState::new(
            HostKind::Standalone,
            HostRoots {
                root_dir: dir.to_path_buf(),
                working_dir: dir.to_path_buf(),
                args: args.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    /// Records what the template was asked to publish.
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Template for Recorder {
        fn publish(&self, doclets: &DocletCollection, options: &RunOptions, _: &TutorialNode) -> Result<()> {
            self.0.borrow_mut().push(format!(
                "{} doclets to {}",
                doclets.len(),
                options.destination.as_ref().map(|d| d.display().to_string()).unwrap_or_default()
            ));
            Ok(())
        }
    }

    fn catalog_with(recorder: &Recorder) -> ExtensionCatalog {
        let mut catalog = ExtensionCatalog::builtin();
        let recorder = recorder.clone();
        catalog.register_template("templates/default", move || Box::new(recorder.clone()));
        catalog
    }

    fn run(dir: &Path, args: &[&str], catalog: ExtensionCatalog) -> (RunOutcome, String) {
        let mut out = Vec::new();
        let mut log = KeepCurrentLogger;
        let outcome = Pipeline::new(state(dir, args), &SilentProgress, &mut log, &mut out)
            .with_catalog(catalog)
            .with_installed_dir(None)
            .run();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn main_run_parses_and_renders() {
        let dir = temp_dir();
        let recorder = Recorder::default();
        let (outcome, _) = run(&dir, &["lib"], catalog_with(&recorder));

        assert_eq!(outcome.exit_code, 0, "{:?}", outcome.error);
        assert_eq!(
            outcome.stages,
            vec![
                Stage::Idle,
                Stage::Configuring,
                Stage::Parsing,
                Stage::Postprocessing,
                Stage::Rendering,
                Stage::Done
            ]
        );
        let doclets = outcome.doclets.expect("doclets");
        assert_eq!(doclets.by_longname("Shape#area").len(), 1);
        assert_eq!(doclets.by_longname("package:undefined").len(), 1);

        let published = recorder.0.borrow();
        assert_eq!(published.len(), 1);
        assert!(published[0].ends_with(&format!("to {}", dir.join("./out/").display())));
    }

    #[test]
    fn explain_dumps_and_skips_rendering_and_tutorials() {
        let dir = temp_dir();
        let recorder = Recorder::default();
        let (outcome, out) = run(&dir, &["-X", "-u", "missing-tutorials", "lib"], catalog_with(&recorder));

        assert_eq!(outcome.exit_code, 0, "{:?}", outcome.error);
        assert!(outcome.stages.contains(&Stage::Dumped));
        assert!(!outcome.stages.contains(&Stage::Rendering));
        assert!(recorder.0.borrow().is_empty());

        let dumped: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(dumped.as_array().unwrap().iter().any(|d| d["longname"] == "Shape"));
    }

    #[test]
    fn empty_source_set_prints_help_and_succeeds() {
        let dir = temp_dir();
        let (outcome, out) = run(&dir, &[], ExtensionCatalog::builtin());

        assert_eq!(outcome.exit_code, 0);
        assert!(out.starts_with("There are no input files to process."));
        assert!(out.contains("--destination"));
        assert!(outcome.stages.contains(&Stage::HelpPrinted));
        assert!(!outcome.stages.contains(&Stage::Parsing));
    }

    #[test]
    fn help_flag_prints_usage() {
        let dir = temp_dir();
        let (outcome, out) = run(&dir, &["--help"], ExtensionCatalog::builtin());
        assert_eq!(outcome.exit_code, 0);
        assert!(out.starts_with(&version_line()));
        assert_eq!(outcome.stages.last(), Some(&Stage::Done));
        assert!(outcome.stages.contains(&Stage::HelpPrinted));
    }

    #[test]
    fn version_flag_prints_version() {
        let dir = temp_dir();
        let (outcome, out) = run(&dir, &["-v"], ExtensionCatalog::builtin());
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(out.trim(), version_line());
    }

    #[test]
    fn unknown_flag_fails_with_option_parse_error() {
        let dir = temp_dir();
        let (outcome, _) = run(&dir, &["--bogus"], ExtensionCatalog::builtin());
        assert_eq!(outcome.exit_code, 1);
        assert!(matches!(outcome.error, Some(DocweaveError::OptionParse { .. })));
        assert_eq!(outcome.stages.last(), Some(&Stage::Failed));
    }

    #[test]
    fn unparsable_config_is_fatal() {
        let dir = temp_dir();
        std::fs::write(dir.join("broken.json"), "{ nope").unwrap();
        let (outcome, _) = run(&dir, &["-c", "broken.json", "lib"], ExtensionCatalog::builtin());
        assert_eq!(outcome.exit_code, 1);
        let message = outcome.error.expect("error").to_string();
        assert!(message.contains("Cannot parse the config file"));
    }

    #[test]
    fn unresolved_plugin_is_skipped() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("conf.json"),
            r#"{ "source": {}, "plugins": ["nowhere/missing", "plugins/underscore"] }"#,
        )
        .unwrap();
        let recorder = Recorder::default();
        let (outcome, _) = run(&dir, &["lib"], catalog_with(&recorder));

        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert_eq!(recorder.0.borrow().len(), 1);
    }

    #[test]
    fn config_without_source_section_still_scans_inputs() {
        let dir = temp_dir();
        std::fs::write(dir.join("conf.json"), r#"{ "plugins": [] }"#).unwrap();
        let (outcome, out) = run(&dir, &["-X", "lib"], ExtensionCatalog::builtin());

        assert_eq!(outcome.exit_code, 0, "{:?}", outcome.error);
        assert!(outcome.stages.contains(&Stage::Dumped));
        assert!(!out.contains("There are no input files to process."));
    }

    #[test]
    fn files_added_by_plugins_reach_the_package_doclet() {
        struct ExtraFile(PathBuf);
        impl crate::extensions::Plugin for ExtraFile {
            fn handlers(&self) -> Vec<(crate::parser::EventKind, crate::parser::Handler)> {
                let extra = self.0.clone();
                let handler: crate::parser::Handler = Box::new(move |event: &mut crate::parser::ParserEvent<'_>| {
                    if let crate::parser::ParserEvent::ParseBegin { source_files } = event {
                        source_files.push(extra.clone());
                    }
                });
                vec![(crate::parser::EventKind::ParseBegin, handler)]
            }
        }

        let dir = temp_dir();
        std::fs::create_dir_all(dir.join("extra")).unwrap();
        let extra = dir.join("extra/colors.js");
        std::fs::write(&extra, "/** Pick a color. */\nfunction pick() {}\n").unwrap();
        std::fs::write(
            dir.join("conf.json"),
            r#"{ "source": { "include": [] }, "plugins": ["plugins/extraFile"] }"#,
        )
        .unwrap();

        let mut catalog = ExtensionCatalog::builtin();
        let added = extra.clone();
        catalog.register_plugin("plugins/extraFile", move || Box::new(ExtraFile(added.clone())));
        let (outcome, _) = run(&dir, &["-X", "lib"], catalog);

        assert_eq!(outcome.exit_code, 0, "{:?}", outcome.error);
        let doclets = outcome.doclets.expect("doclets");
        assert_eq!(doclets.by_longname("pick").len(), 1);
        let package = doclets.by_longname("package:undefined")[0];
        assert_eq!(package.files, vec![dir.join("lib/shapes.js"), extra]);
    }

    #[test]
    fn unresolved_template_is_fatal() {
        let dir = temp_dir();
        let (outcome, _) = run(&dir, &["-t", "templates/absent", "lib"], ExtensionCatalog::builtin());
        assert_eq!(outcome.exit_code, 1);
        assert!(matches!(outcome.error, Some(DocweaveError::TemplateLoad { .. })));
        assert!(outcome.stages.contains(&Stage::Rendering));
    }

    #[test]
    fn post_processing_runs_in_order() {
        #[derive(Default)]
        struct Order(Rc<RefCell<Vec<&'static str>>>);
        impl PostProcessor for Order {
            fn index(&mut self, _: &mut DocletCollection) {
                self.0.borrow_mut().push("index");
            }
            fn augment(&mut self, _: &mut DocletCollection) {
                self.0.borrow_mut().push("augment");
            }
            fn resolve_borrows(&mut self, _: &mut DocletCollection) {
                self.0.borrow_mut().push("borrows");
            }
        }

        let dir = temp_dir();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut out = Vec::new();
        let mut log = KeepCurrentLogger;
        let outcome = Pipeline::new(state(&dir, &["-X", "lib"]), &SilentProgress, &mut log, &mut out)
            .with_post_processor(Order(Rc::clone(&calls)))
            .with_installed_dir(None)
            .run();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(*calls.borrow(), vec!["index", "augment", "borrows"]);
    }

    #[test]
    fn pedantic_warning_sets_exit_code() {
        let dir = temp_dir();
        let reporter = RunReporter::new();
        let subscriber = tracing_subscriber::registry().with(reporter.gate());

        let outcome = tracing::subscriber::with_default(subscriber, || {
            let mut out = Vec::new();
            let mut log = KeepCurrentLogger;
            Pipeline::new(
                state(&dir, &["--pedantic", "-X", "-e", "klingon", "lib"]),
                &SilentProgress,
                &mut log,
                &mut out,
            )
            .with_reporter(reporter.clone())
            .with_installed_dir(None)
            .run()
        });

        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert_eq!(outcome.exit_code, 1);
    }

    #[test]
    fn pedantic_error_stops_the_run() {
        let dir = temp_dir();
        let reporter = RunReporter::new();
        let subscriber = tracing_subscriber::registry().with(reporter.gate());

        let outcome = tracing::subscriber::with_default(subscriber, || {
            let mut out = Vec::new();
            let mut log = KeepCurrentLogger;
            Pipeline::new(
                state(&dir, &["--pedantic", "-X", "lib", "missing.js"]),
                &SilentProgress,
                &mut log,
                &mut out,
            )
            .with_reporter(reporter.clone())
            .with_installed_dir(None)
            .run()
        });

        assert!(matches!(outcome.error, Some(DocweaveError::Fatal { .. })));
        assert!(!outcome.stages.contains(&Stage::Parsing));
    }

    #[test]
    fn pedantic_error_while_parsing_skips_remaining_files() {
        #[derive(Default)]
        struct Counting(std::sync::Mutex<Vec<PathBuf>>);
        impl ProgressReporter for Counting {
            fn phase(&self, _: &str) {}
            fn file_parsed(&self, path: &Path, _: usize, _: usize) {
                self.0.lock().unwrap().push(path.to_path_buf());
            }
            fn done(&self, _: &DocletCollection) {}
        }

        let dir = temp_dir();
        std::fs::remove_file(dir.join("lib/shapes.js")).unwrap();
        std::fs::write(dir.join("lib/a.js"), [0xff, 0xfe, 0x2f, 0x2a]).unwrap();
        for name in ["b.js", "c.js", "d.js"] {
            std::fs::write(dir.join("lib").join(name), "/** Fine. */\nvar fine = 1;\n").unwrap();
        }

        let reporter = RunReporter::new();
        let subscriber = tracing_subscriber::registry().with(reporter.gate());
        let progress = Counting::default();

        let outcome = tracing::subscriber::with_default(subscriber, || {
            let mut out = Vec::new();
            let mut log = KeepCurrentLogger;
            Pipeline::new(state(&dir, &["--pedantic", "-X", "lib"]), &progress, &mut log, &mut out)
                .with_reporter(reporter.clone())
                .with_installed_dir(None)
                .run()
        });

        assert!(matches!(outcome.error, Some(DocweaveError::Fatal { .. })), "{:?}", outcome.error);
        assert!(outcome.stages.contains(&Stage::Parsing));
        assert!(!outcome.stages.contains(&Stage::Postprocessing));
        assert!(progress.0.lock().unwrap().is_empty());
    }

    #[test]
    fn self_check_reports_failures() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("conf.json"),
            r#"{ "source": {}, "plugins": ["plugins/underscore", "nowhere/missing"] }"#,
        )
        .unwrap();
        let (outcome, out) = run(&dir, &["-T", "lib"], ExtensionCatalog::builtin());

        assert_eq!(outcome.exit_code, 1);
        assert!(out.contains("ok    plugin plugins/underscore"));
        assert!(out.contains("FAIL  plugin nowhere/missing"));
        assert!(out.contains("ok    input lib"));
    }

    #[test]
    fn self_check_match_filters_by_name() {
        let dir = temp_dir();
        std::fs::write(dir.join("conf.json"), r#"{ "plugins": ["nowhere/missing"] }"#).unwrap();
        let (outcome, out) = run(&dir, &["-T", "-m", "template", "-m", "config"], ExtensionCatalog::builtin());

        assert_eq!(outcome.exit_code, 0, "{out}");
        assert!(!out.contains("nowhere/missing"));
        assert!(out.contains("2 checks, 0 failed"));
    }
}
