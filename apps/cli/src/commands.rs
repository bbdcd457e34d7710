//! Process wiring: host detection, tracing setup, progress display.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use color_eyre::eyre::{Report, Result};
use docweave_core::pipeline::{Pipeline, ProgressReporter};
use docweave_core::reporter::{LogControl, LogSettings, SeverityGate};
use docweave_core::runtime::{HostSignals, help_text, initialize};
use docweave_shared::{DocletCollection, DocweaveError};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

const FATAL_ERROR_MESSAGE: &str =
    "Exiting docweave because an error occurred. See the previous log messages for details.";

/// Crates whose events reach the console.
const LOG_TARGETS: &[&str] = &["docweave", "docweave_core", "docweave_discovery", "docweave_shared"];

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber: console output filtered by `RUST_LOG` or
/// the run's verbosity, with the severity gate seeing every event.
#[derive(Default)]
struct TracingInstaller;

impl LogControl for TracingInstaller {
    fn install(&mut self, settings: LogSettings, gate: SeverityGate) {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::{EnvFilter, Layer, fmt};

        let level = settings.level.as_str().to_ascii_lowercase();
        let directives = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",");

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(settings.ansi)
            .with_target(false)
            .with_filter(env_filter);

        if let Err(e) = tracing_subscriber::registry().with(console).with(gate).try_init() {
            debug!(error = %e, "tracing subscriber already installed");
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_parsed(&self, path: &Path, current: usize, total: usize) {
        self.spinner.set_message(format!("Parsing [{current}/{total}] {}", path.display()));
    }

    fn done(&self, doclets: &DocletCollection) {
        self.spinner.set_message(format!("Documented {} symbols", doclets.len()));
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// Run one invocation and map its outcome to a process exit code.
pub(crate) fn run() -> Result<ExitCode> {
    let state = initialize(&HostSignals::from_process())?;

    let progress = CliProgress::new();
    let mut log = TracingInstaller;
    let outcome = {
        let mut stdout = std::io::stdout().lock();
        let outcome = Pipeline::new(state, &progress, &mut log, &mut stdout).run();
        let _ = stdout.flush();
        outcome
    };
    progress.finish();

    match outcome.error {
        None => Ok(ExitCode::from(outcome.exit_code)),
        Some(DocweaveError::OptionParse { message }) => {
            eprintln!("{message}\n");
            println!("{}", help_text());
            Ok(ExitCode::from(1))
        }
        Some(err) => Err(Report::new(err).wrap_err(FATAL_ERROR_MESSAGE)),
    }
}
