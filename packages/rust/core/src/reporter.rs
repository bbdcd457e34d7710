//! Run timing, exit status and severity escalation.
//!
//! [`SeverityGate`] is a `tracing` layer that watches every warning and error
//! emitted during a run. Depending on the armed [`SeverityPolicy`] it marks
//! the run as failed or raises a fatal flag; the orchestrator polls the flag
//! between stages through [`RunReporter::check_fatal`], and long-running work
//! polls it per unit through a [`FatalSignal`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use docweave_shared::{DocweaveError, Result};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, debug, info};
use tracing_subscriber::layer::{Context, Layer};

/// How logged problems affect the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SeverityPolicy {
    /// Logging has no effect on the outcome.
    Disarmed = 0,
    /// Errors make the run exit non-zero.
    Default = 1,
    /// Warnings make the run exit non-zero; errors stop it.
    Pedantic = 2,
}

impl SeverityPolicy {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Default,
            2 => Self::Pedantic,
            _ => Self::Disarmed,
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    policy: AtomicU8,
    exit_with_error: AtomicBool,
    fatal: AtomicBool,
    fatal_message: Mutex<Option<String>>,
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// Tracing layer applying the armed [`SeverityPolicy`] to log events.
#[derive(Debug, Clone)]
pub struct SeverityGate {
    state: Arc<GateState>,
}

impl<S: Subscriber> Layer<S> for SeverityGate {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level != Level::WARN && level != Level::ERROR {
            return;
        }

        match SeverityPolicy::from_u8(self.state.policy.load(Ordering::Acquire)) {
            SeverityPolicy::Disarmed => {}
            SeverityPolicy::Default => {
                if level == Level::ERROR {
                    self.state.exit_with_error.store(true, Ordering::Release);
                }
            }
            SeverityPolicy::Pedantic => {
                self.state.exit_with_error.store(true, Ordering::Release);
                if level == Level::ERROR {
                    let mut visitor = MessageVisitor::default();
                    event.record(&mut visitor);
                    if let Ok(mut slot) = self.state.fatal_message.lock() {
                        slot.get_or_insert(visitor.0.unwrap_or_default());
                    }
                    self.state.fatal.store(true, Ordering::Release);
                }
            }
        }
    }
}

#[derive(Default)]
struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

/// Read-only view of the fatal flag, for loops that should stop as soon as a
/// pedantic error is logged.
#[derive(Debug, Clone)]
pub struct FatalSignal {
    state: Arc<GateState>,
}

impl FatalSignal {
    pub fn is_raised(&self) -> bool {
        self.state.fatal.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Logger installation
// ---------------------------------------------------------------------------

/// Console logging settings derived from the merged options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub ansi: bool,
}

impl LogSettings {
    /// `--debug` wins over `--verbose`; the quiet default shows warnings.
    pub fn from_flags(debug: bool, verbose: bool, nocolor: bool) -> Self {
        let level = if debug {
            Level::DEBUG
        } else if verbose {
            Level::INFO
        } else {
            Level::WARN
        };
        Self { level, ansi: !nocolor }
    }
}

/// Installs the process-wide subscriber once options are known.
pub trait LogControl {
    /// Install console logging with `settings`, stacking `gate` on top.
    fn install(&mut self, settings: LogSettings, gate: SeverityGate);
}

/// Leaves whatever subscriber is current in place.
#[derive(Debug, Default)]
pub struct KeepCurrentLogger;

impl LogControl for KeepCurrentLogger {
    fn install(&mut self, _settings: LogSettings, _gate: SeverityGate) {}
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Tracks timing and the severity flags for one run.
#[derive(Debug, Clone)]
pub struct RunReporter {
    state: Arc<GateState>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Default for RunReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReporter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(GateState::default()),
            started_at: None,
            finished_at: None,
        }
    }

    /// A layer sharing this reporter's flags.
    pub fn gate(&self) -> SeverityGate {
        SeverityGate {
            state: Arc::clone(&self.state),
        }
    }

    /// A handle on the fatal flag that outlives borrows of the reporter.
    pub fn fatal_signal(&self) -> FatalSignal {
        FatalSignal {
            state: Arc::clone(&self.state),
        }
    }

    /// Start honoring log severities.
    pub fn arm(&self, pedantic: bool) {
        let policy = if pedantic {
            SeverityPolicy::Pedantic
        } else {
            SeverityPolicy::Default
        };
        self.state.policy.store(policy as u8, Ordering::Release);
        debug!(?policy, "severity gate armed");
    }

    pub fn policy(&self) -> SeverityPolicy {
        SeverityPolicy::from_u8(self.state.policy.load(Ordering::Acquire))
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Record the finish time and log the elapsed time.
    pub fn finish(&mut self) {
        let finished = Utc::now();
        self.finished_at = Some(finished);

        if let Some(started) = self.started_at {
            let elapsed = (finished - started).num_milliseconds() as f64 / 1000.0;
            info!("Finished running in {elapsed:.2} seconds.");
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether a logged problem should fail the run.
    pub fn should_exit_with_error(&self) -> bool {
        self.state.exit_with_error.load(Ordering::Acquire)
    }

    /// Turn a raised fatal flag into an error.
    pub fn check_fatal(&self) -> Result<()> {
        if !self.state.fatal.load(Ordering::Acquire) {
            return Ok(());
        }
        let message = self
            .state
            .fatal_message
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "an error was logged in pedantic mode".to_string());
        Err(DocweaveError::fatal(message))
    }

    /// Process exit code for a run that ended with `result`.
    pub fn exit_code<T>(&self, result: &Result<T>) -> u8 {
        if result.is_err() || self.should_exit_with_error() {
            1
        } else {
            0
        }
    }
}
