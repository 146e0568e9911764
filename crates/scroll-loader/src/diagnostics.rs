//! Where loader conditions and compiler log entries end up.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::compiler::{LogEntry, LogLevel};
use crate::error::LoaderError;

/// A condition the orchestrator wants a human to see
#[derive(Debug)]
pub enum Report {
    Error(LoaderError),
    /// A bulk load finished without finding a single loadable script
    NoScripts { dir: PathBuf },
    /// A bulk load finished
    ScriptsLoaded { count: usize, elapsed: Duration },
}

impl Report {
    pub fn is_error(&self) -> bool {
        matches!(self, Report::Error(_))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Error(err) => write!(f, "{err}"),
            Report::NoScripts { dir } => write!(f, "no scripts found in {}", dir.display()),
            Report::ScriptsLoaded { count, elapsed } => write!(
                f,
                "scripts loaded: {count} in {}ms",
                elapsed.as_millis()
            ),
        }
    }
}

/// Receives reports from the loader and the log batch of every compilation.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, report: &Report);

    /// Flush the entries collected while compiling one script.
    fn print_logs(&self, entries: &[LogEntry], at: DateTime<Local>);
}

/// Default sink that forwards everything to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, report: &Report) {
        match report {
            Report::Error(_) => error!(target: "scripting", "{}", report),
            Report::NoScripts { .. } => warn!(target: "scripting", "{}", report),
            Report::ScriptsLoaded { .. } => info!(target: "scripting", "{}", report),
        }
    }

    fn print_logs(&self, entries: &[LogEntry], at: DateTime<Local>) {
        let at = at.format("%H:%M:%S");
        for entry in entries {
            match entry.level {
                LogLevel::Debug => debug!(target: "scripting", "[{}] {}", at, entry),
                LogLevel::Info => info!(target: "scripting", "[{}] {}", at, entry),
                LogLevel::Warning => warn!(target: "scripting", "[{}] {}", at, entry),
                LogLevel::Error => error!(target: "scripting", "[{}] {}", at, entry),
            }
        }
    }
}

/// Sink that keeps everything in memory, for tests and embedders that render
/// diagnostics themselves.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<String>>,
    errors: Mutex<usize>,
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingSink {
    /// Rendered reports in the order they arrived
    pub fn reports(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn error_count(&self) -> usize {
        *self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Compiler entries flushed so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, report: &Report) {
        if report.is_error() {
            *self.errors.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        }
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.to_string());
    }

    fn print_logs(&self, entries: &[LogEntry], _at: DateTime<Local>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(entries);
    }
}
