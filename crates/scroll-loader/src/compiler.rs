//! Boundary to the parser that turns script source into triggers.
//!
//! The loader never looks inside a script. It hands the path to a
//! [`ScriptCompiler`], bounds the call with a timeout, and collects whatever
//! [`LogEntry`]s come back. Triggers the compiler registers live in an external
//! [`TriggerRegistry`] keyed by the script's simple name.

use std::fmt;
use std::path::Path;

use crate::script::Script;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One diagnostic produced while compiling a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// File the entry belongs to, stamped by [`ScriptLogger`]
    pub file_name: Option<String>,
    /// 1-based source line, when known
    pub line: Option<usize>,
    pub tip: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            file_name: None,
            line: None,
            tip: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file_name, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: ")?,
            (Some(file), None) => write!(f, "{file}: ")?,
            (None, Some(line)) => write!(f, "line {line}: ")?,
            (None, None) => {}
        }
        write!(f, "{}", self.message)?;
        if let Some(tip) = &self.tip {
            write!(f, " (tip: {tip})")?;
        }
        Ok(())
    }
}

/// Failure raised by a compiler for a whole script
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("could not read source: {0}")]
    Read(String),
    #[error("{message}")]
    Syntax { message: String, line: Option<usize> },
    #[error("{0}")]
    Other(String),
}

/// Per-compilation log context.
///
/// Each load gets its own logger, so diagnostics raised while parsing are
/// attributed to the script that is actually being compiled even when several
/// compilations run at once.
#[derive(Debug)]
pub struct ScriptLogger {
    script: Script,
    debug: bool,
    entries: Vec<LogEntry>,
    finalized: bool,
}

impl ScriptLogger {
    pub fn new(script: Script, debug: bool) -> Self {
        Self {
            script,
            debug,
            entries: Vec::new(),
            finalized: false,
        }
    }

    /// The script this logger attributes entries to
    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn log(&mut self, mut entry: LogEntry) {
        if self.finalized || (entry.level == LogLevel::Debug && !self.debug) {
            return;
        }
        entry.file_name.get_or_insert_with(|| self.script.file_name());
        self.entries.push(entry);
    }

    pub fn error(&mut self, message: impl Into<String>, tip: Option<String>) {
        let mut entry = LogEntry::new(LogLevel::Error, message);
        entry.tip = tip;
        self.log(entry);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warning, message));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, message));
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Debug, message));
    }

    /// Stop accepting entries and put the collected ones in source order.
    pub fn finalize(&mut self) {
        self.finalized = true;
        self.entries.sort_by_key(|entry| entry.line.unwrap_or(usize::MAX));
    }

    pub fn close(mut self) -> Vec<LogEntry> {
        if !self.finalized {
            self.finalize();
        }
        self.entries
    }
}

/// The parser. Runs on a dedicated worker thread, so it may block.
pub trait ScriptCompiler: Send + Sync + 'static {
    /// Compile the script at `path`, registering its triggers as a side
    /// effect. Returned entries are printed together with the logger's.
    fn compile(
        &self,
        path: &Path,
        debug: bool,
        logger: &mut ScriptLogger,
    ) -> Result<Vec<LogEntry>, CompileError>;
}

/// Registry of triggers produced by compiled scripts
pub trait TriggerRegistry: Send + Sync + 'static {
    /// Drop every trigger registered under `key` (case-insensitive).
    fn clear_triggers(&self, key: &str);
}
