//! Lifecycle management for `.scroll` scripts
//!
//! This crate discovers script files in a scripts directory, compiles them
//! through a pluggable [`ScriptCompiler`] under a hard timeout, and tracks which
//! scripts are loaded. Scripts are enabled and disabled by renaming their file
//! (a leading `-` disables), and can be reloaded without leaving their old
//! triggers behind.
//!
//! The parser and the trigger registry are not part of this crate; embedders
//! supply them through [`ScriptCompiler`] and [`TriggerRegistry`].
pub mod change_scanner;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod path_filter;
pub mod registry;
pub mod reload;
pub mod script;
pub mod script_scanner;
pub mod state_index;

// Re-export commonly used types
pub use change_scanner::{ChangeScanner, ScanResult};
pub use compiler::{
    CompileError, LogEntry, LogLevel, ScriptCompiler, ScriptLogger, TriggerRegistry,
};
pub use config::{ConfigLoadError, LoaderConfig};
pub use diagnostics::{DiagnosticsSink, RecordingSink, Report, TracingSink};
pub use error::LoaderError;
pub use loader::{ScriptLoader, ScriptLoaderBuilder};
pub use path_filter::{PathFilter, DISABLED_PREFIX, RESERVED_NAMES, SCRIPT_EXTENSION};
pub use registry::ScriptRegistry;
pub use reload::{setup_reload_signal, ReloadReceiver};
pub use script::Script;
pub use script_scanner::ScriptDirectoryScanner;
pub use state_index::{ScriptState, ScriptStateIndex};
