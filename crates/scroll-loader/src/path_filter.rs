//! Decides which files on disk are loadable, enabled scripts.

use std::path::Path;
use std::sync::Arc;

use crate::diagnostics::{DiagnosticsSink, Report};
use crate::error::LoaderError;

/// Extension every script file carries
pub const SCRIPT_EXTENSION: &str = ".scroll";

/// Leading marker that disables a script without deleting it
pub const DISABLED_PREFIX: &str = "-";

/// File names kept for the addon's own configuration and language files
pub const RESERVED_NAMES: &[&str] = &[
    "configuration.scroll",
    "languages.scroll",
    "language.scroll",
    "settings.scroll",
    "config.scroll",
    "lang.scroll",
];

/// Outcome of classifying a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    Loadable,
    Directory,
    WrongExtension,
    Disabled,
    Reserved(String),
}

impl PathVerdict {
    pub fn is_loadable(&self) -> bool {
        matches!(self, PathVerdict::Loadable)
    }
}

/// Classify `path` without reporting anything.
pub fn classify(path: &Path) -> PathVerdict {
    if path.is_dir() {
        return PathVerdict::Directory;
    }
    let Some(file_name) = path.file_name().map(|name| name.to_string_lossy()) else {
        return PathVerdict::WrongExtension;
    };
    if !file_name.ends_with(SCRIPT_EXTENSION) {
        return PathVerdict::WrongExtension;
    }
    if file_name.starts_with(DISABLED_PREFIX) {
        return PathVerdict::Disabled;
    }
    if is_reserved(&file_name) {
        return PathVerdict::Reserved(file_name.into_owned());
    }
    PathVerdict::Loadable
}

pub fn is_reserved(file_name: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(file_name))
}

/// Path predicate used for scanning and loading.
///
/// Every rejection is silent except a reserved name, which is reported.
#[derive(Clone)]
pub struct PathFilter {
    sink: Arc<dyn DiagnosticsSink>,
}

impl PathFilter {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }

    pub fn is_loadable(&self, path: &Path) -> bool {
        match classify(path) {
            PathVerdict::Loadable => true,
            PathVerdict::Reserved(file_name) => {
                self.sink
                    .report(&Report::Error(LoaderError::ReservedName { file_name }));
                false
            }
            _ => false,
        }
    }
}
