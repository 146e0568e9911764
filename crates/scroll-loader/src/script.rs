use std::path::{Path, PathBuf};

use crate::error::LoaderError;
use crate::path_filter::SCRIPT_EXTENSION;

/// A script file that compiled successfully and is tracked by the loader.
///
/// The path is the identity: two `Script`s are equal when they point at the
/// same file, regardless of when they were loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script {
    path: PathBuf,
}

impl Script {
    /// Create a script for a file path.
    ///
    /// Fails when `path` is a directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LoaderError> {
        let path = path.into();
        if path.is_dir() {
            return Err(LoaderError::IsDirectory { path });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path segment, e.g. `greet.scroll`
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without the `.scroll` extension, e.g. `greet`
    ///
    /// This is also the key triggers are registered under.
    pub fn simple_name(&self) -> String {
        let file_name = self.file_name();
        match file_name.rfind(SCRIPT_EXTENSION) {
            Some(end) => file_name[..end].to_string(),
            None => file_name,
        }
    }

    /// Whether `name` refers to this script, either by file name or simple name.
    pub fn matches_name(&self, name: &str) -> bool {
        self.file_name().eq_ignore_ascii_case(name) || self.simple_name().eq_ignore_ascii_case(name)
    }
}
