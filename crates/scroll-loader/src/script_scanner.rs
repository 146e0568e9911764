//! Lists candidate script files in a scripts directory.
//!
//! Immediate children are yielded as they are; a child directory is expanded
//! one level. Anything nested deeper is never discovered.

use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::{DiagnosticsSink, Report};
use crate::error::LoaderError;

/// Lists the entries of a subdirectory
type ListDir = fn(&Path) -> io::Result<Vec<PathBuf>>;

fn list_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .collect())
}

#[derive(Clone)]
pub struct ScriptDirectoryScanner {
    sink: Arc<dyn DiagnosticsSink>,
    list_subdir: ListDir,
}

impl ScriptDirectoryScanner {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            sink,
            list_subdir: list_dir,
        }
    }

    #[cfg(test)]
    fn with_lister(sink: Arc<dyn DiagnosticsSink>, list_subdir: ListDir) -> Self {
        Self { sink, list_subdir }
    }

    /// Lazily yield every path under `dir` (flattened one level) accepted by
    /// `filter`.
    ///
    /// A missing or non-directory `dir` is reported and yields nothing. An
    /// unreadable subdirectory is reported and contributes nothing, the rest
    /// of the scan continues. Calling `scan` again starts a fresh listing.
    pub fn scan<'a>(
        &'a self,
        dir: &Path,
        mut filter: impl FnMut(&Path) -> bool + 'a,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        self.open(dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .flat_map(move |entry| self.expand(entry.path()))
            .filter(move |path| filter(path))
    }

    fn open(&self, dir: &Path) -> Option<ReadDir> {
        if !dir.is_dir() {
            self.sink.report(&Report::Error(LoaderError::NotADirectory {
                path: dir.to_path_buf(),
            }));
            return None;
        }
        match fs::read_dir(dir) {
            Ok(entries) => Some(entries),
            Err(source) => {
                self.sink.report(&Report::Error(LoaderError::ReadDirectory {
                    path: dir.to_path_buf(),
                    source,
                }));
                None
            }
        }
    }

    fn expand(&self, path: PathBuf) -> Vec<PathBuf> {
        if !path.is_dir() {
            return vec![path];
        }
        debug!(target: "scripting", "Scanning subdirectory {}", path.display());
        match (self.list_subdir)(&path) {
            Ok(entries) => entries,
            Err(source) => {
                self.sink
                    .report(&Report::Error(LoaderError::ReadDirectory { path, source }));
                Vec::new()
            }
        }
    }
}
