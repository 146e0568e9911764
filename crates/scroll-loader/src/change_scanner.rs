//! Script file change detection for hot reloading
//!
//! Polls the scripts directory (flattened one level, loadable scripts only)
//! and reports files that were modified, added or removed since the last poll.
//! [`ScriptLoader::apply_changes`] turns a [`ScanResult`] into reloads.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::diagnostics::TracingSink;
use crate::loader::ScriptLoader;
use crate::path_filter::classify;
use crate::script::Script;
use crate::script_scanner::ScriptDirectoryScanner;

/// Default scan interval (1000ms = 1Hz)
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// Result of scanning for script changes
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Scripts that were modified (path and new modification time)
    pub changed: Vec<(PathBuf, SystemTime)>,
    /// Scripts that appeared
    pub added: Vec<PathBuf>,
    /// Scripts that disappeared (deleted, renamed or disabled)
    pub removed: Vec<PathBuf>,
}

impl ScanResult {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }
}

pub struct ChangeScanner {
    scanner: ScriptDirectoryScanner,
    scripts_dir: PathBuf,
    scan_interval: Duration,
    last_scan: Option<Instant>,
    /// path -> modification time, as of the last scan
    cached_state: HashMap<PathBuf, SystemTime>,
}

impl ChangeScanner {
    pub fn new(scripts_dir: PathBuf) -> Self {
        Self::with_interval(scripts_dir, DEFAULT_SCAN_INTERVAL)
    }

    /// Create a scanner whose cache already holds the current files, so they
    /// are not reported as added on the first scan.
    pub fn with_interval(scripts_dir: PathBuf, scan_interval: Duration) -> Self {
        let scanner = ScriptDirectoryScanner::new(Arc::new(TracingSink));
        let cached_state = scripts_in_dir(&scanner, &scripts_dir);
        Self {
            scanner,
            scripts_dir,
            scan_interval,
            last_scan: None,
            cached_state,
        }
    }

    pub fn should_scan(&self) -> bool {
        match self.last_scan {
            Some(last) => last.elapsed() >= self.scan_interval,
            None => true,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn tracked(&self) -> usize {
        self.cached_state.len()
    }

    pub fn scan_changes(&mut self) -> ScanResult {
        self.last_scan = Some(Instant::now());
        let current_state = scripts_in_dir(&self.scanner, &self.scripts_dir);
        let mut result = ScanResult::default();

        for (path, modified) in &current_state {
            match self.cached_state.get(path) {
                Some(cached) if cached != modified => {
                    debug!(target: "scripting", "Script changed: {}", path.display());
                    result.changed.push((path.clone(), *modified));
                }
                Some(_) => {}
                None => {
                    debug!(target: "scripting", "Script added: {}", path.display());
                    result.added.push(path.clone());
                }
            }
        }

        for path in self.cached_state.keys() {
            if !current_state.contains_key(path) {
                debug!(target: "scripting", "Script removed: {}", path.display());
                result.removed.push(path.clone());
            }
        }

        self.cached_state = current_state;
        result
    }
}

/// Loadable scripts under `dir` with their mtimes, discovered the same way a
/// bulk load discovers them.
///
/// Uses the silent classification so reserved names are not reported on every
/// poll.
fn scripts_in_dir(scanner: &ScriptDirectoryScanner, dir: &Path) -> HashMap<PathBuf, SystemTime> {
    if !dir.is_dir() {
        debug!(target: "scripting", "Script directory does not exist: {}", dir.display());
        return HashMap::new();
    }

    scanner
        .scan(dir, |path| classify(path).is_loadable())
        .filter_map(
            |path| match fs::metadata(&path).and_then(|metadata| metadata.modified()) {
                Ok(modified) => Some((path, modified)),
                Err(e) => {
                    warn!(
                        target: "scripting",
                        "Failed to get modification time for {}: {}",
                        path.display(),
                        e
                    );
                    None
                }
            },
        )
        .collect()
}

impl ScriptLoader {
    /// Reload changed scripts, load added ones and unload removed ones.
    /// Returns the scripts that (re)loaded successfully.
    pub async fn apply_changes(&self, changes: &ScanResult) -> Vec<Script> {
        for path in &changes.removed {
            if let Ok(script) = Script::new(path.clone()) {
                self.unload_script(&script);
            }
        }

        let mut loaded = Vec::new();
        let touched = changes
            .changed
            .iter()
            .map(|(path, _)| path)
            .chain(changes.added.iter());
        for path in touched {
            if let Some(script) = self.load_script(path).await {
                loaded.push(script);
            }
        }
        loaded
    }
}
