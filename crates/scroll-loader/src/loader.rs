//! The script lifecycle: bulk load, single (re)load, enable, disable.
//!
//! Compilation runs in parallel, registry mutation does not. Every change to
//! the [`ScriptRegistry`] goes through one mutex and no guard is held across
//! an `.await`.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Local;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::compiler::{ScriptCompiler, ScriptLogger, TriggerRegistry};
use crate::config::LoaderConfig;
use crate::diagnostics::{DiagnosticsSink, Report, TracingSink};
use crate::error::LoaderError;
use crate::path_filter::PathFilter;
use crate::registry::ScriptRegistry;
use crate::script::Script;
use crate::script_scanner::ScriptDirectoryScanner;
use crate::state_index::{disabled_path, enabled_path, ScriptState, ScriptStateIndex};

struct LoaderInner {
    config: LoaderConfig,
    scripts_dir: Mutex<PathBuf>,
    registry: Mutex<ScriptRegistry>,
    state_lock: Mutex<()>,
    compiler: Arc<dyn ScriptCompiler>,
    triggers: Arc<dyn TriggerRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
    filter: PathFilter,
    scanner: ScriptDirectoryScanner,
    load_permits: Arc<Semaphore>,
}

/// Builder for [`ScriptLoader`]
pub struct ScriptLoaderBuilder {
    config: LoaderConfig,
    compiler: Arc<dyn ScriptCompiler>,
    triggers: Arc<dyn TriggerRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl ScriptLoaderBuilder {
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> ScriptLoader {
        let scripts_dir = self.config.scripts_dir();
        let permits = self.config.max_parallel_loads();
        debug!(
            target: "scripting",
            "Creating script loader for {} ({} parallel loads)",
            scripts_dir.display(),
            permits
        );
        ScriptLoader {
            inner: Arc::new(LoaderInner {
                filter: PathFilter::new(self.sink.clone()),
                scanner: ScriptDirectoryScanner::new(self.sink.clone()),
                config: self.config,
                scripts_dir: Mutex::new(scripts_dir),
                registry: Mutex::new(ScriptRegistry::new()),
                state_lock: Mutex::new(()),
                compiler: self.compiler,
                triggers: self.triggers,
                sink: self.sink,
                load_permits: Arc::new(Semaphore::new(permits)),
            }),
        }
    }
}

/// Owns the set of loaded scripts and every operation that changes it.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Arc<LoaderInner>,
}

impl ScriptLoader {
    pub fn builder(
        compiler: Arc<dyn ScriptCompiler>,
        triggers: Arc<dyn TriggerRegistry>,
    ) -> ScriptLoaderBuilder {
        ScriptLoaderBuilder {
            config: LoaderConfig::default(),
            compiler,
            triggers,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Scripts root used for the state index; updated by every bulk load.
    pub fn scripts_dir(&self) -> PathBuf {
        lock(&self.inner.scripts_dir).clone()
    }

    fn registry(&self) -> MutexGuard<'_, ScriptRegistry> {
        lock(&self.inner.registry)
    }

    fn report(&self, err: LoaderError) {
        self.inner.sink.report(&Report::Error(err));
    }

    /// Snapshot of the loaded scripts, in no particular order
    pub fn loaded_scripts(&self) -> Vec<Script> {
        self.registry().iter().cloned().collect()
    }

    pub fn script_count(&self) -> usize {
        self.registry().len()
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.registry().contains(path)
    }

    /// Loaded script whose file name or simple name equals `name` (any case)
    pub fn find_by_name(&self, name: &str) -> Option<Script> {
        self.registry().find_by_name(name).cloned()
    }

    /// Replace the whole registry with the scripts found in `dir`.
    ///
    /// The registry is cleared up front. A script whose file vanished since
    /// the last bulk load stops being tracked and its triggers are cleared,
    /// as on unload. Candidates compile concurrently, at most
    /// `max_parallel_loads` at a time; a failure only drops that candidate.
    pub async fn load_directory(&self, dir: &Path) -> Vec<Script> {
        if !dir.is_dir() {
            self.report(LoaderError::NotADirectory {
                path: dir.to_path_buf(),
            });
            return Vec::new();
        }

        let start = Instant::now();
        let previous: Vec<Script> = {
            let mut registry = self.registry();
            let previous = registry.iter().cloned().collect();
            registry.clear();
            previous
        };
        *lock(&self.inner.scripts_dir) = dir.to_path_buf();
        self.reconcile_state(dir);

        let candidates: Vec<PathBuf> = self
            .inner
            .scanner
            .scan(dir, |path| self.inner.filter.is_loadable(path))
            .collect();

        // Candidates clear their own triggers right before compiling
        let kept: HashSet<&Path> = candidates.iter().map(PathBuf::as_path).collect();
        for script in previous.iter().filter(|s| !kept.contains(s.path())) {
            debug!(target: "scripting", "Dropping vanished script {}", script.file_name());
            self.inner.triggers.clear_triggers(&script.simple_name());
        }
        debug!(
            target: "scripting",
            "Loading {} candidate script(s) from {}",
            candidates.len(),
            dir.display()
        );

        let mut tasks = JoinSet::new();
        for path in candidates {
            let loader = self.clone();
            let permits = self.inner.load_permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                loader.compile(&path).await
            });
        }

        let mut scripts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(script)) => scripts.push(script),
                Ok(None) => {}
                Err(e) => error!(target: "scripting", "Script load task failed: {}", e),
            }
        }

        if scripts.is_empty() {
            self.inner.sink.report(&Report::NoScripts {
                dir: dir.to_path_buf(),
            });
            return scripts;
        }

        {
            let mut registry = self.registry();
            for script in &scripts {
                registry.insert(script.clone());
            }
        }
        self.inner.sink.report(&Report::ScriptsLoaded {
            count: scripts.len(),
            elapsed: start.elapsed(),
        });
        scripts
    }

    /// Load every candidate in `dir` one after another, keeping whatever is
    /// already loaded.
    pub async fn load_scripts_at(&self, dir: &Path) -> Vec<Script> {
        if !dir.is_dir() {
            self.report(LoaderError::NotADirectory {
                path: dir.to_path_buf(),
            });
            return Vec::new();
        }
        let candidates: Vec<PathBuf> = self
            .inner
            .scanner
            .scan(dir, |path| self.inner.filter.is_loadable(path))
            .collect();

        let mut scripts = Vec::with_capacity(candidates.len());
        for path in candidates {
            if let Some(script) = self.load_checked(&path).await {
                scripts.push(script);
            }
        }
        scripts
    }

    /// Load or reload the script at `path`.
    ///
    /// Paths that are not loadable scripts are skipped without a report,
    /// except reserved names and directories.
    pub async fn load_script(&self, path: &Path) -> Option<Script> {
        if path.is_dir() {
            self.report(LoaderError::IsDirectory {
                path: path.to_path_buf(),
            });
            return None;
        }
        if !self.inner.filter.is_loadable(path) {
            return None;
        }
        self.load_checked(path).await
    }

    async fn load_checked(&self, path: &Path) -> Option<Script> {
        let script = self.compile(path).await?;
        self.registry().insert(script.clone());
        Some(script)
    }

    /// Compile one script under the timeout. Any previous registration of the
    /// same path is dropped first and stays dropped if compilation fails.
    async fn compile(&self, path: &Path) -> Option<Script> {
        let script = match Script::new(path) {
            Ok(script) => script,
            Err(err) => {
                self.report(err);
                return None;
            }
        };
        let file_name = script.file_name();

        let previous = self.registry().remove(path);
        if previous.is_some() {
            debug!(target: "scripting", "Reloading {}", file_name);
        }
        // Must happen before compiling, or re-declared triggers register twice
        self.inner.triggers.clear_triggers(&script.simple_name());

        let debug = self.inner.config.debug;
        let compiler = self.inner.compiler.clone();
        let worker_script = script.clone();
        let (tx, rx) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name(format!("scroll-compile-{}", script.simple_name()))
            .spawn(move || {
                let mut logger = ScriptLogger::new(worker_script, debug);
                let path = logger.script().path().to_path_buf();
                let result = compiler.compile(&path, debug, &mut logger);
                let _ = tx.send((result, logger));
            });
        if let Err(source) = spawned {
            self.report(LoaderError::WorkerSpawn { file_name, source });
            return None;
        }

        let timeout = self.inner.config.load_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok((Ok(mut entries), mut logger))) => {
                logger.finalize();
                entries.extend(logger.close());
                self.inner.sink.print_logs(&entries, Local::now());
                debug!(target: "scripting", "Loaded script {}", file_name);
                Some(script)
            }
            Ok(Ok((Err(source), logger))) => {
                let entries = logger.close();
                if !entries.is_empty() {
                    self.inner.sink.print_logs(&entries, Local::now());
                }
                self.report(LoaderError::Compile { file_name, source });
                None
            }
            // Worker went away without answering, e.g. the compiler panicked
            Ok(Err(_)) => {
                self.report(LoaderError::LoadInterrupted { file_name });
                None
            }
            Err(_) => {
                self.report(LoaderError::LoadTimeout {
                    file_name,
                    after: timeout,
                });
                None
            }
        }
    }

    pub async fn reload_script(&self, script: &Script) -> Option<Script> {
        self.load_script(script.path()).await
    }

    /// Reload each script in turn. Failures were already reported and are left
    /// out of the result.
    pub async fn reload_scripts(&self, scripts: &[Script]) -> Vec<Script> {
        let mut reloaded = Vec::with_capacity(scripts.len());
        for script in scripts {
            if let Some(script) = self.reload_script(script).await {
                reloaded.push(script);
            }
        }
        reloaded
    }

    /// Enable the disabled script file at `path` (one starting with the
    /// disabled prefix) by renaming it, then load it.
    ///
    /// Refuses when the enabled name is already loaded or already exists.
    pub async fn enable_script(&self, path: &Path) -> Option<Script> {
        if !path.exists() {
            return None;
        }
        let target = enabled_path(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.is_loaded(&target) {
            self.report(LoaderError::EnableConflict { file_name, target });
            return None;
        }
        if target.exists() {
            self.report(LoaderError::EnableFailed {
                file_name,
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                ),
            });
            return None;
        }

        self.record_state(&target, ScriptState::Enabled, true);
        if let Err(source) = tokio::fs::rename(path, &target).await {
            self.record_state(&target, ScriptState::Disabled, false);
            self.report(LoaderError::EnableFailed { file_name, source });
            return None;
        }
        self.record_state(&target, ScriptState::Enabled, false);
        info!(target: "scripting", "Enabled {}", target.display());

        self.load_script(&target).await
    }

    pub async fn enable_scripts_at(&self, paths: &[PathBuf]) -> Vec<Script> {
        let mut enabled = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(script) = self.enable_script(path).await {
                enabled.push(script);
            }
        }
        enabled
    }

    /// Stop tracking `script` and rename its file to the disabled form.
    ///
    /// The script leaves the registry and its triggers are cleared even if the
    /// rename fails; the failure is reported and nothing is rolled back.
    pub async fn disable_script(&self, script: &Script) {
        let path = script.path();
        self.registry().remove(path);
        self.inner.triggers.clear_triggers(&script.simple_name());

        // Renamed or deleted behind our back
        if !path.exists() {
            return;
        }

        let target = disabled_path(path);
        if target.exists() {
            self.report(LoaderError::DisableFailed {
                file_name: script.file_name(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                ),
            });
            return;
        }

        self.record_state(path, ScriptState::Disabled, true);
        match tokio::fs::rename(path, &target).await {
            Ok(()) => {
                self.record_state(path, ScriptState::Disabled, false);
                info!(target: "scripting", "Disabled {}", script.file_name());
            }
            Err(source) => {
                self.record_state(path, ScriptState::Enabled, false);
                self.report(LoaderError::DisableFailed {
                    file_name: script.file_name(),
                    source,
                });
            }
        }
    }

    pub async fn disable_scripts(&self, scripts: &[Script]) {
        for script in scripts {
            self.disable_script(script).await;
        }
    }

    /// Forget `script` without touching its file, e.g. after it was deleted.
    pub fn unload_script(&self, script: &Script) -> bool {
        let removed = self.registry().remove(script.path()).is_some();
        self.inner.triggers.clear_triggers(&script.simple_name());
        if removed {
            debug!(target: "scripting", "Unloaded {}", script.file_name());
        }
        removed
    }

    fn record_state(&self, enabled: &Path, state: ScriptState, pending: bool) {
        if !self.inner.config.state_index {
            return;
        }
        let _guard = lock(&self.inner.state_lock);
        let result = ScriptStateIndex::open(&self.scripts_dir()).and_then(|mut index| {
            if pending {
                index.begin(enabled, state)
            } else {
                index.commit(enabled, state)
            }
        });
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn reconcile_state(&self, dir: &Path) {
        if !self.inner.config.state_index {
            return;
        }
        let _guard = lock(&self.inner.state_lock);
        match ScriptStateIndex::open(dir).and_then(|mut index| index.reconcile()) {
            Ok(renamed) if !renamed.is_empty() => {
                info!(
                    target: "scripting",
                    "Finished {} interrupted enable/disable rename(s)",
                    renamed.len()
                );
            }
            Ok(_) => {}
            Err(err) => self.report(err),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
