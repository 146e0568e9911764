//! End-to-end tests for the script loader against a real scripts directory
//!
//! The compiler is faked: it records what it was asked to compile and can be
//! told to fail, panic or hang for specific files.

use scroll_loader::state_index::{ScriptState, ScriptStateIndex, STATE_INDEX_FILE};
use scroll_loader::{
    ChangeScanner, CompileError, LoaderConfig, LogEntry, LogLevel, RecordingSink, Script,
    ScriptCompiler, ScriptLoader, ScriptLogger, TriggerRegistry,
};
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Shared, ordered record of compiler and trigger registry calls
#[derive(Default)]
struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct FakeCompiler {
    log: Arc<CallLog>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    slow: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeCompiler {
    fn with_log(log: Arc<CallLog>) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    fn fail(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    fn hang(&self, file_name: &str) {
        self.slow.lock().unwrap().insert(file_name.to_string());
    }

    fn panic_on(&self, file_name: &str) {
        self.panicking.lock().unwrap().insert(file_name.to_string());
    }
}

impl ScriptCompiler for FakeCompiler {
    fn compile(
        &self,
        path: &Path,
        debug: bool,
        logger: &mut ScriptLogger,
    ) -> Result<Vec<LogEntry>, CompileError> {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(logger.script().path(), path, "logger attributed to wrong script");
        self.log.push(format!("compile:{file_name}"));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.slow.lock().unwrap().contains(&file_name) {
            thread::sleep(Duration::from_secs(3));
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.lock().unwrap().contains(&file_name) {
            panic!("compiler blew up on {file_name}");
        }
        if self.failing.lock().unwrap().contains(&file_name) {
            logger.error("unknown statement", Some("check the spelling".into()));
            return Err(CompileError::Syntax {
                message: "unknown statement".into(),
                line: Some(1),
            });
        }

        logger.debug(format!("debug={debug}"));
        Ok(vec![LogEntry::new(LogLevel::Info, format!("parsed {file_name}"))])
    }
}

struct RecordingTriggers {
    log: Arc<CallLog>,
}

impl TriggerRegistry for RecordingTriggers {
    fn clear_triggers(&self, key: &str) {
        self.log.push(format!("clear:{key}"));
    }
}

struct Harness {
    dir: TempDir,
    loader: ScriptLoader,
    compiler: Arc<FakeCompiler>,
    sink: Arc<RecordingSink>,
    log: Arc<CallLog>,
}

impl Harness {
    fn new() -> Self {
        Self::with(|config| config, FakeCompiler::with_log)
    }

    fn with(
        configure: impl FnOnce(LoaderConfig) -> LoaderConfig,
        compiler: impl FnOnce(Arc<CallLog>) -> FakeCompiler,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let log = Arc::new(CallLog::default());
        let compiler = Arc::new(compiler(log.clone()));
        let sink = Arc::new(RecordingSink::default());
        let config = configure(LoaderConfig {
            scripts_dir: Some(dir.path().to_path_buf()),
            load_timeout_secs: 1,
            ..Default::default()
        });
        let loader = ScriptLoader::builder(
            compiler.clone(),
            Arc::new(RecordingTriggers { log: log.clone() }),
        )
        .with_config(config)
        .with_sink(sink.clone())
        .build();

        Self {
            dir,
            loader,
            compiler,
            sink,
            log,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn touch(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap();
        path
    }
}

fn relative_names(root: &Path, scripts: &[Script]) -> BTreeSet<String> {
    scripts
        .iter()
        .map(|s| {
            s.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[tokio::test]
async fn test_bulk_load_scenario() {
    let h = Harness::new();
    h.touch("a.scroll");
    h.touch("-b.scroll");
    h.touch("config.scroll");
    h.touch("sub/c.scroll");

    let scripts = h.loader.load_directory(h.root()).await;

    let expected: BTreeSet<String> = ["a.scroll", "sub/c.scroll"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(relative_names(h.root(), &scripts), expected);
    assert_eq!(relative_names(h.root(), &h.loader.loaded_scripts()), expected);

    let reports = h.sink.reports();
    assert_eq!(reports.len(), 2, "unexpected reports: {reports:?}");
    assert!(reports.iter().any(|r| r.contains("config.scroll") && r.contains("reserved")));
    assert!(reports.iter().any(|r| r.starts_with("scripts loaded: 2")));
}

#[tokio::test]
async fn test_bulk_load_only_registers_loadable_paths_inside_dir() {
    let h = Harness::new();
    h.touch("a.scroll");
    h.touch("notes.txt");
    h.touch("sub/b.scroll");
    h.touch("sub/deeper/too_deep.scroll");
    h.touch("LANG.scroll");

    h.loader.load_directory(h.root()).await;

    for script in h.loader.loaded_scripts() {
        let relative = script.path().strip_prefix(h.root()).unwrap();
        assert!(relative.components().count() <= 2, "{}", relative.display());
        assert!(scroll_loader::path_filter::classify(script.path()).is_loadable());
    }
    assert_eq!(h.loader.script_count(), 2);
}

#[tokio::test]
async fn test_bulk_load_replaces_registry() {
    let h = Harness::new();
    let a = h.touch("a.scroll");
    h.touch("b.scroll");
    assert_eq!(h.loader.load_directory(h.root()).await.len(), 2);

    fs::remove_file(&a).unwrap();
    let scripts = h.loader.load_directory(h.root()).await;

    assert_eq!(scripts.len(), 1);
    assert!(!h.loader.is_loaded(&a));
}

#[tokio::test]
async fn test_bulk_load_clears_triggers_of_vanished_scripts() {
    let h = Harness::new();
    h.touch("a.scroll");
    let b = h.touch("b.scroll");
    h.loader.load_directory(h.root()).await;

    fs::remove_file(&b).unwrap();
    let before = h.log.calls().len();
    h.loader.load_directory(h.root()).await;

    let calls = h.log.calls()[before..].to_vec();
    assert_eq!(calls.iter().filter(|c| *c == "clear:b").count(), 1);
    assert_eq!(calls.iter().filter(|c| *c == "clear:a").count(), 1);
    assert!(!calls.contains(&"compile:b.scroll".to_string()));
    let clear_b = calls.iter().position(|c| c == "clear:b").unwrap();
    let compile_a = calls.iter().position(|c| c == "compile:a.scroll").unwrap();
    assert!(clear_b < compile_a);
}

#[tokio::test]
async fn test_bulk_load_failure_does_not_abort_others() {
    let h = Harness::new();
    h.touch("good.scroll");
    h.touch("bad.scroll");
    h.touch("worse.scroll");
    h.compiler.fail("bad.scroll");
    h.compiler.panic_on("worse.scroll");

    let scripts = h.loader.load_directory(h.root()).await;

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].file_name(), "good.scroll");
    assert_eq!(h.sink.error_count(), 2);
    let reports = h.sink.reports();
    assert!(reports.iter().any(|r| r.contains("bad.scroll") && r.contains("unknown statement")));
    assert!(reports.iter().any(|r| r.contains("worse.scroll") && r.contains("interrupted")));
}

#[tokio::test]
async fn test_bulk_load_empty_directory_warns() {
    let h = Harness::new();
    h.touch("-disabled.scroll");

    let scripts = h.loader.load_directory(h.root()).await;

    assert!(scripts.is_empty());
    assert_eq!(h.sink.error_count(), 0);
    assert_eq!(h.sink.reports().len(), 1);
    assert!(h.sink.reports()[0].starts_with("no scripts found"));
}

#[tokio::test]
async fn test_bulk_load_rejects_non_directory() {
    let h = Harness::new();
    let file = h.touch("a.scroll");

    assert!(h.loader.load_directory(&file).await.is_empty());
    assert!(h.loader.load_directory(&h.root().join("missing")).await.is_empty());
    assert_eq!(h.sink.error_count(), 2);
}

#[tokio::test]
async fn test_bulk_load_respects_worker_cap() {
    let h = Harness::with(
        |config| LoaderConfig {
            max_parallel_loads: Some(2),
            ..config
        },
        |log| FakeCompiler {
            delay: Some(Duration::from_millis(100)),
            ..FakeCompiler::with_log(log)
        },
    );
    for i in 0..6 {
        h.touch(&format!("s{i}.scroll"));
    }

    let scripts = h.loader.load_directory(h.root()).await;

    assert_eq!(scripts.len(), 6);
    let max = h.compiler.max_running.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max concurrent compilations was {max}");
}

#[tokio::test]
async fn test_parallel_diagnostics_are_attributed_per_script() {
    let h = Harness::with(
        |config| LoaderConfig {
            debug: true,
            max_parallel_loads: Some(4),
            ..config
        },
        |log| FakeCompiler {
            delay: Some(Duration::from_millis(20)),
            ..FakeCompiler::with_log(log)
        },
    );
    for i in 0..8 {
        h.touch(&format!("s{i}.scroll"));
    }

    h.loader.load_directory(h.root()).await;

    let entries = h.sink.entries();
    let debug_entries: Vec<_> = entries
        .iter()
        .filter(|e| e.level == LogLevel::Debug)
        .collect();
    assert_eq!(debug_entries.len(), 8);
    assert!(debug_entries.iter().all(|e| e.message == "debug=true"));
    let attributed: BTreeSet<_> = debug_entries
        .iter()
        .map(|e| e.file_name.clone().unwrap())
        .collect();
    assert_eq!(attributed.len(), 8);
}

#[tokio::test]
async fn test_load_script_silently_skips_unloadable() {
    let h = Harness::new();
    let disabled = h.touch("-a.scroll");
    let text = h.touch("a.txt");

    assert!(h.loader.load_script(&disabled).await.is_none());
    assert!(h.loader.load_script(&text).await.is_none());
    assert!(h.sink.reports().is_empty());
    assert!(h.log.calls().is_empty());
}

#[tokio::test]
async fn test_load_script_reports_directory_and_reserved() {
    let h = Harness::new();
    fs::create_dir(h.root().join("folder.scroll")).unwrap();
    let reserved = h.touch("Settings.scroll");

    assert!(h.loader.load_script(&h.root().join("folder.scroll")).await.is_none());
    assert!(h.loader.load_script(&reserved).await.is_none());
    assert_eq!(h.sink.error_count(), 2);
}

#[tokio::test]
async fn test_triggers_cleared_before_each_compile() {
    let h = Harness::new();
    let path = h.touch("Greet.scroll");

    let script = h.loader.load_script(&path).await.unwrap();
    h.loader.reload_script(&script).await.unwrap();

    assert_eq!(
        h.log.calls(),
        vec![
            "clear:Greet",
            "compile:Greet.scroll",
            "clear:Greet",
            "compile:Greet.scroll"
        ]
    );
    assert_eq!(h.loader.script_count(), 1);
}

#[tokio::test]
async fn test_compile_entries_are_flushed() {
    let h = Harness::new();
    let path = h.touch("greet.scroll");

    h.loader.load_script(&path).await.unwrap();

    let entries = h.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "parsed greet.scroll");
}

#[tokio::test]
async fn test_compile_failure_is_reported_with_file_name() {
    let h = Harness::new();
    let path = h.touch("broken.scroll");
    h.compiler.fail("broken.scroll");

    assert!(h.loader.load_script(&path).await.is_none());

    assert!(!h.loader.is_loaded(&path));
    assert_eq!(h.sink.error_count(), 1);
    assert!(h.sink.reports()[0].contains("broken.scroll"));
    // What the logger collected before failing still reaches the sink
    let entries = h.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].tip.as_deref(), Some("check the spelling"));
}

#[tokio::test]
async fn test_timeout_leaves_script_unloaded() {
    let h = Harness::new();
    let path = h.touch("slow.scroll");
    h.compiler.hang("slow.scroll");

    assert!(h.loader.load_script(&path).await.is_none());

    assert!(!h.loader.is_loaded(&path));
    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("slow.scroll"));
    assert!(reports[0].contains("timed out"));
}

#[tokio::test]
async fn test_reload_then_timeout_drops_stale_entry() {
    let h = Harness::new();
    let path = h.touch("slow.scroll");
    let script = h.loader.load_script(&path).await.unwrap();
    assert!(h.loader.is_loaded(&path));

    h.compiler.hang("slow.scroll");
    assert!(h.loader.reload_script(&script).await.is_none());

    assert!(!h.loader.is_loaded(&path));
    assert!(h.loader.find_by_name("slow").is_none());
}

#[tokio::test]
async fn test_find_by_name() {
    let h = Harness::new();
    h.touch("foo.scroll");
    h.loader.load_directory(h.root()).await;

    let by_file = h.loader.find_by_name("foo.scroll").unwrap();
    let by_simple = h.loader.find_by_name("Foo").unwrap();
    assert_eq!(by_file, by_simple);
    assert!(h.loader.find_by_name("bar").is_none());
}

#[tokio::test]
async fn test_enable_conflict_leaves_file_alone() {
    let h = Harness::new();
    let a = h.touch("a.scroll");
    h.loader.load_script(&a).await.unwrap();
    fs::remove_file(&a).unwrap();
    let disabled = h.touch("-a.scroll");

    assert!(h.loader.enable_script(&disabled).await.is_none());

    assert!(disabled.exists());
    assert!(!a.exists());
    assert_eq!(h.sink.error_count(), 1);
    assert!(h.sink.reports()[0].contains("already loaded"));
}

#[tokio::test]
async fn test_enable_refuses_to_overwrite_existing_file() {
    let h = Harness::new();
    let a = h.touch("a.scroll");
    fs::write(&a, "keep me").unwrap();
    let disabled = h.touch("-a.scroll");

    assert!(h.loader.enable_script(&disabled).await.is_none());

    assert!(disabled.exists());
    assert_eq!(fs::read_to_string(&a).unwrap(), "keep me");
    assert_eq!(h.sink.error_count(), 1);
}

#[tokio::test]
async fn test_enable_ignores_missing_or_unprefixed() {
    let h = Harness::new();
    let a = h.touch("a.scroll");

    assert!(h.loader.enable_script(&a).await.is_none());
    assert!(h
        .loader
        .enable_script(&h.root().join("-missing.scroll"))
        .await
        .is_none());
    assert!(h.sink.reports().is_empty());
    assert!(a.exists());
}

#[tokio::test]
async fn test_enable_disable_round_trip() {
    let h = Harness::new();
    let disabled = h.touch("sub/-x.scroll");
    let enabled = h.root().join("sub").join("x.scroll");

    let script = h.loader.enable_script(&disabled).await.unwrap();
    assert_eq!(script.path(), enabled);
    assert!(enabled.exists() && !disabled.exists());
    assert!(h.loader.is_loaded(&enabled));

    h.loader.disable_script(&script).await;

    assert!(disabled.exists() && !enabled.exists());
    assert!(!h.loader.is_loaded(&enabled));
    assert!(h.log.calls().ends_with(&["clear:x".to_string()]));
    assert_eq!(h.sink.error_count(), 0);

    let index = ScriptStateIndex::open(h.root()).unwrap();
    let record = index.get(&enabled).unwrap();
    assert_eq!(record.state, ScriptState::Disabled);
    assert!(!record.pending);
}

#[tokio::test]
async fn test_disable_missing_file_still_untracks() {
    let h = Harness::new();
    let path = h.touch("gone.scroll");
    let script = h.loader.load_script(&path).await.unwrap();
    fs::remove_file(&path).unwrap();

    h.loader.disable_script(&script).await;

    assert!(!h.loader.is_loaded(&path));
    assert!(h.sink.reports().is_empty());
    assert!(!h.root().join("-gone.scroll").exists());
}

#[tokio::test]
async fn test_disable_rename_failure_still_untracks() {
    let h = Harness::new();
    let path = h.touch("a.scroll");
    let disabled = h.touch("-a.scroll");
    let script = h.loader.load_script(&path).await.unwrap();

    h.loader.disable_script(&script).await;

    assert!(!h.loader.is_loaded(&path));
    assert_eq!(h.log.calls().last().map(String::as_str), Some("clear:a"));
    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1, "unexpected reports: {reports:?}");
    assert!(reports[0].starts_with("failed to disable a.scroll"));
    assert_eq!(h.sink.error_count(), 1);
    assert!(path.exists() && disabled.exists());
}

#[tokio::test]
async fn test_batch_enable_and_disable() {
    let h = Harness::new();
    let paths = vec![
        h.touch("-a.scroll"),
        h.touch("-b.scroll"),
        h.root().join("-missing.scroll"),
    ];

    let enabled = h.loader.enable_scripts_at(&paths).await;
    assert_eq!(enabled.len(), 2);
    assert_eq!(h.loader.script_count(), 2);

    h.loader.disable_scripts(&enabled).await;
    assert_eq!(h.loader.script_count(), 0);
    assert!(paths[0].exists() && paths[1].exists());
}

#[tokio::test]
async fn test_reload_scripts_drops_failures() {
    let h = Harness::new();
    h.touch("a.scroll");
    h.touch("b.scroll");
    let scripts = h.loader.load_directory(h.root()).await;
    h.compiler.fail("b.scroll");

    let reloaded = h.loader.reload_scripts(&scripts).await;

    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].file_name(), "a.scroll");
    assert_eq!(h.loader.script_count(), 1);
}

#[tokio::test]
async fn test_load_scripts_at_keeps_existing() {
    let h = Harness::new();
    let first = h.touch("a.scroll");
    h.loader.load_script(&first).await.unwrap();
    let extra = TempDir::new().unwrap();
    File::create(extra.path().join("b.scroll")).unwrap();

    let loaded = h.loader.load_scripts_at(extra.path()).await;

    assert_eq!(loaded.len(), 1);
    assert_eq!(h.loader.script_count(), 2);
    assert!(h.loader.is_loaded(&first));
}

#[tokio::test]
async fn test_bulk_load_finishes_interrupted_disable() {
    let h = Harness::new();
    let a = h.touch("a.scroll");
    h.touch("b.scroll");
    let mut index = ScriptStateIndex::open(h.root()).unwrap();
    index.begin(&a, ScriptState::Disabled).unwrap();
    assert!(h.root().join(STATE_INDEX_FILE).exists());

    let scripts = h.loader.load_directory(h.root()).await;

    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].file_name(), "b.scroll");
    assert!(h.root().join("-a.scroll").exists());
}

#[tokio::test]
async fn test_state_index_can_be_turned_off() {
    let h = Harness::with(
        |config| LoaderConfig {
            state_index: false,
            ..config
        },
        FakeCompiler::with_log,
    );
    let disabled = h.touch("-a.scroll");

    let script = h.loader.enable_script(&disabled).await.unwrap();
    h.loader.disable_script(&script).await;

    assert!(disabled.exists());
    assert!(!h.root().join(STATE_INDEX_FILE).exists());
}

#[tokio::test]
async fn test_apply_changes_from_scanner() {
    let h = Harness::new();
    let a = h.touch("a.scroll");
    h.loader.load_directory(h.root()).await;
    let mut scanner = ChangeScanner::new(h.root().to_path_buf());

    fs::remove_file(&a).unwrap();
    let b = h.touch("b.scroll");
    let changes = scanner.scan_changes();
    let loaded = h.loader.apply_changes(&changes).await;

    assert_eq!(loaded.len(), 1);
    assert!(h.loader.is_loaded(&b));
    assert!(!h.loader.is_loaded(&a));
    assert!(h.log.calls().contains(&"clear:a".to_string()));
}
