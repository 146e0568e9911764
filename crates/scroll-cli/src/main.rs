use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use scroll_loader::config::{default_config_path, ensure_dir};
use scroll_loader::path_filter::{classify, PathVerdict};
use scroll_loader::{
    setup_reload_signal, ChangeScanner, ConfigLoadError, LoaderConfig, Script,
    ScriptDirectoryScanner, ScriptLoader, TracingSink, DISABLED_PREFIX, SCRIPT_EXTENSION,
};

mod check;
mod logging;

use check::{NoopTriggers, SourceCheckCompiler};

#[derive(Parser)]
#[command(version, about = "Load, enable and disable .scroll scripts", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scripts directory, overrides the config file
    #[arg(short, long)]
    scripts_dir: Option<PathBuf>,

    /// Enables debug output
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Also write logs to logs/scroll.log next to the scripts directory
    #[arg(long, conflicts_with = "log_file")]
    log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every script in the scripts directory
    Load,
    /// List script files and whether they would load
    List,
    /// Enable disabled scripts (by file name, with or without the prefix)
    Enable {
        #[arg(allow_hyphen_values = true)]
        names: Vec<String>,
    },
    /// Disable scripts
    Disable {
        #[arg(allow_hyphen_values = true)]
        names: Vec<String>,
    },
    /// Load everything, then reload the named scripts (all if none given)
    Reload {
        #[arg(allow_hyphen_values = true)]
        names: Vec<String>,
    },
    /// Load everything and keep reloading on file changes or SIGUSR2
    Watch,
    /// Write a default config file
    InitConfig,
}

fn load_config(path: &Path) -> Result<LoaderConfig> {
    match LoaderConfig::load(path) {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => Ok(LoaderConfig::default()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Resolve a command line name to a path in the scripts directory.
fn resolve(scripts_dir: &Path, name: &str, disabled: bool) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.is_absolute() || direct.components().count() > 1 {
        return direct;
    }
    let mut file_name = name.trim_start_matches(DISABLED_PREFIX).to_string();
    if !file_name.ends_with(SCRIPT_EXTENSION) {
        file_name.push_str(SCRIPT_EXTENSION);
    }
    if disabled {
        file_name.insert_str(0, DISABLED_PREFIX);
    }
    scripts_dir.join(file_name)
}

fn list(scripts_dir: &Path) {
    let scanner = ScriptDirectoryScanner::new(Arc::new(TracingSink));
    let mut rows: Vec<(String, &str)> = scanner
        .scan(scripts_dir, |_| true)
        .filter_map(|path| {
            let status = match classify(&path) {
                PathVerdict::Loadable => "enabled",
                PathVerdict::Disabled => "disabled",
                PathVerdict::Reserved(_) => "reserved",
                PathVerdict::Directory | PathVerdict::WrongExtension => return None,
            };
            let shown = path.strip_prefix(scripts_dir).unwrap_or(&path);
            Some((shown.display().to_string(), status))
        })
        .collect();
    rows.sort();
    for (name, status) in rows {
        println!("{status:<9} {name}");
    }
}

async fn watch(loader: &ScriptLoader, scripts_dir: &Path) -> Result<()> {
    loader.load_directory(scripts_dir).await;

    let config = loader.config();
    let mut reload_rx = setup_reload_signal();
    let mut scanner =
        ChangeScanner::with_interval(scripts_dir.to_path_buf(), config.hot_reload_interval());
    let mut ticker = tokio::time::interval(scanner.scan_interval());
    let mut signal_open = true;
    info!(
        "Watching {} (hot reload: {}, SIGUSR2 reloads everything)",
        scripts_dir.display(),
        config.hot_reload
    );

    loop {
        tokio::select! {
            changed = reload_rx.changed(), if signal_open => {
                if changed.is_err() {
                    warn!("Reload signal handler stopped");
                    signal_open = false;
                    continue;
                }
                loader.load_directory(scripts_dir).await;
                scanner = ChangeScanner::with_interval(
                    scripts_dir.to_path_buf(),
                    config.hot_reload_interval(),
                );
            }
            _ = ticker.tick(), if config.hot_reload => {
                let changes = scanner.scan_changes();
                if changes.has_changes() {
                    let reloaded = loader.apply_changes(&changes).await;
                    info!("Reloaded {} changed script(s)", reloaded.len());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Command::InitConfig = cli.command {
        if config_path.exists() {
            bail!(
                "Config file already exists at {}. Edit it or delete it first.",
                config_path.display()
            );
        }
        LoaderConfig::default()
            .save(&config_path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("writing {}", config_path.display()))?;
        eprintln!("Config file created at: {}", config_path.display());
        return Ok(());
    }

    let mut config = load_config(&config_path)?;
    if let Some(dir) = cli.scripts_dir {
        config.scripts_dir = Some(dir);
    }
    config.debug |= cli.debug > 0;

    let log_file = match cli.log_file {
        Some(path) => Some(path),
        None if cli.log => Some(logging::default_log_path(&config.scripts_dir())),
        None => None,
    };
    let _log_guard =
        logging::init_logging(config.debug, log_file.as_deref()).context("initialising logging")?;

    let scripts_dir = ensure_dir(&config.scripts_dir())
        .with_context(|| format!("creating {}", config.scripts_dir().display()))?;
    let loader = ScriptLoader::builder(Arc::new(SourceCheckCompiler), Arc::new(NoopTriggers))
        .with_config(config)
        .build();

    match cli.command {
        Command::Load => {
            for script in loader.load_directory(&scripts_dir).await {
                println!("{}", script.file_name());
            }
        }
        Command::List => list(&scripts_dir),
        Command::Enable { names } => {
            let paths: Vec<PathBuf> = names
                .iter()
                .map(|name| resolve(&scripts_dir, name, true))
                .collect();
            for script in loader.enable_scripts_at(&paths).await {
                println!("enabled {}", script.file_name());
            }
        }
        Command::Disable { names } => {
            let mut scripts = Vec::with_capacity(names.len());
            for name in &names {
                let path = resolve(&scripts_dir, name, false);
                match Script::new(path) {
                    Ok(script) => scripts.push(script),
                    Err(err) => warn!("{}", err),
                }
            }
            loader.disable_scripts(&scripts).await;
        }
        Command::Reload { names } => {
            let loaded = loader.load_directory(&scripts_dir).await;
            let targets: Vec<Script> = if names.is_empty() {
                loaded
            } else {
                names
                    .iter()
                    .filter_map(|name| {
                        let found = loader.find_by_name(name);
                        if found.is_none() {
                            warn!("No loaded script named {}", name);
                        }
                        found
                    })
                    .collect()
            };
            let reloaded = loader.reload_scripts(&targets).await;
            println!("reloaded {}/{} script(s)", reloaded.len(), targets.len());
        }
        Command::Watch => watch(&loader, &scripts_dir).await?,
        // Handled before logging is set up
        Command::InitConfig => {}
    }

    Ok(())
}
