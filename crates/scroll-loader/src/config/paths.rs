use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::info;

const APP_NAME: &str = "scroll";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "scrolllang", APP_NAME)
}

/// Default scripts directory: `<data dir>/scripts`, or `./scroll/scripts` when
/// no home directory can be determined.
pub fn default_scripts_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("scripts"))
        .unwrap_or_else(|| PathBuf::from(APP_NAME).join("scripts"))
}

/// Default config file: `<config dir>/config.toml`
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(APP_NAME).join("config.toml"))
}

/// Return `path`, creating it and its parents first if it does not exist.
pub fn ensure_dir(path: &Path) -> io::Result<PathBuf> {
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!(target: "scripting", "Created directory {}", path.display());
    }
    Ok(path.to_path_buf())
}
