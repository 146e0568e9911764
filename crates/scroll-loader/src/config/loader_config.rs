use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::paths::default_scripts_dir;

/// Hard upper bound for compiling a single script
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found")]
    NotFound,
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Directory containing scripts (default: <data dir>/scripts)
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,

    /// Passed to the compiler; enables debug-level parser diagnostics
    #[serde(default)]
    pub debug: bool,

    /// Upper bound on concurrent compilations during a bulk load
    /// (default: twice the available cores)
    #[serde(default)]
    pub max_parallel_loads: Option<usize>,

    /// Per-script compile timeout in seconds (default: 600)
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Keep a sidecar index of enabled/disabled state next to the scripts
    #[serde(default = "default_true")]
    pub state_index: bool,

    /// Poll the scripts directory and reload changed scripts (default: true)
    #[serde(default = "default_true")]
    pub hot_reload: bool,

    /// Hot reload scan interval in milliseconds (default: 1000ms)
    #[serde(default = "default_hot_reload_interval")]
    pub hot_reload_interval_ms: u64,
}

fn default_load_timeout_secs() -> u64 {
    DEFAULT_LOAD_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_hot_reload_interval() -> u64 {
    1000
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scripts_dir: None,
            debug: false,
            max_parallel_loads: None,
            load_timeout_secs: default_load_timeout_secs(),
            state_index: true,
            hot_reload: true,
            hot_reload_interval_ms: default_hot_reload_interval(),
        }
    }
}

impl LoaderConfig {
    /// Get the scripts directory (configured or default)
    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_dir.clone().unwrap_or_else(default_scripts_dir)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }

    /// Worker cap for bulk loads, never zero
    pub fn max_parallel_loads(&self) -> usize {
        self.max_parallel_loads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get() * 2)
                    .unwrap_or(2)
            })
            .max(1)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert!(!config.debug);
        assert!(config.state_index);
        assert_eq!(config.load_timeout(), Duration::from_secs(600));
        assert!(config.max_parallel_loads() >= 1);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: LoaderConfig = toml::from_str("").unwrap();
        assert_eq!(config, LoaderConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let config: LoaderConfig = toml::from_str(
            r#"
            scripts_dir = "/srv/scroll/scripts"
            debug = true
            max_parallel_loads = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.scripts_dir(), PathBuf::from("/srv/scroll/scripts"));
        assert!(config.debug);
        // Zero would stall every bulk load
        assert_eq!(config.max_parallel_loads(), 1);
        assert_eq!(config.load_timeout_secs, 600);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = LoaderConfig::load(&temp_dir.path().join("config.toml"));
        assert!(matches!(result, Err(ConfigLoadError::NotFound)));
    }

    #[test]
    fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "debug = \"yes please\"").unwrap();
        assert!(matches!(
            LoaderConfig::load(&path),
            Err(ConfigLoadError::ParseError(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let config = LoaderConfig {
            debug: true,
            load_timeout_secs: 30,
            ..Default::default()
        };

        config.save(&path).unwrap();
        assert_eq!(LoaderConfig::load(&path).unwrap(), config);
    }
}
