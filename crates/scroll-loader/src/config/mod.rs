pub mod loader_config;
pub mod paths;

pub use loader_config::{ConfigLoadError, LoaderConfig};
pub use paths::{default_config_path, default_scripts_dir, ensure_dir};
