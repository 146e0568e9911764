//! Sidecar record of which scripts were enabled or disabled through the loader.
//!
//! The disabled prefix on disk stays the compatible representation. The index
//! journals every toggle: the intent is written first (`pending`), the file is
//! renamed, then the entry is committed. A crash between those steps leaves a
//! pending entry that [`ScriptStateIndex::reconcile`] finishes on the next bulk
//! load. Committed entries follow the disk, so renaming files by hand still
//! works.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LoaderError;
use crate::path_filter::DISABLED_PREFIX;

pub const STATE_INDEX_FILE: &str = ".scroll-state.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub state: ScriptState,
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    scripts: BTreeMap<String, ScriptRecord>,
}

/// Path of the disabled form of `enabled`, in the same directory
pub fn disabled_path(enabled: &Path) -> PathBuf {
    let file_name = enabled
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    enabled.with_file_name(format!("{DISABLED_PREFIX}{file_name}"))
}

/// Path of the enabled form of `disabled`, or `None` if it carries no prefix
pub fn enabled_path(disabled: &Path) -> Option<PathBuf> {
    let file_name = disabled.file_name()?.to_string_lossy();
    let stripped = file_name.strip_prefix(DISABLED_PREFIX)?;
    Some(disabled.with_file_name(stripped))
}

#[derive(Debug)]
pub struct ScriptStateIndex {
    root: PathBuf,
    path: PathBuf,
    scripts: BTreeMap<String, ScriptRecord>,
}

impl ScriptStateIndex {
    /// Open the index of the scripts directory `root`. A missing file is an
    /// empty index.
    pub fn open(root: &Path) -> Result<Self, LoaderError> {
        let path = root.join(STATE_INDEX_FILE);
        let scripts = match fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str::<IndexFile>(&content)
                    .map_err(|e| LoaderError::StateIndexParse {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
                    .scripts
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(LoaderError::StateIndexIo { path, source }),
        };
        Ok(Self {
            root: root.to_path_buf(),
            path,
            scripts,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_for(&self, enabled: &Path) -> Option<String> {
        let relative = enabled.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Record for the script whose enabled form is `enabled`
    pub fn get(&self, enabled: &Path) -> Option<ScriptRecord> {
        self.scripts.get(&self.key_for(enabled)?).copied()
    }

    /// Journal the intent to move `enabled` into `state`. Paths outside the
    /// scripts root are not tracked.
    pub fn begin(&mut self, enabled: &Path, state: ScriptState) -> Result<(), LoaderError> {
        self.put(enabled, ScriptRecord { state, pending: true })
    }

    /// Mark the toggle of `enabled` as finished with the state actually on disk.
    pub fn commit(&mut self, enabled: &Path, state: ScriptState) -> Result<(), LoaderError> {
        self.put(
            enabled,
            ScriptRecord {
                state,
                pending: false,
            },
        )
    }

    fn put(&mut self, enabled: &Path, record: ScriptRecord) -> Result<(), LoaderError> {
        let Some(key) = self.key_for(enabled) else {
            return Ok(());
        };
        if self.scripts.get(&key) == Some(&record) {
            return Ok(());
        }
        self.scripts.insert(key, record);
        self.save()
    }

    /// Finish interrupted toggles and bring committed entries in line with the
    /// files on disk. Returns the paths that were renamed.
    pub fn reconcile(&mut self) -> Result<Vec<PathBuf>, LoaderError> {
        let mut renamed = Vec::new();
        let mut changed = false;
        let keys: Vec<String> = self.scripts.keys().cloned().collect();

        for key in keys {
            let enabled = self.root.join(&key);
            let disabled = disabled_path(&enabled);
            let Some(record) = self.scripts.get(&key).copied() else {
                continue;
            };

            if record.pending {
                let (from, to) = match record.state {
                    ScriptState::Disabled => (&enabled, &disabled),
                    ScriptState::Enabled => (&disabled, &enabled),
                };
                if from.exists() && !to.exists() {
                    fs::rename(from, to).map_err(|source| LoaderError::StateIndexIo {
                        path: from.clone(),
                        source,
                    })?;
                    info!(
                        target: "scripting",
                        "Completed interrupted rename {} -> {}",
                        from.display(),
                        to.display()
                    );
                    renamed.push(to.clone());
                }
            }

            let on_disk = if enabled.exists() {
                Some(ScriptState::Enabled)
            } else if disabled.exists() {
                Some(ScriptState::Disabled)
            } else {
                None
            };
            let updated = on_disk.map(|state| ScriptRecord {
                state,
                pending: false,
            });
            if updated != Some(record) {
                debug!(target: "scripting", "State index entry {} now {:?}", key, updated);
                match updated {
                    Some(record) => self.scripts.insert(key, record),
                    None => self.scripts.remove(&key),
                };
                changed = true;
            }
        }

        if changed {
            self.save()?;
        }
        Ok(renamed)
    }

    fn save(&self) -> Result<(), LoaderError> {
        let file = IndexFile {
            scripts: self.scripts.clone(),
        };
        let content = toml::to_string_pretty(&file).map_err(|e| LoaderError::StateIndexParse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|source| LoaderError::StateIndexIo {
                path: self.path.clone(),
                source,
            })
    }
}
