use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::script::Script;

/// Scripts currently loaded, keyed by path
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<PathBuf, Script>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the script with the same path.
    pub fn insert(&mut self, script: Script) {
        self.scripts.insert(script.path().to_path_buf(), script);
    }

    pub fn remove(&mut self, path: &Path) -> Option<Script> {
        self.scripts.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&Script> {
        self.scripts.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.scripts.contains_key(path)
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// First script whose file name or simple name equals `name`, ignoring case.
    ///
    /// Iteration order is unspecified, so if two scripts share a name across
    /// directories either one may be returned.
    pub fn find_by_name(&self, name: &str) -> Option<&Script> {
        self.scripts.values().find(|script| script.matches_name(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }
}
