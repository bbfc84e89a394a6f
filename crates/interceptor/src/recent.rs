//! History of names injected on this rig
//!
//! Kept as a small JSON file so an operator can re-inject a regular's name
//! without typing it again.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// History file name
const RECENT_FILE: &str = "recent_names.json";

/// Oldest names fall off past this many entries
pub const MAX_RECENT_NAMES: usize = 20;

/// `<config dir>/interceptor/recent_names.json`, or the bare file name when
/// no config directory can be determined.
pub fn default_recent_names_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join("interceptor").join(RECENT_FILE),
        None => PathBuf::from(RECENT_FILE),
    }
}

/// Recently injected names, newest first, without duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentNames {
    #[serde(rename = "nicknames", default)]
    names: Vec<String>,
}

impl RecentNames {
    /// Load the history. A missing or unreadable file yields an empty list.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("No recent names at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<RecentNames>(&content) {
            Ok(mut recent) => {
                recent.names.truncate(MAX_RECENT_NAMES);
                debug!("Loaded {} recent names", recent.names.len());
                recent
            }
            Err(e) => {
                warn!("Ignoring unreadable recent names file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved recent names to {}", path.display());
        Ok(())
    }

    /// Move `name` to the front. Blank names are ignored.
    ///
    /// Returns whether the list changed.
    pub fn record(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.names.first().is_some_and(|n| n == name) {
            return false;
        }
        self.names.retain(|n| n != name);
        self.names.insert(0, name.to_string());
        self.names.truncate(MAX_RECENT_NAMES);
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Zero-based lookup, newest first
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
