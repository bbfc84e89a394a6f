use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fileio::{FileAccess, FsAccess, read_with_retry, write_with_retry};
use crate::ini::{
    DRIVER_KEY, DRIVER_SECTION, PatchReport, PatchTarget, REMOTE_KEY, REMOTE_SECTION, patch_bytes,
};
use crate::retry::FixedDelay;

/// Writes a player name into the target file.
pub trait Injector: Send + Sync {
    fn inject(&self, name: &str) -> Result<PatchReport>;
}

/// Read, patch and write back a `race.ini`, retrying each I/O step.
pub struct RaceIniInjector {
    path: PathBuf,
    fields: Vec<(String, String)>,
    access: Arc<dyn FileAccess>,
    retry: FixedDelay,
}

impl RaceIniInjector {
    /// Patches `[CAR_0] DRIVER_NAME` and `[REMOTE] NAME` on the real filesystem.
    pub fn new<P: Into<PathBuf>>(path: P, retry: FixedDelay) -> Self {
        Self {
            path: path.into(),
            fields: vec![
                (DRIVER_SECTION.to_string(), DRIVER_KEY.to_string()),
                (REMOTE_SECTION.to_string(), REMOTE_KEY.to_string()),
            ],
            access: Arc::new(FsAccess),
            retry,
        }
    }

    /// Replace the `(section, key)` pairs that receive the name.
    pub fn with_fields<I, S, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, K)>,
        S: Into<String>,
        K: Into<String>,
    {
        self.fields = fields
            .into_iter()
            .map(|(s, k)| (s.into(), k.into()))
            .collect();
        self
    }

    pub fn with_access(mut self, access: Arc<dyn FileAccess>) -> Self {
        self.access = access;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn targets(&self, name: &str) -> Vec<PatchTarget> {
        self.fields
            .iter()
            .map(|(section, key)| PatchTarget::new(section.as_str(), key.as_str(), name))
            .collect()
    }
}

impl Injector for RaceIniInjector {
    fn inject(&self, name: &str) -> Result<PatchReport> {
        let original = read_with_retry(self.access.as_ref(), &self.path, &self.retry)?;
        let targets = self.targets(name);
        let (patched, report) = patch_bytes(&original, &targets);

        if report.is_empty() {
            warn!(
                "No target fields found in {}, nothing to inject",
                self.path.display()
            );
        }
        for target in report.missing(&targets) {
            debug!("[{}] {} not present", target.section, target.key);
        }

        if patched == original {
            debug!("{} already up to date, skipping write", self.path.display());
            return Ok(report);
        }

        write_with_retry(self.access.as_ref(), &self.path, &patched, &self.retry)?;
        for change in report.changes.iter().filter(|c| c.old_value != c.new_value) {
            info!(
                "Changed {}: '{}' -> '{}'",
                change.key, change.old_value, change.new_value
            );
        }
        Ok(report)
    }
}
