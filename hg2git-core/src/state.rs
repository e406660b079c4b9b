use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use graph::Revision;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Durable mapping of source revision to git commit id: the memory that lets
/// an incremental run skip everything already converted.
///
/// Entries only ever accumulate. The map is held in memory for the whole run
/// and written back in one piece at the end; the on-disk layout is private
/// to this tool.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionState {
    versions: BTreeMap<Revision, String>,
}

impl ConversionState {
    /// Read a previously saved state. A missing file means a first run, not
    /// an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("state file {} does not exist, first run", path.display());
            return Ok(Self::default());
        }

        debug!("state file {} exists, reading", path.display());
        let data = fs::read(path)
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("state file {} is malformed", path.display()))
    }

    pub fn contains(&self, rev: Revision) -> bool {
        self.versions.contains_key(&rev)
    }

    pub fn commit_id(&self, rev: Revision) -> Option<&str> {
        self.versions.get(&rev).map(String::as_str)
    }

    /// Record a freshly created commit. Entries are never overwritten;
    /// recording the same revision twice is a bug in the caller.
    pub fn record(&mut self, rev: Revision, commit_id: String) {
        let previous = self.versions.insert(rev, commit_id);
        assert!(previous.is_none(), "revision {rev} recorded twice");
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Persist the whole mapping. The write goes through a temporary file
    /// followed by a rename, so a crash cannot leave a truncated state
    /// behind. `temp_dir` must be on the same filesystem as `path` for the
    /// rename to succeed.
    pub fn flush<P: AsRef<Path>>(&self, path: P, temp_dir: Option<&Path>) -> Result<()> {
        let path = path.as_ref();
        let fallback = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let dir = temp_dir.unwrap_or(fallback);

        let mut tmp = NamedTempFile::new_in(dir).with_context(|| {
            format!("failed to create a temporary state file in {}", dir.display())
        })?;
        serde_json::to_writer(&mut tmp, self).context("failed to serialize state")?;
        tmp.as_file().sync_all().context("failed to sync state")?;
        tmp.persist(path)
            .with_context(|| format!("failed to replace state file {}", path.display()))?;
        Ok(())
    }
}
