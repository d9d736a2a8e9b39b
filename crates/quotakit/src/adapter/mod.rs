//! Filesystem adapters.
//!
//! One adapter per backend family: [`gpfs`] for block-style backends that
//! keep a colon-delimited snapshot and support live queries, [`vast`] for
//! object-style backends that only ever serve a JSON snapshot.

pub mod gpfs;
pub mod vast;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::error::Result;
use crate::types::QuotaRecord;

/// Backend family of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Block-style backend with colon-delimited reports and a live tool
    Gpfs,
    /// Object-style backend served from a periodic JSON snapshot
    Vast,
}

/// One mounted filesystem the report can draw records from.
#[derive(Debug, Clone, Deserialize)]
pub struct Mount {
    /// Mount point, e.g. `/gpfs/gibbs`
    pub path: PathBuf,
    /// Short name used to namespace filesets, e.g. `gibbs`
    pub short_name: String,
    /// Backend family
    pub backend: Backend,
    /// Backend device name for live queries; block-style only
    #[serde(default)]
    pub device: Option<String>,
    /// Whether the live path also queries the per-user home view.
    /// False for shared filesystems that carry no per-user home quotas.
    #[serde(default = "default_true")]
    pub user_home_query: bool,
    /// Secondary snapshot files merged into the main one, as they exist
    #[serde(default)]
    pub extra_snapshots: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Mount {
    /// A mount with defaults suitable for tests and simple topologies.
    pub fn new(path: impl Into<PathBuf>, short_name: impl Into<String>, backend: Backend) -> Self {
        Self {
            path: path.into(),
            short_name: short_name.into(),
            backend,
            device: None,
            user_home_query: true,
            extra_snapshots: Vec::new(),
        }
    }

    /// Builder-style device name for live queries.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Path of this mount's primary snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        match self.backend {
            Backend::Gpfs => self.path.join(".mmrepquota").join("current"),
            Backend::Vast => self.path.join(".quotas").join("current"),
        }
    }

    /// Modification time of the primary snapshot, if it exists.
    pub fn snapshot_mtime(&self) -> Option<DateTime<Local>> {
        mtime(&self.snapshot_path())
    }

    /// True when `fileset` is namespaced to this mount.
    pub fn owns(&self, fileset: &str) -> bool {
        fileset
            .split_once(':')
            .is_some_and(|(prefix, _)| prefix == self.short_name)
    }
}

fn mtime(path: &Path) -> Option<DateTime<Local>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::from(modified))
}

/// Read a mount's snapshot with the adapter matching its backend.
pub fn read_snapshot(mount: &Mount) -> Result<Vec<QuotaRecord>> {
    match mount.backend {
        Backend::Gpfs => gpfs::read_snapshot(mount),
        Backend::Vast => vast::read_snapshot(mount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_paths_per_backend() {
        let gpfs = Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs);
        assert_eq!(
            gpfs.snapshot_path(),
            PathBuf::from("/gpfs/gibbs/.mmrepquota/current")
        );

        let vast = Mount::new("/vast/palmer", "palmer", Backend::Vast);
        assert_eq!(
            vast.snapshot_path(),
            PathBuf::from("/vast/palmer/.quotas/current")
        );
    }

    #[test]
    fn test_owns_matches_namespace_prefix() {
        let mount = Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs);
        assert!(mount.owns("gibbs:pi_smith"));
        assert!(!mount.owns("loomis:pi_smith"));
        assert!(!mount.owns("pi_smith"));
    }

    #[test]
    fn test_mount_deserializes_from_toml_shape() {
        let mount: Mount = toml_like(
            r#"{"path": "/gpfs/gibbs", "short_name": "gibbs", "backend": "gpfs",
                "device": "gibbs", "user_home_query": false}"#,
        );
        assert_eq!(mount.backend, Backend::Gpfs);
        assert_eq!(mount.device.as_deref(), Some("gibbs"));
        assert!(!mount.user_home_query);
        assert!(mount.extra_snapshots.is_empty());
    }

    fn toml_like(json: &str) -> Mount {
        serde_json::from_str(json).unwrap()
    }
}
