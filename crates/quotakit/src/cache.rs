//! Short-TTL cache for collected summaries.
//!
//! One JSON blob per identity under the system temp directory, aged by
//! file mtime. Live summary collection scales with the number of PI
//! filesets (one process spawn each), so a five-minute cache is the
//! dominant latency optimization for repeat invocations.
//!
//! There is no locking: concurrent runs for the same identity race and
//! the last writer wins. With a 300-second TTL that staleness window is
//! acceptable and deliberately left as is.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::SummaryOutput;

/// How long a cached summary stays servable.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// One cached summary with the freshness it was collected at.
///
/// `as_of` is `None` for fully live collections and carries the oldest
/// contributing snapshot timestamp otherwise, so a replayed entry keeps
/// the framing of the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The collected summary
    pub summary: SummaryOutput,
    /// Oldest contributing snapshot timestamp, if any mount fell back
    pub as_of: Option<DateTime<Local>>,
}

/// Per-identity blob store for [`CacheEntry`]s.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    /// Store rooted at the system temp directory.
    pub fn new() -> Self {
        Self {
            dir: env::temp_dir(),
        }
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!(".{identity}.quota-summary.json"))
    }

    /// Load the cached entry for an identity, if fresh.
    ///
    /// Missing, expired, future-dated, and corrupt blobs are all treated
    /// as a miss.
    pub fn load(&self, identity: &str, ttl: Duration) -> Option<CacheEntry> {
        let path = self.path_for(identity);
        let age = fs::metadata(&path).ok()?.modified().ok()?.elapsed().ok()?;
        if age > ttl {
            return None;
        }

        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::debug!("ignoring corrupt cache blob {}: {err}", path.display());
                None
            }
        }
    }

    /// Persist a freshly collected entry for an identity.
    pub fn store(&self, identity: &str, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(identity);
        fs::write(&path, serde_json::to_string(entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuotaRecord, Scope};

    fn entry(as_of: Option<DateTime<Local>>) -> CacheEntry {
        let mut summary = SummaryOutput::default();
        summary.place(
            QuotaRecord {
                fileset: "gibbs:project".to_string(),
                scope: Scope::Group,
                identity: "support".to_string(),
                used_gib: 123.456,
                quota_gib: 1024.0,
                used_files: 98_765,
                quota_files: 1_000_000,
            },
            true,
        );
        CacheEntry { summary, as_of }
    }

    #[test]
    fn test_round_trip_within_ttl_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        let written = entry(None);

        store.store("ahs3", &written).unwrap();
        let read = store.load("ahs3", CACHE_TTL).unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn test_round_trip_preserves_snapshot_framing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        let written = entry(Some(Local::now()));

        store.store("ahs3", &written).unwrap();
        let read = store.load("ahs3", CACHE_TTL).unwrap();
        assert_eq!(read.as_of, written.as_of);
    }

    #[test]
    fn test_expired_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        store.store("ahs3", &entry(None)).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert!(store.load("ahs3", Duration::ZERO).is_none());
    }

    #[test]
    fn test_missing_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        assert!(store.load("nobody", CACHE_TTL).is_none());
    }

    #[test]
    fn test_corrupt_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        fs::write(dir.path().join(".ahs3.quota-summary.json"), "not json").unwrap();
        assert!(store.load("ahs3", CACHE_TTL).is_none());
    }

    #[test]
    fn test_blobs_are_keyed_by_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::at(dir.path());
        store.store("ahs3", &entry(None)).unwrap();
        assert!(store.load("bgc4", CACHE_TTL).is_none());
    }
}
