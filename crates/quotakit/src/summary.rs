//! Authoritative quota summary collection.
//!
//! For each mount holding a relevant fileset, obtain one summary record
//! per fileset: live when the caller reports on themselves, otherwise
//! from the snapshot. Any live failure, timeout, or missing live
//! capability downgrades the whole run's freshness to "as of snapshot
//! time"; the downgrade is global, not per mount, so the report never
//! mixes "right now" and stale framing.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::adapter::{self, Backend, Mount, gpfs};
use crate::cache::{CACHE_TTL, CacheEntry, CacheStore};
use crate::classify::{self, FilesetCategory};
use crate::error::Result;
use crate::exec::COMMAND_DEADLINE;
use crate::types::{QueryTarget, QuotaRecord, Scope, SummaryOutput, SummarySource};

/// Knobs for one summary collection pass.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Attempt live queries; true when the identity is "myself"
    pub prefer_live: bool,
    /// Debug mode: skip the cache, run tools unbounded, echo raw output
    pub debug: bool,
    /// False on clusters without per-user home quotas; home slots stay empty
    pub include_home: bool,
    /// Cache freshness window
    pub ttl: Duration,
    /// Per-invocation deadline for live queries
    pub deadline: Duration,
    /// Path of the block backend's quota tool
    pub quota_tool: String,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            prefer_live: false,
            debug: false,
            include_home: true,
            ttl: CACHE_TTL,
            deadline: COMMAND_DEADLINE,
            quota_tool: gpfs::QUOTA_TOOL.to_string(),
        }
    }
}

/// Collect one summary record per relevant fileset across all mounts.
///
/// The cache is consulted first for "myself" runs; a fresh hit skips all
/// adapters and replays the result under the freshness framing it was
/// stored with. Collections are persisted back to the cache along with
/// their snapshot timestamp, if any, for subsequent invocations.
pub fn collect_summary(
    mounts: &[Mount],
    relevant: &BTreeSet<String>,
    target: &QueryTarget,
    opts: &CollectOptions,
    cache: &CacheStore,
) -> SummarySource {
    if opts.prefer_live && !opts.debug {
        if let Some(entry) = cache.load(target.cache_key(), opts.ttl) {
            log::debug!("serving summary for {} from cache", target.cache_key());
            return match entry.as_of {
                None => SummarySource::Live(entry.summary),
                Some(as_of) => SummarySource::Cached {
                    summary: entry.summary,
                    as_of,
                },
            };
        }
    }

    let mut summary = SummaryOutput::default();
    let mut snapshot_as_of: Option<DateTime<Local>> = None;
    let mut mounts_read = 0;

    for mount in mounts {
        if !relevant.iter().any(|fileset| mount.owns(fileset)) {
            continue;
        }

        let went_live = opts.prefer_live
            && mount.backend == Backend::Gpfs
            && match live_summary(mount, relevant, target, opts) {
                Ok(records) => {
                    mounts_read += 1;
                    for record in records {
                        summary.place(record, opts.include_home);
                    }
                    true
                }
                Err(err) => {
                    log::info!(
                        "live query failed for {}, falling back to snapshot: {err}",
                        mount.path.display()
                    );
                    false
                }
            };

        if !went_live {
            match snapshot_summary(mount, relevant, target) {
                Ok(records) => {
                    mounts_read += 1;
                    for record in records {
                        summary.place(record, opts.include_home);
                    }
                    // Oldest contributing snapshot frames the whole report.
                    let mtime = mount.snapshot_mtime().unwrap_or_else(Local::now);
                    snapshot_as_of = Some(match snapshot_as_of {
                        Some(existing) => existing.min(mtime),
                        None => mtime,
                    });
                }
                Err(err) => {
                    log::warn!("no summary data from {}: {err}", mount.path.display());
                }
            }
        }
    }

    if mounts_read == 0 || summary.is_empty() {
        return SummarySource::Unavailable;
    }

    // Downgraded collections are cached too, with their snapshot framing;
    // a replayed entry must not pass off stale data as live.
    if opts.prefer_live {
        let entry = CacheEntry {
            summary: summary.clone(),
            as_of: snapshot_as_of,
        };
        if let Err(err) = cache.store(target.cache_key(), &entry) {
            log::warn!("could not cache summary for {}: {err}", target.cache_key());
        }
    }

    match snapshot_as_of {
        None => SummarySource::Live(summary),
        Some(as_of) => SummarySource::Cached { summary, as_of },
    }
}

fn live_summary(
    mount: &Mount,
    relevant: &BTreeSet<String>,
    target: &QueryTarget,
    opts: &CollectOptions,
) -> Result<Vec<QuotaRecord>> {
    let pi_filesets: Vec<String> = relevant
        .iter()
        .filter(|fileset| mount.owns(fileset) && classify::is_pi(fileset))
        .cloned()
        .collect();

    gpfs::read_live(&gpfs::LiveQuery {
        mount,
        user: target.login(),
        group: target.group_name(),
        pi_filesets: &pi_filesets,
        tool: &opts.quota_tool,
        deadline: opts.deadline,
        debug: opts.debug,
    })
}

/// One authoritative record per relevant fileset, from the snapshot.
///
/// Home filesets are user-scoped: only the target user's own USR row
/// counts. Everything else is group-scoped: the group's GRP row, plus the
/// fileset-aggregate row for PI allocations.
fn snapshot_summary(
    mount: &Mount,
    relevant: &BTreeSet<String>,
    target: &QueryTarget,
) -> Result<Vec<QuotaRecord>> {
    let records = adapter::read_snapshot(mount)?;
    let group = target.group_name();
    let login = target.login();

    let mut keep: Vec<QuotaRecord> = records
        .into_iter()
        .filter(|record| relevant.contains(&record.fileset))
        .filter(|record| match record.category() {
            FilesetCategory::Home => {
                record.scope == Scope::User && login == Some(record.identity.as_str())
            }
            FilesetCategory::Pi => {
                record.scope == Scope::Fileset
                    || (record.scope == Scope::Group && record.identity == group)
            }
            _ => record.scope == Scope::Group && record.identity == group,
        })
        .collect();

    // Block backends dump both a GRP row and a FILESET-aggregate row for a
    // PI allocation; the aggregate is the authoritative one. Object
    // backends only ever have the group row, which stays.
    let aggregates: BTreeSet<String> = keep
        .iter()
        .filter(|record| record.scope == Scope::Fileset)
        .map(|record| record.fileset.clone())
        .collect();
    keep.retain(|record| {
        record.scope == Scope::Fileset
            || record.category() != FilesetCategory::Pi
            || !aggregates.contains(&record.fileset)
    });

    Ok(keep)
}
