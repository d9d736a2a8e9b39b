//! Per-user usage aggregation across mounts.
//!
//! Detail tables are informational and never latency-sensitive, so this
//! pass is always snapshot-based. It builds the `fileset -> user -> record`
//! map and the set of filesets relevant to the query target.

use std::collections::{BTreeMap, BTreeSet};

use crate::adapter::{self, Mount};
use crate::error::Error;
use crate::types::{QueryTarget, QuotaRecord, Scope};

/// Everything the usage pass learned about the mounts.
#[derive(Debug, Default)]
pub struct UsageReport {
    /// Per-user detail rows: fileset -> identity -> record
    pub details: BTreeMap<String, BTreeMap<String, QuotaRecord>>,
    /// Filesets the query target touches
    pub relevant: BTreeSet<String>,
    /// Every fileset seen on any mount, whether relevant or not
    pub all_filesets: BTreeSet<String>,
    /// User-facing notices about mounts that contributed nothing
    pub notices: Vec<String>,
}

/// Collect per-user usage detail across all mounts.
///
/// A fileset is relevant when the target user has a record there, when any
/// member does for group queries, or when the target group has its own
/// group-scoped row there. Afterwards the "missing PI fileset" fixup adds
/// any known `pi_<group>` fileset even with zero recorded usage, so a
/// freshly provisioned allocation still appears.
pub fn collect_usage(mounts: &[Mount], target: &QueryTarget) -> UsageReport {
    collect_usage_with_denylist(mounts, target, &[])
}

/// [`collect_usage`] with a cluster-specific fileset denylist applied;
/// `denylist` names filesets explicitly suppressed for this cluster.
pub fn collect_usage_with_denylist(
    mounts: &[Mount],
    target: &QueryTarget,
    denylist: &[String],
) -> UsageReport {
    let mut report = UsageReport::default();

    for mount in mounts {
        match adapter::read_snapshot(mount) {
            Ok(records) => {
                for record in records {
                    report.all_filesets.insert(record.fileset.clone());
                    // Object backends report shared pools as group rows with
                    // no per-user rows at all; the group's own row is what
                    // makes those filesets relevant.
                    if record.scope == Scope::Group && record.identity == target.group_name() {
                        report.relevant.insert(record.fileset.clone());
                    }
                    if record.scope != Scope::User {
                        continue;
                    }
                    if target.matches(&record.identity) {
                        report.relevant.insert(record.fileset.clone());
                    }
                    report
                        .details
                        .entry(record.fileset.clone())
                        .or_default()
                        .insert(record.identity.clone(), record);
                }
            }
            Err(Error::MountUnavailable { mount }) => {
                let notice = format!("{} is not available at the moment", mount.display());
                log::warn!("{notice}");
                report.notices.push(notice);
            }
            Err(err) => {
                log::warn!("could not read {}: {err}", mount.path.display());
            }
        }
    }

    // Missing PI fileset fixup: a newly provisioned pi_<group> allocation
    // has no usage rows yet but must still appear in the report.
    let marker = format!("pi_{}", target.group_name());
    for fileset in &report.all_filesets {
        if fileset.split_once(':').is_some_and(|(_, name)| name == marker) {
            report.relevant.insert(fileset.clone());
        }
    }

    for fileset in denylist {
        report.relevant.remove(fileset);
    }

    report
}
