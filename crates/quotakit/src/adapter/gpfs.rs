//! Block-style (GPFS) backend adapter.
//!
//! Two read paths: the per-mount snapshot file refreshed by a periodic
//! job, and the live quota tool. The live path is the dominant cost
//! driver: one process spawn for the group view, one for the user home
//! view, and one more per PI fileset on the mount, each bounded by the
//! command deadline.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use crate::classify::FilesetCategory;
use crate::error::{Error, Result};
use crate::exec;
use crate::parse;
use crate::types::{QuotaRecord, Scope};

use super::Mount;

/// Default path of the live quota tool.
pub const QUOTA_TOOL: &str = "/usr/lpp/mmfs/bin/mmlsquota";

/// Valid live output starts with this token; anything else (including
/// deadline-truncated garbage) is treated as a failed query.
const OUTPUT_SIGNATURE: &str = "mmlsq";

/// Identity whose records never enter a report.
const ROOT_IDENTITY: &str = "root";

/// Read every usable record from the mount's snapshot file.
///
/// The first line is a header. Root-owned rows and excluded (system)
/// filesets are dropped; malformed lines are skipped with a debug log.
/// A missing snapshot file is [`Error::MountUnavailable`].
pub fn read_snapshot(mount: &Mount) -> Result<Vec<QuotaRecord>> {
    let path = mount.snapshot_path();
    let file = File::open(&path).map_err(|_| Error::MountUnavailable {
        mount: mount.path.clone(),
    })?;

    let mut records = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate().skip(1) {
        let line = line?;
        if line.len() < 10 {
            continue;
        }
        match parse::parse_quota_line(&line, &mount.short_name) {
            Ok(record) => {
                if record.identity == ROOT_IDENTITY
                    || record.category() == FilesetCategory::Excluded
                {
                    continue;
                }
                records.push(record);
            }
            Err(err) => {
                log::debug!("skipping {}:{}: {err}", path.display(), number + 1);
            }
        }
    }

    Ok(records)
}

/// One live query against the backend's quota tool.
#[derive(Debug)]
pub struct LiveQuery<'a> {
    /// Mount to query; must carry a device name
    pub mount: &'a Mount,
    /// User login for the home view, when reporting on a single user
    pub user: Option<&'a str>,
    /// Group name for the group view
    pub group: &'a str,
    /// Namespaced PI filesets to query individually
    pub pi_filesets: &'a [String],
    /// Path of the quota tool
    pub tool: &'a str,
    /// Per-invocation wall-clock deadline
    pub deadline: Duration,
    /// Debug mode: run unbounded and let tool failures surface
    pub debug: bool,
}

/// Query the backend tool for current-instant quota data.
///
/// Fails with [`Error::LiveQueryFailed`] when the tool cannot run, the
/// combined output lacks the signature token, or the mount has no device
/// name; the caller falls back to the snapshot path.
pub fn read_live(query: &LiveQuery<'_>) -> Result<Vec<QuotaRecord>> {
    let device = query.mount.device.as_deref().ok_or_else(|| {
        Error::live_failed(format!(
            "{} has no device name for live queries",
            query.mount.path.display()
        ))
    })?;

    let mut raw = run(query, &["-g", query.group, "-Y", "--block-size", "auto", device])?;

    // Per-user home view, unless this mount carries no per-user home quotas.
    if query.mount.user_home_query {
        if let Some(user) = query.user {
            raw.push_str(&run(
                query,
                &["-u", user, "-Y", "--block-size", "auto", device],
            )?);
        }
    }

    if !raw.starts_with(OUTPUT_SIGNATURE) {
        return Err(Error::live_failed(format!(
            "output from {} does not carry the {OUTPUT_SIGNATURE} signature",
            query.tool
        )));
    }

    let mut records = parse_live_output(&raw, &query.mount.short_name);

    // PI filesets have fileset-aggregate quotas the group view misses;
    // each needs its own invocation.
    for fileset in query.pi_filesets {
        let Some((_, name)) = fileset.split_once(':') else {
            continue;
        };
        let raw = run(query, &["-j", name, "-Y", device])?;
        match raw.lines().nth(1) {
            Some(line) => match parse::parse_quota_line(line, &query.mount.short_name) {
                Ok(record) => records.push(record),
                Err(err) => log::debug!("skipping live record for {fileset}: {err}"),
            },
            None => log::debug!("no live record for {fileset}"),
        }
    }

    Ok(records)
}

fn run(query: &LiveQuery<'_>, args: &[&str]) -> Result<String> {
    let raw = if query.debug {
        exec::run_captured(query.tool, args)?
    } else {
        exec::run_deadline(query.tool, args, query.deadline)
            .map_err(|err| Error::live_failed(err.to_string()))?
    };
    log::debug!("{} {}:\n{raw}", query.tool, args.join(" "));
    Ok(raw)
}

fn parse_live_output(raw: &str, prefix: &str) -> Vec<QuotaRecord> {
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.contains("HEADER") || line.contains(ROOT_IDENTITY) || line.len() < 10 {
            continue;
        }
        match parse::parse_quota_line(line, prefix) {
            Ok(record) => {
                // The user view reports every fileset the user touches;
                // only its home rows are summary material.
                if record.scope == Scope::User && record.category() != FilesetCategory::Home {
                    continue;
                }
                records.push(record);
            }
            Err(err) => log::debug!("skipping live line: {err}"),
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Backend;
    use crate::parse::quota_line;
    use std::io::Write;

    fn snapshot_mount(dir: &std::path::Path, lines: &[String]) -> Mount {
        let snapdir = dir.join(".mmrepquota");
        std::fs::create_dir_all(&snapdir).unwrap();
        let mut file = File::create(snapdir.join("current")).unwrap();
        writeln!(file, "*** Report header").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        Mount::new(dir, "gibbs", Backend::Gpfs)
    }

    #[test]
    fn test_snapshot_skips_header_root_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let mount = snapshot_mount(
            dir.path(),
            &[
                quota_line("USR", "ahs3", 1_048_576, 0, 0, 10, 0, 0, "project"),
                quota_line("USR", "root", 1_048_576, 0, 0, 10, 0, 0, "project"),
                quota_line("USR", "ahs3", 1_048_576, 0, 0, 10, 0, 0, "apps"),
                "short line".to_string(),
            ],
        );

        let records = read_snapshot(&mount).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity, "ahs3");
        assert_eq!(records[0].fileset, "gibbs:project");
    }

    #[test]
    fn test_snapshot_keeps_group_and_fileset_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mount = snapshot_mount(
            dir.path(),
            &[
                quota_line("GRP", "support", 1_048_576, 0, 0, 10, 0, 0, "project"),
                quota_line("FILESET", "pi_smith", 1_048_576, 0, 0, 10, 0, 0, "x"),
            ],
        );

        let records = read_snapshot(&mount).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scope, Scope::Group);
        assert_eq!(records[1].fileset, "gibbs:pi_smith");
    }

    #[test]
    fn test_missing_snapshot_is_mount_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mount = Mount::new(dir.path().join("gone"), "gibbs", Backend::Gpfs);
        assert!(matches!(
            read_snapshot(&mount).unwrap_err(),
            Error::MountUnavailable { .. }
        ));
    }

    #[test]
    fn test_live_output_without_signature_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'quorum lost'");
        let mount = Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs).with_device("gibbs");

        let err = read_live(&LiveQuery {
            mount: &mount,
            user: None,
            group: "support",
            pi_filesets: &[],
            tool: &tool,
            deadline: Duration::from_secs(1),
            debug: false,
        })
        .unwrap_err();
        assert!(matches!(err, Error::LiveQueryFailed { .. }));
    }

    #[test]
    fn test_live_output_parses_group_rows() {
        let dir = tempfile::tempdir().unwrap();
        let line = quota_line("GRP", "support", 2_097_152, 0, 0, 10, 0, 0, "project");
        let tool = fake_tool(
            dir.path(),
            &format!("echo 'mmlsquota::HEADER:nothing'; echo '{line}'"),
        );
        let mount = Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs).with_device("gibbs");

        let records = read_live(&LiveQuery {
            mount: &mount,
            user: None,
            group: "support",
            pi_filesets: &[],
            tool: &tool,
            deadline: Duration::from_secs(1),
            debug: false,
        })
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fileset, "gibbs:project");
        assert!((records[0].used_gib - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mount_without_device_cannot_go_live() {
        let mount = Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs);
        let err = read_live(&LiveQuery {
            mount: &mount,
            user: None,
            group: "support",
            pi_filesets: &[],
            tool: QUOTA_TOOL,
            deadline: Duration::from_secs(1),
            debug: false,
        })
        .unwrap_err();
        assert!(matches!(err, Error::LiveQueryFailed { .. }));
    }

    /// Write an executable shell script standing in for the quota tool.
    fn fake_tool(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("mmlsquota");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }
}
