//! Decoding of raw quota reports into [`QuotaRecord`]s.
//!
//! Two wire formats exist. The block-style backend emits colon-delimited
//! lines with fixed field positions; capacity counters are KiB and split
//! into a confirmed counter and an "in doubt" (in-flight) counter that
//! must be summed before use. The object-style backend emits JSON objects
//! with byte-denominated counters and no in-flight split.
//!
//! Historical variants of these reports disagreed on which field holds the
//! block quota (11 vs 12). Field 12 is the hard block limit and is the one
//! used here; see DESIGN.md for the discrepancy note.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{QuotaRecord, Scope};

/// Field holding the scope tag (USR/GRP/FILESET)
const SCOPE_FIELD: usize = 7;
/// Field holding the identity, or the fileset name for FILESET rows
const NAME_FIELD: usize = 9;
/// Confirmed block usage, KiB
const BLOCK_USAGE_FIELD: usize = 10;
/// Hard block limit, KiB
const BLOCK_QUOTA_FIELD: usize = 12;
/// In-doubt block usage, KiB
const BLOCK_IN_DOUBT_FIELD: usize = 13;
/// Confirmed file count
const FILES_USAGE_FIELD: usize = 15;
/// Hard file-count limit
const FILES_QUOTA_FIELD: usize = 17;
/// In-doubt file count
const FILES_IN_DOUBT_FIELD: usize = 18;

/// Fewest fields a line can have while still carrying the fileset name in
/// the second-to-last position, clear of the counter fields.
const MIN_FIELDS: usize = 21;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Parse one colon-delimited quota line.
///
/// `prefix` is the filesystem short name used to namespace the fileset
/// (`gibbs:project`). Fails with [`Error::MalformedRecord`] when the line
/// has too few fields, an unknown scope tag, or non-numeric counters.
pub fn parse_quota_line(line: &str, prefix: &str) -> Result<QuotaRecord> {
    let fields: Vec<&str> = line.split(':').collect();

    if fields.len() < MIN_FIELDS {
        return Err(Error::malformed(format!(
            "expected at least {MIN_FIELDS} fields, got {}",
            fields.len()
        )));
    }

    let tag = fields[SCOPE_FIELD];
    let scope = Scope::from_tag(tag)
        .ok_or_else(|| Error::malformed(format!("unknown scope tag: {tag}")))?;

    let (fileset, identity) = if scope == Scope::Fileset {
        (fields[NAME_FIELD].to_string(), String::new())
    } else {
        (
            fields[fields.len() - 2].to_string(),
            fields[NAME_FIELD].to_string(),
        )
    };

    let block_usage = counter(&fields, BLOCK_USAGE_FIELD)?;
    let block_in_doubt = counter(&fields, BLOCK_IN_DOUBT_FIELD)?;
    let block_quota = counter(&fields, BLOCK_QUOTA_FIELD)?;
    let files_usage = counter(&fields, FILES_USAGE_FIELD)?;
    let files_in_doubt = counter(&fields, FILES_IN_DOUBT_FIELD)?;
    let files_quota = counter(&fields, FILES_QUOTA_FIELD)?;

    Ok(QuotaRecord {
        fileset: format!("{prefix}:{fileset}"),
        scope,
        identity,
        used_gib: (block_usage + block_in_doubt) as f64 / KIB_PER_GIB,
        quota_gib: block_quota as f64 / KIB_PER_GIB,
        used_files: files_usage + files_in_doubt,
        quota_files: files_quota,
    })
}

fn counter(fields: &[&str], index: usize) -> Result<u64> {
    fields[index]
        .parse()
        .map_err(|_| Error::malformed(format!("field {index} is not a counter: {:?}", fields[index])))
}

/// One row of an object-style JSON snapshot.
///
/// `name` is either a plain entity identifier or a `"fileset:group"`
/// compound; rows may also carry an explicit `entity_identifier`.
#[derive(Debug, Deserialize)]
pub struct ObjectQuotaRow {
    /// Quota entity name, possibly a `fileset:group` compound
    pub name: String,
    /// Explicit entity identifier, when the name is not compound
    #[serde(default)]
    pub entity_identifier: Option<String>,
    /// Used capacity in bytes
    pub used_effective_capacity: u64,
    /// Hard capacity limit in bytes
    pub hard_limit: u64,
    /// Used file count
    pub used_inodes: u64,
    /// Hard file-count limit
    pub hard_limit_inodes: u64,
}

impl ObjectQuotaRow {
    /// Translate the row into a [`QuotaRecord`].
    ///
    /// Compound names become group-scoped records for the named fileset;
    /// plain rows with an entity identifier become user-scoped records.
    /// Rows with neither shape are malformed.
    pub fn into_record(self, prefix: &str) -> Result<QuotaRecord> {
        let (fileset, identity, scope) = if let Some((fileset, group)) = self.name.split_once(':') {
            (fileset.to_string(), group.to_string(), Scope::Group)
        } else if let Some(entity) = self.entity_identifier {
            (self.name, entity, Scope::User)
        } else {
            return Err(Error::malformed(format!(
                "object row {:?} has neither a compound name nor an entity identifier",
                self.name
            )));
        };

        Ok(QuotaRecord {
            fileset: format!("{prefix}:{fileset}"),
            scope,
            identity,
            used_gib: self.used_effective_capacity as f64 / BYTES_PER_GIB,
            quota_gib: self.hard_limit as f64 / BYTES_PER_GIB,
            used_files: self.used_inodes,
            quota_files: self.hard_limit_inodes,
        })
    }
}

/// Build a colon line with the given counters at the documented positions
/// and the fileset name second to last. Test fixture shared by the adapter
/// and summary tests.
#[cfg(test)]
#[allow(clippy::too_many_arguments)]
pub(crate) fn quota_line(
    tag: &str,
    name: &str,
    usage_kib: u64,
    quota_kib: u64,
    in_doubt_kib: u64,
    files: u64,
    files_quota: u64,
    files_in_doubt: u64,
    fileset: &str,
) -> String {
    format!(
        "mmlsquota::0:1:::fs1:{tag}:1000:{name}:{usage_kib}:0:{quota_kib}:{in_doubt_kib}:none:{files}:0:{files_quota}:{files_in_doubt}:none:{fileset}:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usr_line_sums_confirmed_and_in_doubt() {
        // 10 GiB confirmed + 2 GiB in doubt, 20 GiB quota
        let line = quota_line(
            "USR", "ahs3", 10_485_760, 20_971_520, 2_097_152, 500, 1000, 25, "project",
        );
        let record = parse_quota_line(&line, "gibbs").unwrap();

        assert_eq!(record.fileset, "gibbs:project");
        assert_eq!(record.scope, Scope::User);
        assert_eq!(record.identity, "ahs3");
        assert!((record.used_gib - 12.0).abs() < f64::EPSILON);
        assert!((record.quota_gib - 20.0).abs() < f64::EPSILON);
        assert_eq!(record.used_files, 525);
        assert_eq!(record.quota_files, 1000);
    }

    #[test]
    fn test_fileset_line_reads_name_as_fileset() {
        let line = quota_line(
            "FILESET", "pi_smith", 1_048_576, 0, 0, 10, 0, 0, "ignored",
        );
        let record = parse_quota_line(&line, "gibbs").unwrap();

        assert_eq!(record.fileset, "gibbs:pi_smith");
        assert_eq!(record.scope, Scope::Fileset);
        assert_eq!(record.identity, "");
        assert!((record.used_gib - 1.0).abs() < f64::EPSILON);
        assert!((record.quota_gib - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_short_line_is_malformed() {
        let err = parse_quota_line("mmlsquota::HEADER:6.1", "gibbs").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_unknown_scope_tag_is_malformed() {
        let line = quota_line("ROOT", "x", 0, 0, 0, 0, 0, 0, "project");
        let err = parse_quota_line(&line, "gibbs").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_non_numeric_counter_is_malformed() {
        let line = "mmlsquota::HEADER:6.1:::fs1:USR:1000:ahs3:ten:0:0:0:none:0:0:0:0:none:project:";
        let err = parse_quota_line(line, "gibbs").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_object_row_compound_name() {
        let row: ObjectQuotaRow = serde_json::from_str(
            r#"{"name": "scratch:support", "used_effective_capacity": 1073741824,
                "hard_limit": 10737418240, "used_inodes": 42, "hard_limit_inodes": 1000}"#,
        )
        .unwrap();
        let record = row.into_record("palmer").unwrap();

        assert_eq!(record.fileset, "palmer:scratch");
        assert_eq!(record.identity, "support");
        assert_eq!(record.scope, Scope::Group);
        assert!((record.used_gib - 1.0).abs() < f64::EPSILON);
        assert!((record.quota_gib - 10.0).abs() < f64::EPSILON);
        assert_eq!(record.used_files, 42);
        assert_eq!(record.quota_files, 1000);
    }

    #[test]
    fn test_object_row_entity_identifier() {
        let row: ObjectQuotaRow = serde_json::from_str(
            r#"{"name": "home", "entity_identifier": "ahs3",
                "used_effective_capacity": 0, "hard_limit": 0,
                "used_inodes": 0, "hard_limit_inodes": 0}"#,
        )
        .unwrap();
        let record = row.into_record("palmer").unwrap();

        assert_eq!(record.fileset, "palmer:home");
        assert_eq!(record.identity, "ahs3");
        assert_eq!(record.scope, Scope::User);
    }

    #[test]
    fn test_object_row_without_identity_is_malformed() {
        let row: ObjectQuotaRow = serde_json::from_str(
            r#"{"name": "orphan", "used_effective_capacity": 1,
                "hard_limit": 1, "used_inodes": 1, "hard_limit_inodes": 1}"#,
        )
        .unwrap();
        assert!(matches!(
            row.into_record("palmer").unwrap_err(),
            Error::MalformedRecord { .. }
        ));
    }
}
