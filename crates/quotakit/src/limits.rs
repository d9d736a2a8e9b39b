//! Near-limit evaluation.

use crate::types::QuotaRecord;

/// Remaining headroom at or below which a quota counts as "at limit"
/// (5% headroom, i.e. 95% utilized).
pub const LIMIT_HEADROOM: f64 = 0.05;

/// Which axes of a quota are at or near their limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtLimit {
    /// Capacity is at or above 95% of the byte quota
    pub bytes: bool,
    /// File count is at or above 95% of the file limit
    pub files: bool,
}

/// Evaluate near-limit flags for one summary record.
///
/// A quota of zero is the "unlimited/unset" sentinel and is never at
/// limit, on either axis; this also keeps the ratio well-defined.
pub fn check_limits(record: &QuotaRecord) -> AtLimit {
    let mut at_limit = AtLimit::default();

    if record.quota_gib > 0.0 {
        at_limit.bytes = (record.quota_gib - record.used_gib) / record.quota_gib <= LIMIT_HEADROOM;
    }
    if record.quota_files > 0 {
        let remaining = record.quota_files as f64 - record.used_files as f64;
        at_limit.files = remaining / record.quota_files as f64 <= LIMIT_HEADROOM;
    }

    at_limit
}

/// Render zero, one, or two warning strings for a summary record.
pub fn limits_warnings(record: &QuotaRecord) -> Vec<String> {
    let at_limit = check_limits(record);
    let mut warnings = Vec::new();

    if at_limit.bytes {
        warnings.push(format!(
            "Warning!!! You are at or near your storage limit in the {} fileset. \
             Reduce your storage usage to avoid issues.",
            record.fileset
        ));
    }
    if at_limit.files {
        warnings.push(format!(
            "Warning!!! You are at or near your file count limit in the {} fileset. \
             Reduce the number of files to avoid issues.",
            record.fileset
        ));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scope;

    fn record(used_gib: f64, quota_gib: f64, used_files: u64, quota_files: u64) -> QuotaRecord {
        QuotaRecord {
            fileset: "gibbs:project".to_string(),
            scope: Scope::Group,
            identity: "support".to_string(),
            used_gib,
            quota_gib,
            used_files,
            quota_files,
        }
    }

    #[test]
    fn test_half_utilized_is_not_at_limit() {
        // 10 of 20 GiB, 500 of 1000 files
        let at = check_limits(&record(10.0, 20.0, 500, 1000));
        assert_eq!(at, AtLimit::default());
        assert!(limits_warnings(&record(10.0, 20.0, 500, 1000)).is_empty());
    }

    #[test]
    fn test_97_percent_utilized_warns_on_bytes_only() {
        // 19.5 of 20 GiB
        let record = record(19.5, 20.0, 500, 1000);
        let at = check_limits(&record);
        assert!(at.bytes);
        assert!(!at.files);

        let warnings = limits_warnings(&record);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("storage limit"));
        assert!(warnings[0].contains("gibbs:project"));
    }

    #[test]
    fn test_zero_quota_is_unlimited() {
        // a million files against an unset limit
        let at = check_limits(&record(5000.0, 0.0, 1_000_000, 0));
        assert_eq!(at, AtLimit::default());
    }

    #[test]
    fn test_over_quota_is_at_limit() {
        let at = check_limits(&record(25.0, 20.0, 2000, 1000));
        assert!(at.bytes);
        assert!(at.files);
        assert_eq!(limits_warnings(&record(25.0, 20.0, 2000, 1000)).len(), 2);
    }

    #[test]
    fn test_flags_are_scale_invariant() {
        let base = record(19.5, 20.0, 970, 1000);
        let scaled = record(39.0, 40.0, 9700, 10000);
        assert_eq!(check_limits(&base), check_limits(&scaled));
    }

    #[test]
    fn test_check_limits_is_idempotent() {
        let r = record(19.5, 20.0, 500, 1000);
        assert_eq!(check_limits(&r), check_limits(&r));
    }
}
