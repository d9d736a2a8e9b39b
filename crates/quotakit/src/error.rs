//! Error types for quota collection.
//!
//! The taxonomy mirrors how the report run recovers: a missing snapshot or
//! a failed live query never aborts the run, while malformed records are
//! skipped line by line.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while collecting quota data.
#[derive(Debug, Error)]
pub enum Error {
    /// A mount's snapshot file does not exist. Recovered by skipping the
    /// mount and surfacing a notice; the run continues.
    #[error("{} is not available at the moment", mount.display())]
    MountUnavailable {
        /// Mount point whose snapshot is missing
        mount: PathBuf,
    },

    /// One raw quota line or JSON object did not have the expected shape.
    /// Recovered by skipping the record.
    #[error("malformed quota record: {reason}")]
    MalformedRecord {
        /// What was wrong with the record
        reason: String,
    },

    /// A live backend query failed, timed out with unusable output, or the
    /// backend has no live capability. Recovered by falling back to the
    /// snapshot path.
    #[error("live quota query failed: {reason}")]
    LiveQueryFailed {
        /// Why the live query result could not be used
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::MalformedRecord`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::LiveQueryFailed`].
    pub fn live_failed(reason: impl Into<String>) -> Self {
        Self::LiveQueryFailed {
            reason: reason.into(),
        }
    }

    /// Whether the run can continue after this error by using another
    /// data source (snapshot fallback, skipped mount, skipped record).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MountUnavailable { .. }
                | Self::MalformedRecord { .. }
                | Self::LiveQueryFailed { .. }
        )
    }
}

/// Result type for quota collection.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_errors_are_recoverable() {
        assert!(Error::malformed("bad field count").is_recoverable());
        assert!(Error::live_failed("timed out").is_recoverable());
        assert!(
            Error::MountUnavailable {
                mount: "/gpfs/gibbs".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_io_errors_are_not_recoverable() {
        let err = Error::from(std::io::Error::other("boom"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_mount_unavailable_message_names_the_mount() {
        let err = Error::MountUnavailable {
            mount: "/gpfs/gibbs".into(),
        };
        assert_eq!(err.to_string(), "/gpfs/gibbs is not available at the moment");
    }
}
