//! Core data types for quota reconciliation.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::classify::{self, FilesetCategory};

/// Scope of one quota observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Per-user quota, keyed additionally by identity
    User,
    /// Per-group quota on a shared pool
    Group,
    /// Fileset-aggregate quota covering everything in the fileset
    Fileset,
}

impl Scope {
    /// Parse the scope tag used by the colon-delimited report format.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "USR" => Some(Self::User),
            "GRP" => Some(Self::Group),
            "FILESET" => Some(Self::Fileset),
            _ => None,
        }
    }

    /// The tag used in report output, matching the backend's vocabulary.
    pub fn tag(self) -> &'static str {
        match self {
            Self::User => "USR",
            Self::Group => "GRP",
            Self::Fileset => "FILESET",
        }
    }
}

/// One quota observation, normalized from either backend format.
///
/// `fileset` is namespaced as `<filesystem-short-name>:<fileset-name>`
/// (`gibbs:project`, `palmer:pi_smith`) so the same fileset name on two
/// filesystems never collides.
///
/// A quota of `0.0` bytes or `0` files is the backend's "unlimited/unset"
/// sentinel, not an error; see [`crate::limits::check_limits`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Namespaced fileset identifier
    pub fileset: String,
    /// Scope of the observation
    pub scope: Scope,
    /// User login or group name; empty for fileset-aggregate records
    pub identity: String,
    /// Used capacity in GiB, confirmed plus in-doubt
    pub used_gib: f64,
    /// Hard capacity limit in GiB; `0.0` means unlimited/unset
    pub quota_gib: f64,
    /// Used file count, confirmed plus in-doubt
    pub used_files: u64,
    /// Hard file-count limit; `0` means unlimited/unset
    pub quota_files: u64,
}

impl QuotaRecord {
    /// An all-zero usage row, used when a group member has no data in a
    /// fileset but should still appear in the detail table.
    pub fn zero(fileset: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            fileset: fileset.into(),
            scope: Scope::User,
            identity: identity.into(),
            used_gib: 0.0,
            quota_gib: 0.0,
            used_files: 0,
            quota_files: 0,
        }
    }

    /// Category derived from the fileset name.
    pub fn category(&self) -> FilesetCategory {
        classify::classify(&self.fileset)
    }
}

/// The identity a report run is about, resolved once per run.
#[derive(Debug, Clone)]
pub enum QueryTarget {
    /// A single user with their primary group
    User {
        /// Login name
        login: String,
        /// Primary group name
        group: String,
        /// Members of the primary group, for detail tables
        members: Vec<String>,
    },
    /// A whole group
    Group {
        /// Group name
        name: String,
        /// All member logins
        members: Vec<String>,
    },
}

impl QueryTarget {
    /// A user target whose member list is just the user themselves.
    pub fn user(login: impl Into<String>, group: impl Into<String>) -> Self {
        let login = login.into();
        Self::User {
            members: vec![login.clone()],
            login,
            group: group.into(),
        }
    }

    /// A group target.
    pub fn group(name: impl Into<String>, members: Vec<String>) -> Self {
        Self::Group {
            name: name.into(),
            members,
        }
    }

    /// The group name driving fileset relevance and summary rows.
    pub fn group_name(&self) -> &str {
        match self {
            Self::User { group, .. } => group,
            Self::Group { name, .. } => name,
        }
    }

    /// The user login, when reporting on a single user.
    pub fn login(&self) -> Option<&str> {
        match self {
            Self::User { login, .. } => Some(login),
            Self::Group { .. } => None,
        }
    }

    /// Logins whose detail rows the report should show.
    pub fn members(&self) -> &[String] {
        match self {
            Self::User { members, .. } | Self::Group { members, .. } => members,
        }
    }

    /// Whether a USR record for `identity` makes its fileset relevant.
    pub fn matches(&self, identity: &str) -> bool {
        match self {
            Self::User { login, .. } => identity == login,
            Self::Group { members, .. } => members.iter().any(|m| m == identity),
        }
    }

    /// Key for the per-identity summary cache.
    pub fn cache_key(&self) -> &str {
        match self {
            Self::User { login, .. } => login,
            Self::Group { name, .. } => name,
        }
    }
}

/// The reconciled quota summary: three named slots plus open-ended extras.
///
/// Slot assignment is by fileset category, not arrival order; a later
/// record of the same category overwrites the slot, while PI and work
/// filesets always append to `extras`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    /// Home fileset summary, if any
    pub home: Option<QuotaRecord>,
    /// Project fileset summary, if any
    pub project: Option<QuotaRecord>,
    /// Scratch fileset summary, if any
    pub scratch: Option<QuotaRecord>,
    /// PI, work, and other shared allocations, in arrival order
    pub extras: Vec<QuotaRecord>,
}

impl SummaryOutput {
    /// Place a record by its fileset category.
    ///
    /// `include_home` is false on clusters that do not support per-user
    /// home quotas; home records are dropped there instead of silently
    /// occupying a slot with meaningless data.
    pub fn place(&mut self, record: QuotaRecord, include_home: bool) {
        match record.category() {
            FilesetCategory::Home => {
                if include_home {
                    self.home = Some(record);
                }
            }
            FilesetCategory::Project => self.project = Some(record),
            FilesetCategory::Scratch => self.scratch = Some(record),
            FilesetCategory::Pi | FilesetCategory::Work => self.extras.push(record),
            FilesetCategory::Excluded => {}
        }
    }

    /// Records in presentation order: home, project, scratch, extras.
    pub fn records(&self) -> impl Iterator<Item = &QuotaRecord> {
        self.home
            .iter()
            .chain(self.project.iter())
            .chain(self.scratch.iter())
            .chain(self.extras.iter())
    }

    /// True when no record was placed at all.
    pub fn is_empty(&self) -> bool {
        self.home.is_none()
            && self.project.is_none()
            && self.scratch.is_none()
            && self.extras.is_empty()
    }
}

/// Where the summary data came from, driving the report's time framing.
#[derive(Debug, Clone, PartialEq)]
pub enum SummarySource {
    /// Every mount answered a live query; frame as "right now"
    Live(SummaryOutput),
    /// At least one mount was served from a snapshot; frame as
    /// "as of `as_of`"
    Cached {
        /// The collected summary
        summary: SummaryOutput,
        /// Timestamp of the oldest snapshot that contributed
        as_of: DateTime<Local>,
    },
    /// No mount produced any summary data
    Unavailable,
}

impl SummarySource {
    /// The summary data, regardless of freshness.
    pub fn summary(&self) -> Option<&SummaryOutput> {
        match self {
            Self::Live(summary) | Self::Cached { summary, .. } => Some(summary),
            Self::Unavailable => None,
        }
    }
}
