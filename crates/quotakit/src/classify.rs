//! Fileset classification.
//!
//! Placement and reporting rules key off the fileset name alone, so the
//! classifier is a pure function of the string and independent of parse
//! order or backend. Names are matched after stripping nothing: the
//! `<filesystem>:<fileset>` namespace prefix never contains a marker
//! substring, so the whole identifier is safe to scan.

/// Category of a fileset, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilesetCategory {
    /// User home directory tree; backed up, never purged
    Home,
    /// Group project space; backed up, never purged
    Project,
    /// Scratch space; not backed up, purge-eligible after 60 days
    Scratch,
    /// PI lab allocation, or an unrecognized shared allocation
    Pi,
    /// Shared work space, appended after the fixed summary slots
    Work,
    /// System fileset (apps), excluded from reporting entirely
    Excluded,
}

/// Classify a fileset by name.
///
/// Precedence matters: `pi_project` is a PI allocation, not a project, and
/// `pi_scratch` is a PI allocation, not scratch. Names matching none of
/// the markers are treated as PI-like shared allocations.
pub fn classify(fileset: &str) -> FilesetCategory {
    if fileset.contains("pi") {
        FilesetCategory::Pi
    } else if fileset.contains("scratch") {
        FilesetCategory::Scratch
    } else if fileset.contains("home") {
        FilesetCategory::Home
    } else if fileset.contains("project") {
        FilesetCategory::Project
    } else if fileset.contains("apps") {
        FilesetCategory::Excluded
    } else if fileset.contains("work") {
        FilesetCategory::Work
    } else {
        FilesetCategory::Pi
    }
}

/// Whether summaries for this category are per-user rather than per-group.
///
/// Only home is user-scoped; everything else draws from a shared pool.
pub fn is_user_scoped(category: FilesetCategory) -> bool {
    category == FilesetCategory::Home
}

/// Whether this fileset is a PI-style allocation.
pub fn is_pi(fileset: &str) -> bool {
    classify(fileset) == FilesetCategory::Pi
}
