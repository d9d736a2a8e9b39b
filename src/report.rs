//! Plain-text report rendering for the terminal and for email bodies.
//!
//! Both layouts share the same two tables. The CLI layout leads with the
//! usage details and ends with any limit warnings; the email layout leads
//! with the warnings, since that is why the mail was sent.

use chrono::Local;
use quotakit::aggregate::UsageReport;
use quotakit::classify::{FilesetCategory, classify};
use quotakit::limits::limits_warnings;
use quotakit::types::{QueryTarget, QuotaRecord, SummarySource};

/// Everything the renderers need besides the collected data.
pub struct ReportContext<'a> {
    pub cluster: &'a str,
    pub group: &'a str,
    /// Mtime of the usage snapshot, preformatted
    pub details_as_of: &'a str,
    /// Cluster backs up every non-scratch fileset, not just home
    pub backup_all: bool,
}

const WARNING_FRAME: &str = "!!!!!!!!!!!!!!!!!!!!!!!!!!!";

pub fn render_cli(
    ctx: &ReportContext,
    usage: &UsageReport,
    target: &QueryTarget,
    summary: &SummarySource,
) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "This script shows information about your quotas on {}.\n\
         If you plan to poll this sort of information extensively,\n\
         please contact us for help at hpc@yale.edu\n\n",
        ctx.cluster
    ));

    out.push_str(&details_header(ctx.group, ctx.details_as_of));
    out.push_str(&details_table(usage, target));
    out.push('\n');

    let time = match summary {
        SummarySource::Live(_) => "right now".to_string(),
        SummarySource::Cached { as_of, .. } => as_of.format("%b %d %Y %H:%M").to_string(),
        SummarySource::Unavailable => ctx.details_as_of.to_string(),
    };
    out.push_str(&summary_header(ctx.group, &time));

    match summary.summary() {
        Some(summary) => {
            for record in summary.records() {
                out.push_str(&summary_row(record, ctx.backup_all));
                out.push('\n');
            }
            let warnings = all_warnings(summary);
            if !warnings.is_empty() {
                out.push_str(WARNING_FRAME);
                out.push('\n');
                out.push_str(&warnings.join("\n"));
                out.push('\n');
                out.push_str(WARNING_FRAME);
                out.push('\n');
            }
        }
        None => {
            out.push_str("Quota summary is not available at the moment.\n");
        }
    }

    out
}

pub fn render_email(
    ctx: &ReportContext,
    usage: &UsageReport,
    target: &QueryTarget,
    summary: &SummarySource,
) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Our system has detected that you are approaching or have hit a \n\
         storage quota on {}.\n\
         See below for details on your usage.\n",
        ctx.cluster
    ));

    if let Some(summary_data) = summary.summary() {
        let warnings = all_warnings(summary_data);
        if !warnings.is_empty() {
            out.push_str(&warnings.join("\n"));
            out.push('\n');
        }

        let time = Local::now().format("%b %d %Y, %H:%M:%S").to_string();
        out.push_str(&summary_header(ctx.group, &time));
        for record in summary_data.records() {
            out.push_str(&summary_row(record, ctx.backup_all));
            out.push('\n');
        }
    } else {
        out.push_str("Quota summary is not available at the moment.\n");
    }

    out.push('\n');
    out.push_str(&details_header(ctx.group, ctx.details_as_of));
    out.push_str(&details_table(usage, target));
    out.push('\n');

    out
}

// ============================================================================
// Usage details table
// ============================================================================

fn details_header(group: &str, as_of: &str) -> String {
    format!(
        "## Usage Details for {group} (as of {as_of})\n\
         {:<23}{:<6}{:>11}{:>14}\n\
         {:<23}{:<6}{:>11}{:>14}\n",
        "Fileset",
        "User",
        "Usage (GiB)",
        "File Count",
        "-".repeat(22),
        "-".repeat(5),
        "-".repeat(10),
        "-".repeat(13),
    )
}

fn details_row(record: &QuotaRecord) -> String {
    format!(
        "{:<23}{:<6}{:>11.1}{:>14}",
        record.fileset,
        record.identity,
        record.used_gib,
        thousands(record.used_files),
    )
}

/// Render the per-user rows for every relevant fileset.
///
/// PI filesets show everyone with data in them; other filesets show the
/// group's members, with a zero row for anyone the snapshot did not
/// mention. Home is never shown, and the sections come out in the fixed
/// order project, scratch, then the rest.
fn details_table(usage: &UsageReport, target: &QueryTarget) -> String {
    let mut project = String::new();
    let mut scratch = String::new();
    let mut extras: Vec<String> = Vec::new();

    let empty = std::collections::BTreeMap::new();
    for fileset in &usage.relevant {
        let rows = usage.details.get(fileset).unwrap_or(&empty);
        let mut section: Vec<String> = Vec::new();

        let category = classify(fileset);
        if matches!(category, FilesetCategory::Pi) {
            for record in rows.values() {
                section.push(details_row(record));
            }
        } else {
            let mut members: Vec<&String> = target.members().iter().collect();
            members.sort();
            for member in members {
                match rows.get(member.as_str()) {
                    Some(record) => section.push(details_row(record)),
                    None => section.push(details_row(&QuotaRecord::zero(fileset, member))),
                }
            }
        }

        let section = section.join("\n");
        match category {
            FilesetCategory::Home => {}
            FilesetCategory::Project => project = section,
            FilesetCategory::Scratch => scratch = section,
            _ => extras.push(section),
        }
    }

    let mut sections: Vec<String> = Vec::new();
    if !project.is_empty() {
        sections.push(project);
    }
    if !scratch.is_empty() {
        sections.push(scratch);
    }
    sections.extend(extras);
    sections.join("\n----\n")
}

// ============================================================================
// Quota summary table
// ============================================================================

fn summary_header(group: &str, time: &str) -> String {
    format!(
        "\n## Quota Summary for {group} (as of {time})\n\
         {:<23}{:<8}{:>12}{:>12}{:>14}{:>14} {:<10}{:<10}\n\
         {:<23}{:<8}{:>12}{:>12}{:>14}{:>14} {:<10}{:<10}\n",
        "Fileset",
        "Type",
        "Usage (GiB)",
        "Quota (GiB)",
        "File Count",
        "File Limit",
        "Backup",
        "Purged",
        "-".repeat(22),
        "-".repeat(7),
        "-".repeat(11),
        "-".repeat(11),
        "-".repeat(13),
        "-".repeat(13),
        "-".repeat(9),
        "-".repeat(9),
    )
}

fn summary_row(record: &QuotaRecord, backup_all: bool) -> String {
    let category = record.category();
    let scratch = matches!(category, FilesetCategory::Scratch);

    let backup = if (matches!(category, FilesetCategory::Home) || backup_all) && !scratch {
        "Yes"
    } else {
        "No"
    };
    let purge = if scratch { "60 days" } else { "No" };

    format!(
        "{:<23}{:<8}{:>12.1}{:>12.1}{:>14}{:>14} {:<10}{:<10}",
        record.fileset,
        record.scope.tag(),
        record.used_gib,
        record.quota_gib,
        thousands(record.used_files),
        thousands(record.quota_files),
        backup,
        purge,
    )
}

fn all_warnings(summary: &quotakit::types::SummaryOutput) -> Vec<String> {
    summary.records().flat_map(limits_warnings).collect()
}

/// Group digits in threes, the way `{:,}` does elsewhere.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
