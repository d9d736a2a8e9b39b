//! Object-style (VAST) backend adapter.
//!
//! This backend has no live query path; it is always served from its
//! periodic JSON snapshot, so callers must frame its data as "as of the
//! snapshot time" even when reporting on the current user. Clusters may
//! carry secondary snapshot files (per-tier dumps); whichever of them
//! exist are merged into the main one.

use std::fs;
use std::path::Path;

use crate::classify::FilesetCategory;
use crate::error::{Error, Result};
use crate::parse::ObjectQuotaRow;
use crate::types::QuotaRecord;

use super::Mount;

/// Read and merge the mount's JSON snapshot files.
///
/// A missing main snapshot is [`Error::MountUnavailable`]; missing
/// secondary files are simply skipped. Rows that do not deserialize or
/// carry no usable identity are dropped with a debug log.
pub fn read_snapshot(mount: &Mount) -> Result<Vec<QuotaRecord>> {
    let main = mount.snapshot_path();
    if !main.exists() {
        return Err(Error::MountUnavailable {
            mount: mount.path.clone(),
        });
    }

    let mut records = Vec::new();
    read_file(&main, mount, &mut records)?;
    for extra in &mount.extra_snapshots {
        if extra.exists() {
            read_file(extra, mount, &mut records)?;
        }
    }

    Ok(records)
}

fn read_file(path: &Path, mount: &Mount, records: &mut Vec<QuotaRecord>) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let rows: Vec<serde_json::Value> = serde_json::from_str(&text)?;

    for row in rows {
        let parsed = serde_json::from_value::<ObjectQuotaRow>(row)
            .map_err(Error::from)
            .and_then(|row| row.into_record(&mount.short_name));
        match parsed {
            Ok(record) => {
                if record.category() == FilesetCategory::Excluded {
                    continue;
                }
                records.push(record);
            }
            Err(err) => log::debug!("skipping row in {}: {err}", path.display()),
        }
    }

    Ok(())
}
