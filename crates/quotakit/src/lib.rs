//! # quotakit
//!
//! Quota-record reconciliation engine for clustered HPC filesystems.
//!
//! This crate turns the heterogeneous quota reports produced by GPFS-style
//! block backends and VAST-style object backends into a unified record
//! model, resolves which filesets matter to a user or group, merges live
//! queries with periodic snapshots under a bounded time budget, and flags
//! near-limit conditions.
//!
//! ## Example
//!
//! ```no_run
//! use quotakit::adapter::{Backend, Mount};
//! use quotakit::aggregate;
//! use quotakit::types::QueryTarget;
//!
//! let mounts = vec![Mount::new("/gpfs/gibbs", "gibbs", Backend::Gpfs)];
//! let target = QueryTarget::user("ahs3", "support");
//!
//! let usage = aggregate::collect_usage(&mounts, &target);
//! for fileset in &usage.relevant {
//!     println!("relevant: {fileset}");
//! }
//! ```
//!
//! ## Live data and fallback
//!
//! Summary collection ([`summary::collect_summary`]) prefers a live backend
//! query when the caller reports on their own account, and silently falls
//! back to the snapshot files when the live tool fails, times out, or the
//! backend has no live capability. The result carries a freshness tag
//! ([`types::SummarySource`]) so callers can frame the report as
//! "right now" or "as of <snapshot time>" without guessing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod aggregate;
pub mod cache;
pub mod classify;
pub mod error;
pub mod exec;
pub mod limits;
pub mod parse;
pub mod summary;
pub mod types;

pub use cache::{CacheEntry, CacheStore};
pub use classify::{FilesetCategory, classify, is_user_scoped};
pub use error::{Error, Result};
pub use limits::{AtLimit, check_limits, limits_warnings};
pub use types::{QueryTarget, QuotaRecord, Scope, SummaryOutput, SummarySource};
