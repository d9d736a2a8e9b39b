//! Run configuration: cluster detection, topology, and flags.
//!
//! All of this is resolved once at startup into an immutable [`RunConfig`]
//! that gets threaded through every call; nothing here is process-global.

use anyhow::{Context, Result, bail};
use quotakit::adapter::Mount;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::cli::Cli;

/// System-wide topology override file.
pub const SYSTEM_CONFIG: &str = "/etc/getquota.toml";

/// Environment variable pointing at an alternate topology file.
pub const CONFIG_ENV: &str = "GETQUOTA_CONFIG";

/// Cluster release file: `cluster="grace"` on the first line, the LDAP
/// management host as `mgt="..."` on the second.
pub const CLUSTER_RELEASE: &str = "/etc/yalehpc";

/// Which text layout the report uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Interactive terminal layout
    Cli,
    /// Warning-first layout for quota notification mail
    Email,
}

/// Everything one report run needs to know, resolved once.
#[derive(Debug)]
pub struct RunConfig {
    /// Cluster being reported on
    pub cluster: String,
    /// Output layout
    pub format: ReportFormat,
    /// Debug mode: force live queries, bypass the cache, echo raw output
    pub debug: bool,
    /// Restrict group member enumeration to users with a home directory
    pub active_users_only: bool,
    /// Reporting on the invoking user themselves
    pub is_me: bool,
    /// Mounts reachable from this cluster
    pub mounts: Vec<Mount>,
    /// Whether this cluster supports per-user home quotas
    pub user_home_quota: bool,
    /// Whether everything except scratch is backed up on this cluster
    pub backup_all: bool,
    /// Filesets explicitly suppressed on this cluster
    pub denylist: Vec<String>,
    /// Directory service settings for member enumeration
    pub ldap: LdapConfig,
}

impl RunConfig {
    /// Resolve the run configuration from CLI flags, the topology file,
    /// and the cluster release file.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let topology = Topology::load()?;
        let release = ClusterRelease::read(Path::new(CLUSTER_RELEASE));

        let cluster = cli
            .cluster
            .clone()
            .or_else(|| release.cluster.clone())
            .context("could not detect the current cluster; pass -c <cluster>")?;

        let cluster_config = topology.cluster(&cluster)?;
        let mut ldap = topology.ldap.clone();
        if ldap.host.is_none() {
            ldap.host = release.mgt;
        }

        Ok(Self {
            cluster,
            format: if cli.email {
                ReportFormat::Email
            } else {
                ReportFormat::Cli
            },
            debug: cli.debug,
            active_users_only: cli.active_users,
            is_me: cli.user.is_none() && cli.group.is_none(),
            mounts: cluster_config.mounts.clone(),
            user_home_quota: cluster_config.user_home_quota,
            backup_all: cluster_config.backup_all,
            denylist: cluster_config.denylist.clone(),
            ldap,
        })
    }
}

// ============================================================================
// Topology
// ============================================================================

/// Cluster topology: which mounts each cluster reaches and how they behave.
#[derive(Debug, Deserialize)]
pub struct Topology {
    /// Per-cluster configuration
    pub clusters: BTreeMap<String, ClusterConfig>,
    /// Directory service settings
    #[serde(default)]
    pub ldap: LdapConfig,
}

/// One cluster's mounts and reporting quirks.
#[derive(Debug, Deserialize)]
pub struct ClusterConfig {
    /// Mounts reachable from this cluster, in reporting order
    pub mounts: Vec<Mount>,
    /// False when the cluster has no per-user home quotas to show
    #[serde(default = "default_true")]
    pub user_home_quota: bool,
    /// True when everything except scratch is backed up
    #[serde(default)]
    pub backup_all: bool,
    /// Namespaced filesets never shown on this cluster
    #[serde(default)]
    pub denylist: Vec<String>,
}

/// Directory-service connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    /// LDAP host; defaults to the release file's management host
    #[serde(default)]
    pub host: Option<String>,
    /// Search base
    #[serde(default = "default_ldap_base")]
    pub base: String,
    /// Bind DN
    #[serde(default = "default_ldap_bind_dn")]
    pub bind_dn: String,
    /// Bind password
    #[serde(default = "default_ldap_password")]
    pub bind_password: String,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            host: None,
            base: default_ldap_base(),
            bind_dn: default_ldap_bind_dn(),
            bind_password: default_ldap_password(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ldap_base() -> String {
    "o=hpc.yale.edu".to_string()
}

fn default_ldap_bind_dn() -> String {
    "cn=client,o=hpc.yale.edu".to_string()
}

fn default_ldap_password() -> String {
    "hpc@Client".to_string()
}

impl Topology {
    /// Load the topology: `$GETQUOTA_CONFIG`, then the system file, then
    /// the built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        if Path::new(SYSTEM_CONFIG).exists() {
            return Self::from_file(Path::new(SYSTEM_CONFIG));
        }
        Self::builtin()
    }

    /// Parse a topology file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid topology in {}", path.display()))
    }

    /// The compiled-in topology.
    pub fn builtin() -> Result<Self> {
        toml::from_str(DEFAULT_TOPOLOGY).context("built-in topology is invalid")
    }

    /// Look up one cluster's configuration.
    pub fn cluster(&self, name: &str) -> Result<&ClusterConfig> {
        match self.clusters.get(name) {
            Some(config) => Ok(config),
            None => bail!("unknown cluster: {name}"),
        }
    }
}

const DEFAULT_TOPOLOGY: &str = r#"
[clusters.grace]
denylist = ["loomis:pi_balou"]
mounts = [
    { path = "/gpfs/loomis", short_name = "loomis", backend = "gpfs", device = "loomis" },
    { path = "/gpfs/gibbs", short_name = "gibbs", backend = "gpfs", device = "gibbs", user_home_query = false },
    { path = "/gpfs/slayman", short_name = "slayman", backend = "gpfs", device = "slayman", user_home_query = false },
    { path = "/vast/palmer", short_name = "palmer", backend = "vast" },
]

[clusters.farnam]
mounts = [
    { path = "/gpfs/ysm", short_name = "ysm", backend = "gpfs", device = "ysm-gpfs" },
    { path = "/gpfs/gibbs", short_name = "gibbs", backend = "gpfs", device = "gibbs", user_home_query = false },
    { path = "/gpfs/slayman", short_name = "slayman", backend = "gpfs", device = "slayman", user_home_query = false },
]

[clusters.ruddle]
mounts = [
    { path = "/gpfs/ycga", short_name = "ycga", backend = "gpfs", device = "ycga-gpfs" },
    { path = "/gpfs/gibbs", short_name = "gibbs", backend = "gpfs", device = "gibbs", user_home_query = false },
]

[clusters.milgram]
backup_all = true
mounts = [
    { path = "/gpfs/milgram", short_name = "milgram", backend = "gpfs", device = "milgram" },
]

[clusters.gibbs]
user_home_quota = false
mounts = [
    { path = "/gpfs/gibbs", short_name = "gibbs", backend = "gpfs", device = "gibbs", user_home_query = false },
]

[clusters.slayman]
user_home_quota = false
mounts = [
    { path = "/gpfs/slayman", short_name = "slayman", backend = "gpfs", device = "slayman", user_home_query = false },
]
"#;

// ============================================================================
// Cluster release file
// ============================================================================

/// What the cluster release file declares.
#[derive(Debug, Default)]
pub struct ClusterRelease {
    /// Cluster name
    pub cluster: Option<String>,
    /// LDAP management host
    pub mgt: Option<String>,
}

impl ClusterRelease {
    /// Read and parse the release file; a missing file yields an empty
    /// release (cluster must then come from `-c`).
    pub fn read(path: &Path) -> Self {
        fs::read_to_string(path)
            .map(|text| Self::parse(&text))
            .unwrap_or_default()
    }

    /// Parse `key="value"` lines.
    pub fn parse(text: &str) -> Self {
        let mut release = Self::default();
        let Ok(re) = Regex::new(r#"(?m)^\s*(\w+)\s*=\s*"?([^"\n]*)"?\s*$"#) else {
            return release;
        };

        for captures in re.captures_iter(text) {
            let value = captures[2].trim().to_string();
            match &captures[1] {
                "cluster" => release.cluster = Some(value),
                "mgt" => release.mgt = Some(value),
                _ => {}
            }
        }
        release
    }
}
