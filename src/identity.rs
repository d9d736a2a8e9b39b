//! Identity resolution: passwd/group lookups and member enumeration.
//!
//! The target of a run is either one user (with their primary group) or
//! one whole group. Local lookups go through the libc `_r` functions;
//! member enumeration goes through `ldapsearch`, since the member list of
//! an HPC group lives in the directory service, not in `/etc/group`.

use anyhow::{Context, Result, bail};
use quotakit::exec::{COMMAND_DEADLINE, run_deadline_cmd};
use quotakit::types::QueryTarget;
use std::ffi::{CStr, CString};
use std::mem::MaybeUninit;
use std::process::Command;

use crate::cli::Cli;
use crate::config::RunConfig;

/// Resolve the query target from the CLI flags.
///
/// Unknown users and groups are fatal; a failed member enumeration for a
/// plain user query degrades to a single-member list so the report still
/// comes out.
pub fn resolve_target(cli: &Cli, config: &RunConfig) -> Result<QueryTarget> {
    if let Some(group) = &cli.group {
        let gid = group_gid(group).with_context(|| format!("Unknown group: {group}"))?;
        let members = group_members(config, gid)
            .with_context(|| format!("could not enumerate members of group {group}"))?;
        return Ok(QueryTarget::group(group.clone(), members));
    }

    let login = match &cli.user {
        Some(user) => user.clone(),
        None => current_username().context("could not determine the invoking user")?,
    };
    let gid = user_primary_gid(&login).with_context(|| format!("Unknown user: {login}"))?;
    let group = group_name(gid).with_context(|| format!("unknown primary group of {login}"))?;

    let members = match group_members(config, gid) {
        Ok(members) if !members.is_empty() => members,
        Ok(_) => vec![login.clone()],
        Err(err) => {
            log::warn!("member enumeration failed, showing {login} only: {err}");
            vec![login.clone()]
        }
    };

    Ok(QueryTarget::User {
        login,
        group,
        members,
    })
}

// ============================================================================
// Local passwd/group lookups
// ============================================================================

const INITIAL_BUF: usize = 1024;

/// Login name of the invoking user.
pub fn current_username() -> Result<String> {
    // SAFETY: getuid cannot fail and touches no memory
    let uid = unsafe { libc::getuid() };

    let mut buf = vec![0_u8; INITIAL_BUF];
    loop {
        let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: pwd and buf outlive the call; getpwuid_r writes within
        // the provided buffer or fails with ERANGE
        let rc = unsafe {
            libc::getpwuid_r(
                uid,
                pwd.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            bail!("no passwd entry for uid {uid}");
        }
        // SAFETY: result is non-null, so pwd is initialized and pw_name
        // points into buf
        let name = unsafe { CStr::from_ptr(pwd.assume_init().pw_name) };
        return Ok(name.to_string_lossy().into_owned());
    }
}

/// Primary group id of a login name.
pub fn user_primary_gid(login: &str) -> Result<libc::gid_t> {
    let c_login = CString::new(login).context("invalid login name")?;

    let mut buf = vec![0_u8; INITIAL_BUF];
    loop {
        let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: as in current_username
        let rc = unsafe {
            libc::getpwnam_r(
                c_login.as_ptr(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            bail!("no passwd entry for {login}");
        }
        // SAFETY: result is non-null, so pwd is initialized
        return Ok(unsafe { pwd.assume_init() }.pw_gid);
    }
}

/// Group id of a group name.
pub fn group_gid(group: &str) -> Result<libc::gid_t> {
    let c_group = CString::new(group).context("invalid group name")?;

    let mut buf = vec![0_u8; INITIAL_BUF];
    loop {
        let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: as in current_username
        let rc = unsafe {
            libc::getgrnam_r(
                c_group.as_ptr(),
                grp.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            bail!("no group entry for {group}");
        }
        // SAFETY: result is non-null, so grp is initialized
        return Ok(unsafe { grp.assume_init() }.gr_gid);
    }
}

/// Name of a group id.
pub fn group_name(gid: libc::gid_t) -> Result<String> {
    let mut buf = vec![0_u8; INITIAL_BUF];
    loop {
        let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
        let mut result: *mut libc::group = std::ptr::null_mut();
        // SAFETY: as in current_username
        let rc = unsafe {
            libc::getgrgid_r(
                gid,
                grp.as_mut_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            bail!("no group entry for gid {gid}");
        }
        // SAFETY: result is non-null, so grp is initialized and gr_name
        // points into buf
        let name = unsafe { CStr::from_ptr(grp.assume_init().gr_name) };
        return Ok(name.to_string_lossy().into_owned());
    }
}

// ============================================================================
// Directory-service member enumeration
// ============================================================================

/// Enumerate the logins in a group via the directory service.
///
/// With `--active-users` the filter also requires a home directory on the
/// current cluster, so long-departed accounts stop cluttering the tables.
pub fn group_members(config: &RunConfig, gid: libc::gid_t) -> Result<Vec<String>> {
    let host = config
        .ldap
        .host
        .as_ref()
        .context("no LDAP management host configured")?;

    let filter = if config.active_users_only {
        format!("(&({}HomeDirectory=*)(gidNumber={gid}))", config.cluster)
    } else {
        format!("(gidNumber={gid})")
    };

    let url = format!("ldaps://{host}");
    let mut command = Command::new("ldapsearch");
    command.env("LDAPTLS_REQCERT", "never").args([
        "-xLLL",
        "-H",
        &url,
        "-b",
        &config.ldap.base,
        "-D",
        &config.ldap.bind_dn,
        "-w",
        &config.ldap.bind_password,
        &filter,
        "uid",
    ]);
    // Same deadline as the quota tools; a wedged directory server must
    // not hang the report.
    let stdout =
        run_deadline_cmd(command, COMMAND_DEADLINE).context("could not run ldapsearch")?;

    Ok(parse_uid_lines(&stdout))
}

/// Pull the `uid:` attribute lines out of an ldapsearch result.
pub fn parse_uid_lines(text: &str) -> Vec<String> {
    let mut members: Vec<String> = text
        .lines()
        .filter_map(|line| line.strip_prefix("uid: "))
        .map(|uid| uid.trim().to_string())
        .filter(|uid| !uid.is_empty())
        .collect();
    members.sort();
    members.dedup();
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uid_lines() {
        let text = "dn: uid=bgc4,o=hpc\nuid: bgc4\n\ndn: uid=ahs3,o=hpc\nuid: ahs3\nuid: ahs3\n";
        assert_eq!(parse_uid_lines(text), vec!["ahs3", "bgc4"]);
    }

    #[test]
    fn test_parse_uid_lines_ignores_other_attributes() {
        let text = "uidNumber: 1000\ngidNumber: 100\n";
        assert!(parse_uid_lines(text).is_empty());
    }

    #[test]
    fn test_root_resolves_locally() {
        // Every Linux box has root with gid 0
        assert_eq!(user_primary_gid("root").unwrap(), 0);
        assert_eq!(group_name(0).unwrap(), "root");
        assert_eq!(group_gid("root").unwrap(), 0);
    }

    #[test]
    fn test_unknown_user_is_an_error() {
        assert!(user_primary_gid("no-such-user-here").is_err());
        assert!(group_gid("no-such-group-here").is_err());
    }

    #[test]
    fn test_current_username_is_nonempty() {
        assert!(!current_username().unwrap().is_empty());
    }
}
