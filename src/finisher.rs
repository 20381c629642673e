// src/finisher.rs

//! Post-install finishing
//!
//! Optionally brings the whole image up to date, then relabels the root
//! filesystem against the image's own SELinux policy so files written during
//! customization carry correct contexts on first boot.

use crate::error::{Error, Result};
use crate::guest::{GuestExecutor, ImageSession};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static SELINUX_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^SELINUXTYPE=(\S+)").expect("static regex"));

/// Guest SELinux configuration file
pub const SELINUX_CONFIG: &str = "/etc/selinux/config";

/// Policy type named by an SELinux config file; the last assignment wins
pub fn parse_policy_type(config: &str) -> Option<String> {
    SELINUX_TYPE_RE
        .captures_iter(config)
        .last()
        .map(|caps| caps[1].to_string())
}

/// file_contexts database for a policy type
pub fn file_contexts_path(policy_type: &str) -> String {
    format!("/etc/selinux/{}/contexts/files/file_contexts", policy_type)
}

/// Upgrade every package in the image
pub fn upgrade<E: GuestExecutor>(session: &mut ImageSession<E>) -> Result<()> {
    info!("Updating system...");
    let output = session
        .run("dnf upgrade -y")
        .map_err(|e| Error::UpgradeError(e.to_string()))?;
    debug!("{}", output);
    Ok(())
}

/// Relabel `/` with the policy configured in the image
pub fn relabel<E: GuestExecutor>(session: &mut ImageSession<E>) -> Result<String> {
    let config = session
        .run(&format!("cat {}", SELINUX_CONFIG))
        .map_err(|e| Error::PolicyTypeError(format!("Failed to read {}: {}", SELINUX_CONFIG, e)))?;
    let policy_type = parse_policy_type(&config).ok_or_else(|| {
        Error::PolicyTypeError(format!("No SELINUXTYPE set in {}", SELINUX_CONFIG))
    })?;

    info!("Relabeling filesystem with {} policy", policy_type);
    session.selinux_relabel(&file_contexts_path(&policy_type), "/")?;
    Ok(policy_type)
}

/// Run the finishing steps; relabeling always happens
pub fn finish<E: GuestExecutor>(session: &mut ImageSession<E>, sys_update: bool) -> Result<()> {
    if sys_update {
        upgrade(session)?;
    } else {
        debug!("System update disabled, skipping");
    }
    relabel(session).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guest::ScriptedGuest;
    use std::path::Path;

    const SELINUX_CONFIG_TEXT: &str = "\
# This file controls the state of SELinux on the system.
SELINUX=enforcing
# SELINUXTYPE= can take one of these values
SELINUXTYPE=targeted
";

    fn session(guest: ScriptedGuest) -> ImageSession<ScriptedGuest> {
        ImageSession::with_executor(Path::new("/art/img.qcow2"), guest, 4096).unwrap()
    }

    #[test]
    fn test_parse_policy_type() {
        assert_eq!(parse_policy_type(SELINUX_CONFIG_TEXT).as_deref(), Some("targeted"));
        assert_eq!(parse_policy_type("SELINUXTYPE=mls\n").as_deref(), Some("mls"));
        assert_eq!(parse_policy_type("# SELINUXTYPE=mls\nSELINUX=disabled\n"), None);
        assert_eq!(parse_policy_type(""), None);
    }

    #[test]
    fn test_parse_policy_type_last_assignment_wins() {
        let config = "SELINUXTYPE=targeted\nSELINUX=enforcing\nSELINUXTYPE=mls\n";
        assert_eq!(parse_policy_type(config).as_deref(), Some("mls"));
    }

    #[test]
    fn test_finish_with_update() {
        let guest = ScriptedGuest::new().on("cat /etc/selinux/config", SELINUX_CONFIG_TEXT);
        let handle = guest.clone();
        let mut session = session(guest);
        finish(&mut session, true).unwrap();

        let journal = handle.journal();
        let upgrade = journal.iter().position(|e| e == "sh dnf upgrade -y").unwrap();
        let relabel = journal
            .iter()
            .position(|e| {
                e == "selinux-relabel /etc/selinux/targeted/contexts/files/file_contexts /"
            })
            .unwrap();
        assert!(upgrade < relabel);
    }

    #[test]
    fn test_finish_without_update_still_relabels() {
        let guest = ScriptedGuest::new().on("cat /etc/selinux/config", "SELINUXTYPE=mls\n");
        let handle = guest.clone();
        let mut session = session(guest);
        finish(&mut session, false).unwrap();
        assert_eq!(handle.count("dnf upgrade"), 0);
        assert!(handle
            .journal()
            .contains(&"selinux-relabel /etc/selinux/mls/contexts/files/file_contexts /".to_string()));
    }

    #[test]
    fn test_missing_policy_type() {
        let mut session = session(ScriptedGuest::new().on("cat /etc/selinux/config", "SELINUX=disabled\n"));
        assert!(matches!(relabel(&mut session), Err(Error::PolicyTypeError(_))));
    }

    #[test]
    fn test_upgrade_failure() {
        let mut session = session(ScriptedGuest::new().on_fail("dnf upgrade", "no network"));
        assert!(matches!(finish(&mut session, true), Err(Error::UpgradeError(_))));
    }

    #[test]
    fn test_relabel_failure() {
        let guest = ScriptedGuest::new()
            .on("cat /etc/selinux/config", SELINUX_CONFIG_TEXT)
            .fail_relabel("setfiles failed");
        let mut session = session(guest);
        assert!(matches!(relabel(&mut session), Err(Error::RelabelError(_))));
    }
}
