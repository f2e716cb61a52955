//! Host checks made before any collector runs.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::error::{AuditError, Result};

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Ubuntu releases whose bundled tool versions the parsers are written for.
pub const SUPPORTED_RELEASES: &[&str] = &["22.04", "24.04"];

/// Effective UID of this process.
pub fn effective_uid() -> u32 {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Fail with [`AuditError::InsufficientPrivilege`] unless running as root.
pub fn ensure_privileged() -> Result<()> {
    check_privilege(effective_uid())
}

fn check_privilege(euid: u32) -> Result<()> {
    if euid == 0 {
        Ok(())
    } else {
        Err(AuditError::InsufficientPrivilege { euid })
    }
}

/// The fields of `/etc/os-release` this tool cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    pub id: Option<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    /// Parse `KEY=value` / `KEY="value"` lines. Unknown keys are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut release = Self::default();
        for line in raw.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if value.is_empty() {
                continue;
            }
            let slot = match key {
                "ID" => &mut release.id,
                "VERSION_ID" => &mut release.version_id,
                "PRETTY_NAME" => &mut release.pretty_name,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }
        release
    }

    pub fn is_supported(&self) -> bool {
        self.id.as_deref() == Some("ubuntu")
            && self
                .version_id
                .as_deref()
                .is_some_and(|v| SUPPORTED_RELEASES.contains(&v))
    }

    fn label(&self) -> &str {
        self.pretty_name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("unknown OS")
    }
}

/// Read the OS release from `path`, warning if it is not a supported Ubuntu.
/// An unreadable file is reported and treated as unknown.
pub fn os_release(path: &Path) -> OsRelease {
    let release = match fs::read_to_string(path) {
        Ok(raw) => OsRelease::parse(&raw),
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            OsRelease::default()
        }
    };
    if release.is_supported() {
        info!("Host OS: {}", release.label());
    } else {
        warn!(
            "Host OS {} is not Ubuntu {}; tool output formats may differ",
            release.label(),
            SUPPORTED_RELEASES.join("/")
        );
    }
    release
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOBLE: &str = r#"PRETTY_NAME="Ubuntu 24.04.1 LTS"
NAME="Ubuntu"
VERSION_ID="24.04"
VERSION="24.04.1 LTS (Noble Numbat)"
ID=ubuntu
ID_LIKE=debian
"#;

    #[test]
    fn parses_ubuntu_release() {
        let r = OsRelease::parse(NOBLE);
        assert_eq!(r.id.as_deref(), Some("ubuntu"));
        assert_eq!(r.version_id.as_deref(), Some("24.04"));
        assert_eq!(r.pretty_name.as_deref(), Some("Ubuntu 24.04.1 LTS"));
        assert!(r.is_supported());
    }

    #[test]
    fn other_releases_are_unsupported() {
        let focal = NOBLE.replace("24.04", "20.04");
        assert!(!OsRelease::parse(&focal).is_supported());
        let debian = "ID=debian\nVERSION_ID=\"12\"\n";
        assert!(!OsRelease::parse(debian).is_supported());
        assert!(!OsRelease::default().is_supported());
    }

    #[test]
    fn os_release_reads_file_and_tolerates_absence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("os-release");
        std::fs::write(&path, NOBLE).unwrap();
        assert!(os_release(&path).is_supported());
        assert_eq!(os_release(&tmp.path().join("missing")), OsRelease::default());
    }

    #[test]
    fn privilege_requires_uid_zero() {
        assert!(check_privilege(0).is_ok());
        let err = check_privilege(1000).unwrap_err();
        assert!(matches!(err, AuditError::InsufficientPrivilege { euid: 1000 }));
    }
}
