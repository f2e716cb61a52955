//! First-run host preparation: packages, sysstat and vnstat enablement.
//!
//! sysstat has been switched on two different ways across Ubuntu releases:
//! a `sysstat-collect.timer` systemd unit, and an `ENABLED=` flag in
//! `/etc/default/sysstat` read by the cron job. Both are probed directly on
//! the host and every strategy that applies is used.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use tempfile::NamedTempFile;

use crate::collectors::interface::primary_interface;
use crate::collectors::traffic::query_registered;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::runner::{CommandRunner, describe_argv};

/// Packages providing every tool the collectors invoke.
pub const REQUIRED_PACKAGES: &[&str] = &["sysstat", "vnstat", "nethogs", "lshw", "dmidecode"];

pub const SYSSTAT_DEFAULT_FILE: &str = "/etc/default/sysstat";

const COLLECT_TIMER: &str = "sysstat-collect.timer";
const SUMMARY_TIMER: &str = "sysstat-summary.timer";
const DISABLED_FLAG: &str = "ENABLED=\"false\"";
const ENABLED_FLAG: &str = "ENABLED=\"true\"";

/// How sysstat collection gets switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysstatStrategy {
    /// Enable the sysstat service and its collect/summary timers.
    SystemdTimer,
    /// Flip `ENABLED="false"` to `"true"` in the defaults file.
    DefaultFile,
}

impl std::fmt::Display for SysstatStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SystemdTimer => write!(f, "systemd timer"),
            Self::DefaultFile => write!(f, "{SYSSTAT_DEFAULT_FILE}"),
        }
    }
}

/// Host paths setup touches, overridable for tests.
#[derive(Debug, Clone)]
pub struct SetupPaths {
    pub sysstat_default: PathBuf,
}

impl Default for SetupPaths {
    fn default() -> Self {
        Self {
            sysstat_default: PathBuf::from(SYSSTAT_DEFAULT_FILE),
        }
    }
}

/// What setup did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReport {
    /// Interface registered with vnstat.
    pub interface: String,
    pub strategies: Vec<SysstatStrategy>,
    /// Non-fatal steps that failed.
    pub warnings: usize,
}

/// Every strategy that applies to this host.
pub fn detect_strategies(
    runner: &dyn CommandRunner,
    config: &AuditConfig,
    paths: &SetupPaths,
) -> Vec<SysstatStrategy> {
    let mut strategies = Vec::new();

    let args = ["list-unit-files", COLLECT_TIMER];
    match runner.run_argv("systemctl", &args, config.probe_timeout) {
        Ok(out) if out.stdout.contains(COLLECT_TIMER) => {
            strategies.push(SysstatStrategy::SystemdTimer);
        }
        Ok(_) => {}
        Err(e) => info!("{}: {e}; no systemd timer", describe_argv("systemctl", &args)),
    }

    match fs::read_to_string(&paths.sysstat_default) {
        Ok(content) if content.contains(DISABLED_FLAG) => {
            strategies.push(SysstatStrategy::DefaultFile);
        }
        Ok(_) => {}
        Err(e) => info!("{}: {e}", paths.sysstat_default.display()),
    }
    strategies
}

/// Install packages and enable data collection. Package installation
/// failures are fatal; every later step only logs.
pub fn run_setup(
    runner: &dyn CommandRunner,
    config: &AuditConfig,
    paths: &SetupPaths,
) -> Result<SetupReport> {
    info!("=== Running first-time setup ===");
    let mut warnings = 0;

    required(runner, "apt-get", &["update", "-qq"], config)?;
    let mut install = vec!["install", "-y"];
    install.extend_from_slice(REQUIRED_PACKAGES);
    required(runner, "apt-get", &install, config)?;

    let strategies = detect_strategies(runner, config, paths);
    if strategies.is_empty() {
        info!("sysstat already enabled or no enablement mechanism found");
    }
    for strategy in &strategies {
        info!("Enabling sysstat via {strategy}");
        match strategy {
            SysstatStrategy::SystemdTimer => {
                for unit in ["sysstat", COLLECT_TIMER, SUMMARY_TIMER] {
                    warnings += usize::from(!enable_unit(runner, unit, config));
                }
            }
            SysstatStrategy::DefaultFile => {
                if let Err(e) = enable_default_file(&paths.sysstat_default) {
                    warn!("Could not update {}: {e}", paths.sysstat_default.display());
                    warnings += 1;
                }
                if !strategies.contains(&SysstatStrategy::SystemdTimer) {
                    warnings += usize::from(!enable_unit(runner, "sysstat", config));
                }
            }
        }
    }

    warnings += usize::from(!enable_unit(runner, "vnstat", config));
    let interface = primary_interface(runner, config);
    match query_registered(runner, &interface, 1, config.sampler_timeout) {
        Ok(_) => info!("vnstat: interface {interface} is in the database"),
        Err(e) => {
            warn!("vnstat: could not register {interface}: {e}");
            warnings += 1;
        }
    }

    fs::create_dir_all(&config.data_dir)?;
    info!("=== Setup completed: interface {interface}, {warnings} warning(s) ===");
    Ok(SetupReport {
        interface,
        strategies,
        warnings,
    })
}

fn required(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    config: &AuditConfig,
) -> Result<()> {
    runner
        .run_argv(program, args, config.install_timeout)
        .map(|_| ())
        .map_err(|failure| {
            error!("{}: {failure}", describe_argv(program, args));
            AuditError::from_failure(program, failure)
        })
}

fn enable_unit(runner: &dyn CommandRunner, unit: &str, config: &AuditConfig) -> bool {
    let args = ["enable", "--now", unit];
    match runner.run_argv("systemctl", &args, config.probe_timeout) {
        Ok(_) => {
            info!("Enabled {unit}");
            true
        }
        Err(e) => {
            warn!("{}: {e}", describe_argv("systemctl", &args));
            false
        }
    }
}

/// Rewrite `ENABLED="false"` as `ENABLED="true"`, keeping the file's mode.
fn enable_default_file(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)?;
    if !content.contains(DISABLED_FLAG) {
        return Ok(());
    }
    let updated = content.replace(DISABLED_FLAG, ENABLED_FLAG);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(updated.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), fs::metadata(path)?.permissions())?;
    tmp.persist(path).map_err(|e| AuditError::Io(e.error))?;
    info!("Set {ENABLED_FLAG} in {}", path.display());
    Ok(())
}
