//! Run configuration.
//!
//! One [`AuditConfig`] value is built per process (defaults overlaid with CLI
//! flags) and passed by reference into the orchestrator and every collector.
//! Nothing in the crate reads paths or limits from global state, so tests can
//! point a collector at a temporary directory.

use std::path::PathBuf;
use std::time::Duration;

/// Default root for logs and data.
pub const DEFAULT_LOG_DIR: &str = "/var/log/server-audit";
/// Default sysstat archive directory on Debian/Ubuntu.
pub const DEFAULT_SYSSTAT_DIR: &str = "/var/log/sysstat";
/// Name of the append-only run log inside the log directory.
pub const LOG_FILE_NAME: &str = "audit.log";

/// How long data files and log entries are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Dated CSV files older than this many days are removed.
    pub data_days: u32,
    /// Log entries and rotated logs older than this many days are removed.
    pub log_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            data_days: 7,
            log_days: 1,
        }
    }
}

/// Everything a run needs to know about its environment.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Where CSV tables are written.
    pub data_dir: PathBuf,
    /// Where `audit.log` and rotated logs live.
    pub log_dir: PathBuf,
    /// sysstat archive directory (`saDD` / `saYYYYMMDD` files).
    pub sysstat_dir: PathBuf,
    pub retention: RetentionPolicy,
    /// Skip primary-interface detection and use this name.
    pub interface: Option<String>,
    /// Timeout for quick inventory probes.
    pub probe_timeout: Duration,
    /// Timeout for sadf, pidstat, nethogs and vnstat.
    pub sampler_timeout: Duration,
    /// Timeout for package installation during setup.
    pub install_timeout: Duration,
    /// pidstat sampling interval in seconds.
    pub pidstat_interval_secs: u32,
    /// Number of pidstat samples.
    pub pidstat_count: u32,
    /// Number of nethogs refresh cycles.
    pub nethogs_cycles: u32,
    /// Number of daily vnstat entries requested.
    pub traffic_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let log_dir = PathBuf::from(DEFAULT_LOG_DIR);
        Self {
            data_dir: log_dir.join("data"),
            log_dir,
            sysstat_dir: PathBuf::from(DEFAULT_SYSSTAT_DIR),
            retention: RetentionPolicy::default(),
            interface: None,
            probe_timeout: Duration::from_secs(60),
            sampler_timeout: Duration::from_secs(30),
            install_timeout: Duration::from_secs(180),
            pidstat_interval_secs: 1,
            pidstat_count: 3,
            nethogs_cycles: 5,
            traffic_days: 24,
        }
    }
}

impl AuditConfig {
    /// Path of the append-only run log.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}
