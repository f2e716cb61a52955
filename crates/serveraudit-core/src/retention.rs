//! Rolling-window cleanup of data files and logs.
//!
//! Two horizons apply:
//!
//! - **data**: `*.csv` in the data directory whose file name embeds a
//!   `YYYY-MM-DD` date more than `data_days` before today. Files without a
//!   date in their name are aged by modification time. The hardware
//!   inventory is overwritten on every run and is never removed.
//! - **logs**: rotated logs in the log directory older than `log_days`
//!   (by modification time), plus entries inside the active log whose
//!   leading timestamp is older than `log_days`.
//!
//! A second sweep on the same day removes nothing.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};

use crate::collectors::HARDWARE_FILE;
use crate::config::{AuditConfig, LOG_FILE_NAME, RetentionPolicy};
use crate::error::Result;

const DATE_LEN: usize = "YYYY-MM-DD".len();
const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOG_TIMESTAMP_LEN: usize = "YYYY-MM-DD HH:MM:SS".len();

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Data files and rotated logs deleted, in deletion order.
    pub files_removed: Vec<PathBuf>,
    /// Entries dropped from the active log.
    pub log_entries_pruned: usize,
    /// Files that matched but could not be deleted.
    pub failures: usize,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Applies a [`RetentionPolicy`] to a data directory and a log directory.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    data_dir: PathBuf,
    log_dir: PathBuf,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            log_dir: log_dir.into(),
            policy,
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.data_dir, &config.log_dir, config.retention)
    }

    /// Remove everything older than the policy allows, relative to `today`.
    pub fn sweep(&self, today: NaiveDate) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        self.sweep_data(today, &mut report)?;
        self.sweep_rotated_logs(today, &mut report)?;
        report.log_entries_pruned = self.prune_active_log(today)?;
        info!(
            "Retention sweep: {} files removed, {} log entries pruned",
            report.files_removed.len(),
            report.log_entries_pruned
        );
        Ok(report)
    }

    fn sweep_data(&self, today: NaiveDate, report: &mut SweepReport) -> Result<()> {
        let limit = i64::from(self.policy.data_days);
        for path in list_files(&self.data_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == HARDWARE_FILE || !name.ends_with(".csv") {
                continue;
            }
            let date = match embedded_date(name) {
                Some(date) => date,
                None => match modified_date(&path) {
                    Some(date) => date,
                    None => continue,
                },
            };
            if (today - date).num_days() > limit {
                remove(&path, report);
            }
        }
        Ok(())
    }

    fn sweep_rotated_logs(&self, today: NaiveDate, report: &mut SweepReport) -> Result<()> {
        let limit = i64::from(self.policy.log_days);
        for path in list_files(&self.log_dir)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_rotated_log(name) {
                continue;
            }
            match modified_date(&path) {
                Some(date) if (today - date).num_days() > limit => remove(&path, report),
                _ => {}
            }
        }
        Ok(())
    }

    /// Drop entries older than the log horizon from the active log.
    ///
    /// The file is rewritten in place rather than replaced, because the
    /// logger of the current process still holds it open for appending.
    fn prune_active_log(&self, today: NaiveDate) -> Result<usize> {
        let path = self.log_dir.join(LOG_FILE_NAME);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let (kept, pruned) = prune_entries(&content, today, self.policy.log_days);
        if pruned > 0 {
            let mut file = OpenOptions::new().write(true).truncate(true).open(&path)?;
            file.write_all(kept.as_bytes())?;
            file.flush()?;
        }
        Ok(pruned)
    }
}

/// Split `content` into log entries and drop those whose timestamp is more
/// than `log_days` before `today`. Lines without a leading timestamp belong
/// to the entry above them. Returns the kept text and the number of entries
/// dropped.
pub fn prune_entries(content: &str, today: NaiveDate, log_days: u32) -> (String, usize) {
    let limit = i64::from(log_days);
    let mut kept = String::with_capacity(content.len());
    let mut pruned = 0;
    let mut keeping = true;

    for line in content.split_inclusive('\n') {
        if let Some(stamp) = entry_timestamp(line) {
            keeping = (today - stamp.date()).num_days() <= limit;
            if !keeping {
                pruned += 1;
            }
        }
        if keeping {
            kept.push_str(line);
        }
    }
    (kept, pruned)
}

fn entry_timestamp(line: &str) -> Option<NaiveDateTime> {
    let head = line.get(..LOG_TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(head, LOG_TIMESTAMP_FORMAT).ok()
}

/// First `YYYY-MM-DD` date embedded anywhere in `name`.
pub fn embedded_date(name: &str) -> Option<NaiveDate> {
    (0..name.len().saturating_sub(DATE_LEN - 1)).find_map(|start| {
        let candidate = name.get(start..start + DATE_LEN)?;
        if !candidate.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(candidate, "%Y-%m-%d").ok()
    })
}

/// `audit.log.1`, `audit.log.2.gz`, `old.log` and the like, but not the
/// active log.
fn is_rotated_log(name: &str) -> bool {
    name != LOG_FILE_NAME && (name.ends_with(".log") || name.contains(".log."))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist; nothing to sweep", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn modified_date(path: &Path) -> Option<NaiveDate> {
    let modified: SystemTime = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

fn remove(path: &Path, report: &mut SweepReport) {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Deleted old file: {}", path.display());
            report.files_removed.push(path.to_path_buf());
        }
        Err(e) => {
            warn!("Could not delete {}: {e}", path.display());
            report.failures += 1;
        }
    }
}
