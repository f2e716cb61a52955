//! SystemMetricsCollector: one day of sysstat history as a wide table.
//!
//! `sadf -d` prints one block per requested activity (`-u -r -b -n DEV -q`),
//! each introduced by its own `#` header line:
//!
//! ```text
//! # hostname;interval;timestamp;CPU;%user;%nice;%system;%iowait;%steal;%idle
//! web01;600;2026-02-22 00:10:01 UTC;-1;2.15;0.00;0.88;0.12;0.00;96.85
//! # hostname;interval;timestamp;IFACE;rxpck/s;txpck/s;rxkB/s;txkB/s;...
//! web01;600;2026-02-22 00:10:01 UTC;eth0;12.00;9.50;1.20;0.80;...
//! ```
//!
//! Blocks are parsed independently and merged on the timestamp column. A block
//! whose first metric is a dimension (`CPU`, `IFACE`, `DEV`) prefixes its
//! metric names with the dimension value, so `eth0 rxkB/s` and `lo rxkB/s`
//! become separate columns. Any block may be missing: an activity that was not
//! collected simply contributes no columns.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};

use crate::error::{AuditError, Result};
use crate::runner::{CommandFailure, CommandRunner, describe_argv};
use crate::table::{Table, Value};

use super::{Artifact, Collector, CollectorInfo, RunContext};

pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Activities requested from sar through sadf.
const SAR_ACTIVITIES: &[&str] = &["-u", "-r", "-b", "-n", "DEV", "-q"];

/// Columns naming the sample rather than measuring it.
const KEY_COLUMNS: &[&str] = &["hostname", "interval", "timestamp"];

/// Columns that split a block into per-CPU / per-device series.
const DIMENSION_COLUMNS: &[&str] = &["CPU", "IFACE", "DEV"];

/// Which of the two sysstat archive naming schemes a file follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysstatArchive {
    /// `saYYYYMMDD`, used when sysstat keeps more than 28 days of history.
    Dated(PathBuf),
    /// `saDD`, the default rolling monthly scheme.
    DayOfMonth(PathBuf),
}

impl SysstatArchive {
    pub fn path(&self) -> &Path {
        match self {
            Self::Dated(p) | Self::DayOfMonth(p) => p,
        }
    }
}

/// Find the archive holding `date` under `dir`.
///
/// A `saDD` file last modified before `date` belongs to an earlier month and
/// is ignored.
pub fn locate_archive(dir: &Path, date: NaiveDate) -> Option<SysstatArchive> {
    let dated = dir.join(format!("sa{}", date.format("%Y%m%d")));
    if dated.is_file() {
        return Some(SysstatArchive::Dated(dated));
    }

    let short = dir.join(format!("sa{}", date.format("%d")));
    let modified = fs::metadata(&short).and_then(|m| m.modified()).ok()?;
    let modified_day = DateTime::<Local>::from(modified).date_naive();
    if modified_day < date {
        warn!(
            "{} was last written on {modified_day}, before {date}; treating as stale",
            short.display()
        );
        return None;
    }
    Some(SysstatArchive::DayOfMonth(short))
}

/// Collects the sysstat summary table.
pub struct SystemMetricsCollector;

static SYSTEM_INFO: CollectorInfo = CollectorInfo {
    name: "system",
    description: "24h CPU, memory, I/O, network and load history from sysstat",
    tools: &["sadf"],
    artifact: Artifact::Daily("system_summary"),
};

impl Collector for SystemMetricsCollector {
    fn info(&self) -> &CollectorInfo {
        &SYSTEM_INFO
    }

    fn collect(&self, runner: &dyn CommandRunner, ctx: &RunContext<'_>) -> Result<Table> {
        let date = ctx.report_date();
        let Some(archive) = locate_archive(&ctx.config.sysstat_dir, date) else {
            warn!(
                "No sysstat archive for {date} in {}; collection may not have run yet",
                ctx.config.sysstat_dir.display()
            );
            return Ok(empty_table());
        };

        let path = archive.path().to_string_lossy().into_owned();
        let mut args = vec!["-d", "-s", "00:00:00", "-e", "23:59:59", path.as_str(), "--"];
        args.extend_from_slice(SAR_ACTIVITIES);

        let stdout = match runner.run_argv("sadf", &args, ctx.config.sampler_timeout) {
            Ok(out) => out.stdout,
            // sadf exits non-zero on empty or truncated archives.
            Err(CommandFailure::NonZeroExit { code, result }) => {
                warn!(
                    "{} exited {code}: {}; reporting no samples",
                    describe_argv("sadf", &args),
                    result.stderr.trim()
                );
                return Ok(empty_table());
            }
            Err(failure) => {
                warn!("{}: {failure}", describe_argv("sadf", &args));
                return Err(AuditError::from_failure("sadf", failure));
            }
        };

        let table = parse_sadf(&stdout)?;
        if table.is_empty() {
            warn!("sadf returned no samples for {}", archive.path().display());
        } else {
            info!(
                "System summary collected: {} samples x {} columns from {}",
                table.len(),
                table.headers().len(),
                archive.path().display()
            );
        }
        Ok(table)
    }
}

fn empty_table() -> Table {
    Table::new("system", [TIMESTAMP_COLUMN])
}

struct Block {
    columns: Vec<String>,
    timestamp: usize,
    dimension: Option<usize>,
}

impl Block {
    fn from_header(line: &str) -> Option<Self> {
        let columns: Vec<String> = line
            .trim_start_matches('#')
            .split(';')
            .map(|c| c.trim().to_string())
            .collect();
        let timestamp = columns.iter().position(|c| c == "timestamp")?;
        let dimension = columns
            .get(timestamp + 1)
            .filter(|c| DIMENSION_COLUMNS.contains(&c.as_str()))
            .map(|_| timestamp + 1);
        Some(Self {
            columns,
            timestamp,
            dimension,
        })
    }

    fn metric_name(&self, column: usize, fields: &[&str]) -> Option<String> {
        let name = &self.columns[column];
        if KEY_COLUMNS.contains(&name.as_str()) || Some(column) == self.dimension {
            return None;
        }
        Some(match self.dimension {
            Some(d) => {
                let series = match fields[d].trim() {
                    "-1" => "all",
                    other => other,
                };
                format!("{series} {name}")
            }
            None => name.clone(),
        })
    }
}

/// Merge every block of `sadf -d` output into one table keyed by timestamp.
pub fn parse_sadf(raw: &str) -> Result<Table> {
    let mut samples: BTreeMap<String, HashMap<String, Value>> = BTreeMap::new();
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut block: Option<Block> = None;

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('#') {
            block = Block::from_header(line);
            if block.is_none() {
                warn!("{}", AuditError::malformed("sadf", "header without timestamp column", line));
            }
            continue;
        }
        let Some(current) = block.as_ref() else {
            debug!("sadf: skipping line outside a block: {line}");
            continue;
        };

        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != current.columns.len() {
            if line.contains("LINUX-RESTART") || line.contains("COM ") {
                debug!("sadf: skipping marker record: {line}");
            } else {
                warn!(
                    "{}",
                    AuditError::malformed(
                        "sadf",
                        format!("{} fields, header has {}", fields.len(), current.columns.len()),
                        line,
                    )
                );
            }
            continue;
        }

        let timestamp = fields[current.timestamp].trim().to_string();
        let sample = samples.entry(timestamp).or_default();
        for (idx, raw_value) in fields.iter().enumerate() {
            let Some(name) = current.metric_name(idx, &fields) else {
                continue;
            };
            if seen.insert(name.clone()) {
                columns.push(name.clone());
            }
            sample.insert(name, Value::parse_numeric(raw_value));
        }
    }

    let mut table = Table::new(
        "system",
        std::iter::once(TIMESTAMP_COLUMN.to_string()).chain(columns.iter().cloned()),
    );
    for (timestamp, mut values) in samples {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(Value::Text(timestamp));
        for column in &columns {
            row.push(values.remove(column).unwrap_or_else(Value::empty));
        }
        table.push_row(row)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::runner::scripted::{Reply, ScriptedRunner};

    const SADF: &str = "\
# hostname;interval;timestamp;CPU;%user;%nice;%system;%iowait;%steal;%idle
web01;600;2026-02-22 00:10:01 UTC;-1;2.15;0.00;0.88;0.12;0.00;96.85
web01;600;2026-02-22 00:20:01 UTC;-1;3.40;0.00;1.02;0.30;0.00;95.28
web01;-1;2026-02-22 08:00:01 UTC;LINUX-RESTART\t(4 CPU)
# hostname;interval;timestamp;kbmemfree;kbavail;kbmemused;%memused
web01;600;2026-02-22 00:10:01 UTC;812344;11534336;3981212;24.87
web01;600;2026-02-22 00:20:01 UTC;810020;11530000;3990000;24.93
# hostname;interval;timestamp;IFACE;rxpck/s;txpck/s;rxkB/s;txkB/s
web01;600;2026-02-22 00:10:01 UTC;lo;0.50;0.50;0.03;0.03
web01;600;2026-02-22 00:10:01 UTC;eth0;12.00;9.50;1.20;0.80
web01;600;2026-02-22 00:20:01 UTC;eth0;15.00;11.00;1.90;1.10
# hostname;interval;timestamp;runq-sz;plist-sz;ldavg-1;ldavg-5;ldavg-15;blocked
web01;600;2026-02-22 00:20:01 UTC;1;412;0.21;0.18;0.12;0
";

    #[test]
    fn merges_blocks_on_timestamp() {
        let t = parse_sadf(SADF).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.headers()[0], TIMESTAMP_COLUMN);
        assert_eq!(t.get(0, "Timestamp"), Some(&Value::text("2026-02-22 00:10:01 UTC")));
        assert_eq!(t.get(0, "all %user"), Some(&Value::Float(2.15)));
        assert_eq!(t.get(1, "%memused"), Some(&Value::Float(24.93)));
        assert_eq!(t.get(0, "eth0 rxkB/s"), Some(&Value::Float(1.2)));
        assert_eq!(t.get(0, "lo rxkB/s"), Some(&Value::Float(0.03)));
        assert!(t.column("hostname").is_none());
        assert!(t.column("IFACE").is_none());
    }

    #[test]
    fn missing_cells_are_empty_not_dropped() {
        let t = parse_sadf(SADF).unwrap();
        // lo only reported at 00:10, load only at 00:20.
        assert_eq!(t.get(1, "lo rxkB/s"), Some(&Value::empty()));
        assert_eq!(t.get(0, "ldavg-1"), Some(&Value::empty()));
        assert_eq!(t.get(1, "ldavg-1"), Some(&Value::Float(0.21)));
        for row in t.rows() {
            assert_eq!(row.len(), t.headers().len());
        }
    }

    #[test]
    fn absent_blocks_still_parse() {
        let only_load = "\
# hostname;interval;timestamp;runq-sz;plist-sz;ldavg-1;ldavg-5;ldavg-15;blocked
web01;600;2026-02-22 00:10:01 UTC;0;401;0.05;0.07;0.02;0
";
        let t = parse_sadf(only_load).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(
            t.headers(),
            ["Timestamp", "runq-sz", "plist-sz", "ldavg-1", "ldavg-5", "ldavg-15", "blocked"]
        );
    }

    #[test]
    fn empty_output_gives_header_only() {
        let t = parse_sadf("").unwrap();
        assert!(t.is_empty());
        assert_eq!(t.headers(), [TIMESTAMP_COLUMN]);
    }

    #[test]
    fn short_line_is_skipped() {
        let raw = "\
# hostname;interval;timestamp;runq-sz;ldavg-1
web01;600;2026-02-22 00:10:01 UTC;1
web01;600;2026-02-22 00:20:01 UTC;1;0.5
";
        let t = parse_sadf(raw).unwrap();
        assert_eq!(t.len(), 1);
    }

    fn ctx_for(dir: &Path) -> AuditConfig {
        AuditConfig {
            sysstat_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn prefers_dated_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 22).unwrap();
        std::fs::write(tmp.path().join("sa20260222"), b"").unwrap();
        std::fs::write(tmp.path().join("sa22"), b"").unwrap();
        assert!(matches!(
            locate_archive(tmp.path(), date),
            Some(SysstatArchive::Dated(_))
        ));
    }

    #[test]
    fn missing_archive_is_soft() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ctx_for(tmp.path());
        let ctx = RunContext::new(&config, NaiveDate::from_ymd_opt(2026, 2, 23).unwrap());
        let runner = ScriptedRunner::new();

        let t = SystemMetricsCollector.collect(&runner, &ctx).unwrap();
        assert!(t.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn reads_day_of_month_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let today = Local::now().date_naive();
        let config = ctx_for(tmp.path());
        let ctx = RunContext::new(&config, today);
        let yesterday = ctx.report_date();
        let sa = tmp.path().join(format!("sa{}", yesterday.format("%d")));
        std::fs::write(&sa, b"binary").unwrap();

        let key = format!(
            "sadf -d -s 00:00:00 -e 23:59:59 {} -- -u -r -b -n DEV -q",
            sa.display()
        );
        let runner = ScriptedRunner::new().ok(&key, SADF);
        let t = SystemMetricsCollector.collect(&runner, &ctx).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(runner.count(&key), 1);
    }

    #[test]
    fn sadf_nonzero_exit_is_soft() {
        let tmp = tempfile::tempdir().unwrap();
        let today = Local::now().date_naive();
        let config = ctx_for(tmp.path());
        let ctx = RunContext::new(&config, today);
        let sa = tmp
            .path()
            .join(format!("sa{}", ctx.report_date().format("%Y%m%d")));
        std::fs::write(&sa, b"").unwrap();

        let key = format!(
            "sadf -d -s 00:00:00 -e 23:59:59 {} -- -u -r -b -n DEV -q",
            sa.display()
        );
        let runner = ScriptedRunner::new().on(
            &key,
            Reply::Exit(2, "End of system activity file unexpected".into()),
        );
        let t = SystemMetricsCollector.collect(&runner, &ctx).unwrap();
        assert!(t.is_empty());
    }
}
