//! ProcessSnapshotCollector: per-process CPU, memory, disk and network.
//!
//! Two short samplers run back to back:
//!
//! - `pidstat -u -r -d -h 1 3` for CPU, memory and disk I/O, one line per
//!   process per sample;
//! - `nethogs -t -c 5 -v 0 <iface>` for per-process bandwidth.
//!
//! Their rows are joined on PID. A process seen by only one sampler keeps zero
//! for the other sampler's metrics.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::error::{AuditError, Result};
use crate::runner::CommandRunner;
use crate::table::{Table, Value};

use super::interface::primary_interface;
use super::{Artifact, Collector, CollectorInfo, RunContext, run_tool};

pub const HEADERS: [&str; 10] = [
    "PID",
    "UID",
    "Command",
    "%CPU",
    "%MEM",
    "RSS_KB",
    "kB_rd/s",
    "kB_wr/s",
    "Net_Sent_KB/s",
    "Net_Recv_KB/s",
];

/// One row of pidstat output, reduced to the columns kept in the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidstatSample {
    pub pid: u32,
    pub uid: u32,
    pub command: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub rss_kb: f64,
    pub read_kbs: f64,
    pub write_kbs: f64,
}

/// One process line from a nethogs refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NethogsSample {
    pub pid: u32,
    pub uid: u32,
    /// Program path as printed by nethogs.
    pub program: String,
    pub sent_kbs: f64,
    pub recv_kbs: f64,
}

/// Joined per-process record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub uid: u32,
    pub command: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub rss_kb: f64,
    pub read_kbs: f64,
    pub write_kbs: f64,
    pub net_sent_kbs: f64,
    pub net_recv_kbs: f64,
}

impl ProcessSample {
    fn into_row(self) -> Vec<Value> {
        vec![
            Value::Int(i64::from(self.pid)),
            Value::Int(i64::from(self.uid)),
            Value::Text(self.command),
            Value::Float(self.cpu_percent),
            Value::Float(self.mem_percent),
            Value::Float(self.rss_kb),
            Value::Float(self.read_kbs),
            Value::Float(self.write_kbs),
            Value::Float(self.net_sent_kbs),
            Value::Float(self.net_recv_kbs),
        ]
    }
}

// ---------------------------------------------------------------------------
// pidstat
// ---------------------------------------------------------------------------

/// Parse `pidstat -h` output. Keyed by PID; a later sample of the same PID
/// overwrites the columns it reports.
///
/// Column positions come from the most recent `#` header line, so releases
/// that add or drop columns (`%wait`, `iodelay`, ...) parse the same way.
/// `Command` is always last and keeps any embedded spaces.
pub fn parse_pidstat(raw: &str) -> BTreeMap<u32, PidstatSample> {
    let mut samples: BTreeMap<u32, PidstatSample> = BTreeMap::new();
    let mut header: Option<Vec<&str>> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Average:") || trimmed.starts_with("Linux ")
        {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('#') {
            let columns: Vec<&str> = rest.split_whitespace().collect();
            if columns.contains(&"PID") {
                header = Some(columns);
            }
            continue;
        }
        let Some(columns) = header.as_deref() else {
            debug!("pidstat: skipping line before header: {trimmed}");
            continue;
        };

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < columns.len() {
            warn!(
                "{}",
                AuditError::malformed(
                    "pidstat",
                    format!("{} fields, header has {}", fields.len(), columns.len()),
                    line,
                )
            );
            continue;
        }

        let last = columns.len() - 1;
        let command = if columns[last] == "Command" {
            fields[last..].join(" ")
        } else {
            String::new()
        };
        let row: Vec<(&str, &str)> = columns.iter().copied().zip(fields).collect();
        apply_row(&mut samples, &row, command, line);
    }
    samples
}

fn apply_row(
    samples: &mut BTreeMap<u32, PidstatSample>,
    row: &[(&str, &str)],
    command: String,
    line: &str,
) {
    let lookup = |name: &str| row.iter().find(|(n, _)| *n == name).map(|(_, v)| *v);

    let Some(pid) = lookup("PID").and_then(|v| v.parse::<u32>().ok()) else {
        warn!("{}", AuditError::malformed("pidstat", "PID is not a number", line));
        return;
    };

    let sample = samples.entry(pid).or_insert_with(|| PidstatSample {
        pid,
        ..Default::default()
    });
    if let Some(uid) = lookup("UID").and_then(|v| v.parse().ok()) {
        sample.uid = uid;
    }
    if !command.is_empty() {
        sample.command = command;
    }
    let metric = |name: &str| lookup(name).and_then(parse_rate);
    if let Some(v) = metric("%CPU") {
        sample.cpu_percent = v;
    }
    if let Some(v) = metric("%MEM") {
        sample.mem_percent = v;
    }
    if let Some(v) = metric("RSS") {
        sample.rss_kb = v;
    }
    if let Some(v) = metric("kB_rd/s") {
        sample.read_kbs = v;
    }
    if let Some(v) = metric("kB_wr/s") {
        sample.write_kbs = v;
    }
}

/// Whether `raw` has anything besides the banner, headers and averages.
/// A quiet host produces only the banner.
fn has_sample_lines(raw: &str) -> bool {
    raw.lines().map(str::trim).any(|l| {
        !l.is_empty() && !l.starts_with('#') && !l.starts_with("Average:") && !l.starts_with("Linux ")
    })
}

/// pidstat prints `-1.00` for I/O it may not read; report those as zero.
fn parse_rate(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0))
}

// ---------------------------------------------------------------------------
// nethogs
// ---------------------------------------------------------------------------

const REFRESH_MARKER: &str = "Refreshing:";

/// Parse `nethogs -t` trace output. Keyed by PID; later refreshes overwrite
/// earlier ones. Unattributed traffic (PID 0) is dropped.
pub fn parse_nethogs(raw: &str) -> BTreeMap<u32, NethogsSample> {
    let mut samples = BTreeMap::new();
    let mut in_refresh = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed == REFRESH_MARKER {
            in_refresh = true;
            continue;
        }
        if !in_refresh || trimmed.is_empty() {
            continue;
        }
        match parse_nethogs_line(line) {
            Some(sample) if sample.pid != 0 => {
                samples.insert(sample.pid, sample);
            }
            Some(_) => {}
            None => debug!("nethogs: skipping unrecognized line: {trimmed}"),
        }
    }
    samples
}

/// Split one `path/PID/UID<TAB>sent<TAB>received` line.
///
/// The path itself may contain `/`, so PID and UID are taken from the right.
pub fn parse_nethogs_line(line: &str) -> Option<NethogsSample> {
    let fields: Vec<&str> = line.trim_end().split('\t').collect();
    let [ident, sent, recv] = fields.as_slice() else {
        return None;
    };
    let mut parts = ident.rsplitn(3, '/');
    let uid = parts.next()?.parse().ok()?;
    let pid = parts.next()?.parse().ok()?;
    let program = parts.next()?.to_string();
    Some(NethogsSample {
        pid,
        uid,
        program,
        sent_kbs: sent.trim().parse().ok()?,
        recv_kbs: recv.trim().parse().ok()?,
    })
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Union of both samplers on PID, ordered by PID.
pub fn join_samples(
    pidstat: BTreeMap<u32, PidstatSample>,
    mut nethogs: BTreeMap<u32, NethogsSample>,
) -> Vec<ProcessSample> {
    let mut joined: BTreeMap<u32, ProcessSample> = pidstat
        .into_iter()
        .map(|(pid, p)| {
            let net = nethogs.remove(&pid);
            let sample = ProcessSample {
                pid,
                uid: p.uid,
                command: p.command,
                cpu_percent: p.cpu_percent,
                mem_percent: p.mem_percent,
                rss_kb: p.rss_kb,
                read_kbs: p.read_kbs,
                write_kbs: p.write_kbs,
                net_sent_kbs: net.as_ref().map_or(0.0, |n| n.sent_kbs),
                net_recv_kbs: net.as_ref().map_or(0.0, |n| n.recv_kbs),
            };
            (pid, sample)
        })
        .collect();

    for (pid, n) in nethogs {
        joined.insert(
            pid,
            ProcessSample {
                pid,
                uid: n.uid,
                command: n.program,
                net_sent_kbs: n.sent_kbs,
                net_recv_kbs: n.recv_kbs,
                ..Default::default()
            },
        );
    }
    joined.into_values().collect()
}

/// Collects the joined per-process table.
pub struct ProcessSnapshotCollector;

static PROCESS_INFO: CollectorInfo = CollectorInfo {
    name: "processes",
    description: "Per-process CPU, memory and disk (pidstat) joined with bandwidth (nethogs)",
    tools: &["pidstat", "nethogs"],
    artifact: Artifact::Daily("processes"),
};

impl Collector for ProcessSnapshotCollector {
    fn info(&self) -> &CollectorInfo {
        &PROCESS_INFO
    }

    fn collect(&self, runner: &dyn CommandRunner, ctx: &RunContext<'_>) -> Result<Table> {
        let config = ctx.config;
        let interval = config.pidstat_interval_secs.to_string();
        let count = config.pidstat_count.to_string();
        let raw = run_tool(
            runner,
            "pidstat",
            &["-u", "-r", "-d", "-h", &interval, &count],
            config.sampler_timeout,
        )?;
        let pidstat = parse_pidstat(&raw);
        if pidstat.is_empty() {
            if has_sample_lines(&raw) {
                return Err(AuditError::malformed("pidstat", "no parsable process rows", &raw));
            }
            warn!("pidstat reported no active tasks; writing an empty process snapshot");
            return Ok(Table::new("processes", HEADERS));
        }

        let iface = primary_interface(runner, ctx.config);
        let cycles = config.nethogs_cycles.to_string();
        let nethogs = match run_tool(
            runner,
            "nethogs",
            &["-t", "-c", &cycles, "-v", "0", &iface],
            config.sampler_timeout,
        ) {
            Ok(raw) => parse_nethogs(&raw),
            Err(e) => {
                warn!("Network usage per process unavailable, reporting zero: {e}");
                BTreeMap::new()
            }
        };

        let pidstat_count = pidstat.len();
        let nethogs_count = nethogs.len();
        let mut table = Table::new("processes", HEADERS);
        for sample in join_samples(pidstat, nethogs) {
            table.push_row(sample.into_row())?;
        }
        info!(
            "Process snapshot collected: {} processes ({pidstat_count} from pidstat, {nethogs_count} from nethogs on {iface})",
            table.len()
        );
        Ok(table)
    }
}
