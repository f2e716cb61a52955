//! TrafficCollector: daily interface totals from vnstat.
//!
//! vnstat has shipped two JSON generations:
//!
//! | generation | `jsonversion` | day array | day key            | unit  |
//! |------------|---------------|-----------|--------------------|-------|
//! | older      | `"1"`         | `days`    | `id` (0 = today)   | KiB   |
//! | newer      | `"2"`         | `day`     | `date {y, m, d}`   | bytes |
//!
//! Reading newer output as older (or the reverse) is off by a factor of 1024
//! without any visible error, so the generation is detected explicitly and
//! an undecidable payload is rejected.

use std::time::Duration;

use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::{AuditError, Result, truncate_fragment};
use crate::runner::{CommandRunner, describe_argv};
use crate::table::{Table, Value};

use super::interface::primary_interface;
use super::{Artifact, Collector, CollectorInfo, RunContext, run_tool};

pub const HEADERS: [&str; 6] = ["Interface", "Date", "RX_Bytes", "TX_Bytes", "RX_GB", "TX_GB"];

const BYTES_PER_KIB: u64 = 1024;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// vnstat JSON schema generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonGeneration {
    /// vnstat 1.x: KiB values, entries identified by days-ago `id`.
    Older,
    /// vnstat 2.x: byte values, entries carry a `date` object.
    Newer,
}

impl JsonGeneration {
    fn to_bytes(self, raw: u64) -> u64 {
        match self {
            Self::Older => raw.saturating_mul(BYTES_PER_KIB),
            Self::Newer => raw,
        }
    }
}

impl std::fmt::Display for JsonGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Older => write!(f, "vnstat 1.x (KiB)"),
            Self::Newer => write!(f, "vnstat 2.x (bytes)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VnstatDoc {
    #[serde(default)]
    jsonversion: Option<serde_json::Value>,
    #[serde(default)]
    interfaces: Vec<VnstatInterface>,
}

#[derive(Debug, Deserialize)]
struct VnstatInterface {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    traffic: VnstatTraffic,
}

impl VnstatInterface {
    fn is_named(&self, iface: &str) -> bool {
        self.name.as_deref() == Some(iface)
            || self.id.as_ref().and_then(|v| v.as_str()) == Some(iface)
    }
}

#[derive(Debug, Default, Deserialize)]
struct VnstatTraffic {
    #[serde(default, alias = "days")]
    day: Vec<DayEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayEntry {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub date: Option<VnstatDate>,
    #[serde(default)]
    pub rx: u64,
    #[serde(default)]
    pub tx: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VnstatDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

/// One normalized daily total, in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficDayEntry {
    pub interface: String,
    pub date: NaiveDate,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Decide which generation produced `entries`.
///
/// An explicit `jsonversion` wins. Without one, the entries themselves must
/// agree: all dated and none numbered is newer, all numbered and none dated
/// is older. Returns `Ok(None)` when there is nothing to decide.
pub fn detect_generation(
    version: Option<&serde_json::Value>,
    entries: &[DayEntry],
    raw: &str,
) -> Result<Option<JsonGeneration>> {
    let mismatch = || AuditError::SchemaVersionMismatch {
        fragment: truncate_fragment(raw),
    };

    if let Some(version) = version {
        let label = match version {
            serde_json::Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        return match label.as_str() {
            "1" => Ok(Some(JsonGeneration::Older)),
            "2" => Ok(Some(JsonGeneration::Newer)),
            _ => Err(mismatch()),
        };
    }

    if entries.is_empty() {
        return Ok(None);
    }
    let dated = entries.iter().filter(|e| e.date.is_some()).count();
    let numbered = entries.iter().filter(|e| e.id.is_some()).count();
    match (dated, numbered) {
        (d, 0) if d == entries.len() => Ok(Some(JsonGeneration::Newer)),
        (0, n) if n == entries.len() => Ok(Some(JsonGeneration::Older)),
        _ => Err(mismatch()),
    }
}

/// Parse `vnstat --json d` output into daily totals for `iface`, oldest first.
///
/// `today` anchors older-generation `id` offsets.
pub fn parse_vnstat(raw: &str, iface: &str, today: NaiveDate) -> Result<Vec<TrafficDayEntry>> {
    let doc: VnstatDoc = serde_json::from_str(raw)
        .map_err(|e| AuditError::malformed("vnstat", format!("invalid JSON: {e}"), raw))?;

    let Some(selected) = doc
        .interfaces
        .iter()
        .find(|i| i.is_named(iface))
        .or_else(|| doc.interfaces.first())
    else {
        return Err(AuditError::malformed("vnstat", "no interfaces in output", raw));
    };
    if !selected.is_named(iface) {
        warn!("vnstat has no entry named {iface}; using the first interface listed");
    }
    let name = selected
        .name
        .clone()
        .or_else(|| selected.id.as_ref().and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| iface.to_string());

    let entries = &selected.traffic.day;
    let Some(generation) = detect_generation(doc.jsonversion.as_ref(), entries, raw)? else {
        return Ok(Vec::new());
    };
    debug!("vnstat output detected as {generation}");

    let mut days = Vec::with_capacity(entries.len());
    for entry in entries {
        let date = match (entry.date, entry.id) {
            (Some(d), _) => NaiveDate::from_ymd_opt(d.year, d.month, d.day),
            (None, Some(id)) => today.checked_sub_days(Days::new(id)),
            (None, None) => None,
        };
        let Some(date) = date else {
            warn!(
                "{}",
                AuditError::malformed("vnstat", "day entry without a usable date", raw)
            );
            continue;
        };
        days.push(TrafficDayEntry {
            interface: name.clone(),
            date,
            rx_bytes: generation.to_bytes(entry.rx),
            tx_bytes: generation.to_bytes(entry.tx),
        });
    }
    days.sort_by_key(|d| d.date);
    Ok(days)
}

fn gib(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_GIB * 100.0).round() / 100.0
}

fn to_table(days: Vec<TrafficDayEntry>) -> Result<Table> {
    let mut table = Table::new("traffic", HEADERS);
    for d in days {
        table.push_row(vec![
            Value::Text(d.interface),
            Value::Text(d.date.format("%Y-%m-%d").to_string()),
            Value::Int(i64::try_from(d.rx_bytes).unwrap_or(i64::MAX)),
            Value::Int(i64::try_from(d.tx_bytes).unwrap_or(i64::MAX)),
            Value::Float(gib(d.rx_bytes)),
            Value::Float(gib(d.tx_bytes)),
        ])?;
    }
    Ok(table)
}

/// Query daily totals for `iface`, registering it with vnstat first if the
/// initial query fails. Registration and the retry each happen at most once.
pub fn query_registered(
    runner: &dyn CommandRunner,
    iface: &str,
    days: u32,
    timeout: Duration,
) -> Result<String> {
    let days = days.to_string();
    let query = ["--json", "d", days.as_str(), "-i", iface];
    match runner.run_argv("vnstat", &query, timeout) {
        Ok(out) => Ok(out.stdout),
        Err(failure) => {
            warn!(
                "{} failed ({failure}); registering {iface} with vnstat",
                describe_argv("vnstat", &query)
            );
            match run_tool(runner, "vnstat", &["--add", "-i", iface], timeout) {
                Ok(_) => info!("vnstat: added interface {iface} to database"),
                Err(e) => warn!("vnstat --add failed for {iface}: {e}"),
            }
            run_tool(runner, "vnstat", &query, timeout)
        }
    }
}

/// Collects the daily traffic table for the primary interface.
pub struct TrafficCollector;

static TRAFFIC_INFO: CollectorInfo = CollectorInfo {
    name: "traffic",
    description: "Daily RX/TX totals for the primary interface from vnstat",
    tools: &["vnstat", "ip"],
    artifact: Artifact::Daily("network_traffic"),
};

impl Collector for TrafficCollector {
    fn info(&self) -> &CollectorInfo {
        &TRAFFIC_INFO
    }

    fn collect(&self, runner: &dyn CommandRunner, ctx: &RunContext<'_>) -> Result<Table> {
        let iface = primary_interface(runner, ctx.config);
        let raw = query_registered(
            runner,
            &iface,
            ctx.config.traffic_days,
            ctx.config.sampler_timeout,
        )?;
        let days = parse_vnstat(&raw, &iface, ctx.today)?;

        let report_date = ctx.report_date();
        match days.iter().find(|d| d.date == report_date) {
            Some(d) => info!(
                "Traffic collected for {iface} on {report_date}: RX={:.2} GB TX={:.2} GB",
                gib(d.rx_bytes),
                gib(d.tx_bytes)
            ),
            None => warn!("No vnstat data for {iface} on {report_date}"),
        }
        to_table(days)
    }
}
