//! HardwareCollector: static inventory of CPU, memory, disks, kernel and DMI.
//!
//! Each probe is one command plus a line parser producing `(key, value)`
//! pairs under a fixed category. Probes are independent; a failing probe
//! contributes nothing and the rest still run.

use log::{error, info, warn};

use crate::error::{AuditError, Result};
use crate::platform::OsRelease;
use crate::runner::{CommandRunner, describe_argv};
use crate::table::Table;

use super::{Artifact, Collector, CollectorInfo, HARDWARE_FILE, RunContext, run_tool};

pub const HEADERS: [&str; 3] = ["Category", "Key", "Value"];

/// DMI placeholders vendors leave in unset fields.
const DMI_PLACEHOLDERS: &[&str] = &[
    "Not Specified",
    "To Be Filled By O.E.M.",
    "Default string",
    "System manufacturer",
    "System Product Name",
];

type ParseFn = fn(&str) -> Vec<(String, String)>;

struct Probe {
    category: &'static str,
    program: &'static str,
    args: &'static [&'static str],
    parse: ParseFn,
}

static PROBES: &[Probe] = &[
    Probe {
        category: "CPU",
        program: "lscpu",
        args: &[],
        parse: parse_lscpu,
    },
    Probe {
        category: "Memory",
        program: "free",
        args: &["-h"],
        parse: parse_free,
    },
    Probe {
        category: "Disk",
        program: "df",
        args: &["-hP", "/"],
        parse: parse_df_root,
    },
    Probe {
        category: "Disk",
        program: "lsblk",
        args: &["-nd", "-o", "NAME,SIZE,TYPE"],
        parse: parse_lsblk,
    },
    Probe {
        category: "Hardware",
        program: "dmidecode",
        args: &["-s", "system-manufacturer"],
        parse: parse_dmi_manufacturer,
    },
    Probe {
        category: "Hardware",
        program: "dmidecode",
        args: &["-s", "system-product-name"],
        parse: parse_dmi_product,
    },
    Probe {
        category: "Kernel",
        program: "uname",
        args: &["-r"],
        parse: parse_kernel_version,
    },
    Probe {
        category: "Kernel",
        program: "uname",
        args: &["-m"],
        parse: parse_kernel_arch,
    },
    Probe {
        category: "System",
        program: "hostname",
        args: &["-f"],
        parse: parse_hostname,
    },
    Probe {
        category: "System",
        program: "uptime",
        args: &["-p"],
        parse: parse_uptime,
    },
    Probe {
        category: "System",
        program: "cat",
        args: &["/etc/os-release"],
        parse: parse_os_release,
    },
];

/// Collects the hardware inventory table.
pub struct HardwareCollector;

static HARDWARE_INFO: CollectorInfo = CollectorInfo {
    name: "hardware",
    description: "CPU, memory, disk, kernel and DMI inventory",
    tools: &[
        "lscpu", "free", "df", "lsblk", "dmidecode", "uname", "hostname", "uptime", "cat",
    ],
    artifact: Artifact::Inventory(HARDWARE_FILE),
};

impl Collector for HardwareCollector {
    fn info(&self) -> &CollectorInfo {
        &HARDWARE_INFO
    }

    /// Never fails on probe errors: the table keeps its header even when no
    /// probe succeeded, and each failed probe is named in the summary line.
    fn collect(&self, runner: &dyn CommandRunner, ctx: &RunContext<'_>) -> Result<Table> {
        let mut table = Table::new("hardware", HEADERS);
        let mut failed: Vec<String> = Vec::new();

        for probe in PROBES {
            let stdout =
                match run_tool(runner, probe.program, probe.args, ctx.config.probe_timeout) {
                    Ok(out) => out,
                    Err(_) => {
                        failed.push(describe_argv(probe.program, probe.args));
                        continue;
                    }
                };

            let pairs = (probe.parse)(&stdout);
            if pairs.is_empty() && !stdout.trim().is_empty() {
                let err = AuditError::malformed(probe.program, "no recognizable fields", &stdout);
                warn!("{err}");
            }
            for (key, value) in pairs {
                table.push_row(vec![probe.category.into(), key.into(), value.into()])?;
            }
        }

        let succeeded = PROBES.len() - failed.len();
        if succeeded == 0 {
            error!(
                "Hardware inventory is empty: all {} probes failed ({})",
                PROBES.len(),
                failed.join("; ")
            );
        } else if !failed.is_empty() {
            warn!(
                "Hardware probes failed ({}/{}): {}",
                failed.len(),
                PROBES.len(),
                failed.join("; ")
            );
        }
        info!(
            "Hardware inventory collected: {} rows from {succeeded}/{} probes",
            table.len(),
            PROBES.len()
        );
        Ok(table)
    }
}

fn pair(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// First non-empty, non-comment line of a single-value command.
fn single_line(raw: &str) -> Option<&str> {
    raw.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
}

/// `lscpu`: `Key:   value` lines. Section headings have no value and are skipped.
fn parse_lscpu(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            (!key.is_empty() && !value.is_empty()).then(|| pair(key, value))
        })
        .collect()
}

/// `free -h`: header row names the columns of the `Mem:` and `Swap:` rows.
fn parse_free(raw: &str) -> Vec<(String, String)> {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split_whitespace().collect();
    let lookup = |row: &[&str], name: &str| -> Option<String> {
        let idx = columns.iter().position(|c| *c == name)?;
        row.get(idx).map(|v| (*v).to_string())
    };

    let mut out = Vec::new();
    for line in lines {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        let values: Vec<&str> = fields.collect();
        match label {
            "Mem:" => {
                for (column, key) in [("total", "Total"), ("used", "Used"), ("available", "Available")] {
                    if let Some(v) = lookup(&values, column) {
                        out.push((key.to_string(), v));
                    }
                }
            }
            "Swap:" => {
                if let Some(v) = lookup(&values, "total") {
                    out.push(("Swap Total".to_string(), v));
                }
            }
            _ => {}
        }
    }
    out
}

/// `df -hP /`: last line is `device size used avail use% mountpoint`.
fn parse_df_root(raw: &str) -> Vec<(String, String)> {
    let Some(line) = raw.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Vec::new();
    };
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 || fields[0] == "Filesystem" {
        return Vec::new();
    }
    vec![
        pair("Root Device", fields[0]),
        pair("Root Size", fields[1]),
        pair("Root Used", fields[2]),
        pair("Root Available", fields[3]),
        pair("Root Use%", fields[4]),
    ]
}

/// `lsblk -nd -o NAME,SIZE,TYPE`: keep whole disks only.
fn parse_lsblk(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, size, "disk", ..] => Some((format!("Block Device {name}"), (*size).to_string())),
                _ => None,
            }
        })
        .collect()
}

fn parse_dmi(key: &str, raw: &str) -> Vec<(String, String)> {
    match single_line(raw) {
        Some(v) if !DMI_PLACEHOLDERS.contains(&v) => vec![pair(key, v)],
        _ => Vec::new(),
    }
}

fn parse_dmi_manufacturer(raw: &str) -> Vec<(String, String)> {
    parse_dmi("Manufacturer", raw)
}

fn parse_dmi_product(raw: &str) -> Vec<(String, String)> {
    parse_dmi("Product", raw)
}

fn parse_single(key: &str, raw: &str) -> Vec<(String, String)> {
    single_line(raw).map(|v| vec![pair(key, v)]).unwrap_or_default()
}

fn parse_kernel_version(raw: &str) -> Vec<(String, String)> {
    parse_single("Version", raw)
}

fn parse_kernel_arch(raw: &str) -> Vec<(String, String)> {
    parse_single("Architecture", raw)
}

fn parse_hostname(raw: &str) -> Vec<(String, String)> {
    parse_single("Hostname", raw)
}

fn parse_uptime(raw: &str) -> Vec<(String, String)> {
    parse_single("Uptime", raw)
}

fn parse_os_release(raw: &str) -> Vec<(String, String)> {
    OsRelease::parse(raw)
        .pretty_name
        .map(|v| vec![pair("OS", &v)])
        .unwrap_or_default()
}
