//! Collector trait and the four table-producing collectors.
//!
//! Every collector implements [`Collector`], which provides metadata via
//! [`CollectorInfo`] and produces one [`Table`] per invocation. Collectors are
//! independent: none reads another's output.

pub mod hardware;
pub mod interface;
pub mod process;
pub mod system;
pub mod traffic;

use std::time::Duration;

use chrono::{Days, NaiveDate};
use log::warn;

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::runner::{CommandRunner, describe_argv};
use crate::table::Table;

/// File name of the overwritten hardware table. Never removed by retention.
pub const HARDWARE_FILE: &str = "hardware_inventory.csv";

/// How a collector's table is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// One file, overwritten on every run.
    Inventory(&'static str),
    /// One `<prefix>_YYYY-MM-DD.csv` file per report date.
    Daily(&'static str),
}

impl Artifact {
    /// File name for a run whose report date is `date`.
    pub fn file_name(&self, date: NaiveDate) -> String {
        match self {
            Self::Inventory(name) => (*name).to_string(),
            Self::Daily(prefix) => format!("{prefix}_{}.csv", date.format("%Y-%m-%d")),
        }
    }
}

/// Metadata about a collector.
#[derive(Debug, Clone)]
pub struct CollectorInfo {
    /// Subcommand name (e.g. `"traffic"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// External programs this collector shells out to.
    pub tools: &'static [&'static str],
    pub artifact: Artifact,
}

/// Per-run inputs shared by all collectors.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub config: &'a AuditConfig,
    /// Local calendar date the run started on.
    pub today: NaiveDate,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a AuditConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    /// The day being reported on: yesterday, relative to `today`.
    pub fn report_date(&self) -> NaiveDate {
        self.today.checked_sub_days(Days::new(1)).unwrap_or(self.today)
    }
}

/// Trait that every collector implements.
pub trait Collector {
    /// Collector metadata.
    fn info(&self) -> &CollectorInfo;

    /// Run the underlying tools and normalize their output.
    fn collect(&self, runner: &dyn CommandRunner, ctx: &RunContext<'_>) -> Result<Table>;

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}

/// The collectors that can be run individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    Hardware,
    System,
    Processes,
    Traffic,
}

impl CollectorKind {
    /// Every collector, in `full` run order.
    pub const ALL: [CollectorKind; 4] = [
        CollectorKind::Hardware,
        CollectorKind::System,
        CollectorKind::Processes,
        CollectorKind::Traffic,
    ];

    pub fn collector(self) -> Box<dyn Collector> {
        match self {
            Self::Hardware => Box::new(hardware::HardwareCollector),
            Self::System => Box::new(system::SystemMetricsCollector),
            Self::Processes => Box::new(process::ProcessSnapshotCollector),
            Self::Traffic => Box::new(traffic::TrafficCollector),
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::System => write!(f, "system"),
            Self::Processes => write!(f, "processes"),
            Self::Traffic => write!(f, "traffic"),
        }
    }
}

/// Run `program args` and return stdout, logging and mapping any failure.
pub(crate) fn run_tool(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String> {
    runner
        .run_argv(program, args, timeout)
        .map(|out| out.stdout)
        .map_err(|failure| {
            warn!("{}: {failure}", describe_argv(program, args));
            AuditError::from_failure(program, failure)
        })
}
