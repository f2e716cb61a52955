//! Sequencing of collectors, CSV output and the retention sweep.
//!
//! A run never aborts because one collector failed: every failure is logged,
//! recorded in the [`RunReport`], and the next collector runs. The report's
//! [`RunStatus`] summarizes the worst outcome.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{error, info, warn};

use crate::collectors::{Collector, CollectorKind, RunContext};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::retention::{RetentionSweeper, SweepReport};
use crate::runner::CommandRunner;

/// What a run should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every collector.
    Full,
    Hardware,
    System,
    Processes,
    Traffic,
}

impl RunMode {
    /// Collectors this mode runs, in order.
    pub fn kinds(self) -> Vec<CollectorKind> {
        match self {
            Self::Full => CollectorKind::ALL.to_vec(),
            Self::Hardware => vec![CollectorKind::Hardware],
            Self::System => vec![CollectorKind::System],
            Self::Processes => vec![CollectorKind::Processes],
            Self::Traffic => vec![CollectorKind::Traffic],
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Hardware => write!(f, "hardware"),
            Self::System => write!(f, "system"),
            Self::Processes => write!(f, "processes"),
            Self::Traffic => write!(f, "traffic"),
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every collector and the sweep succeeded.
    Success,
    /// At least one collector succeeded and something else failed.
    Partial,
    /// No collector succeeded.
    Failed,
}

impl RunStatus {
    fn from_counts(succeeded: usize, total: usize) -> Self {
        match succeeded {
            0 => Self::Failed,
            n if n == total => Self::Success,
            _ => Self::Partial,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one collector within a run.
#[derive(Debug, Clone)]
pub struct CollectorOutcome {
    /// Collector name.
    pub name: &'static str,
    /// CSV written, when the collector succeeded.
    pub path: Option<PathBuf>,
    /// Data rows written.
    pub rows: usize,
    /// Failure description, when the collector failed.
    pub error: Option<String>,
    /// Time spent collecting and writing.
    pub elapsed: Duration,
}

impl CollectorOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    /// Date the time-series files are named after.
    pub report_date: NaiveDate,
    pub outcomes: Vec<CollectorOutcome>,
    /// Sweep result, when the sweep completed.
    pub sweep: Option<SweepReport>,
    /// Sweep failure message.
    pub sweep_error: Option<String>,
    pub status: RunStatus,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }
}

/// Runs collectors against one configuration.
pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AuditConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AuditConfig) -> Self {
        Self { runner, config }
    }

    /// Run `mode` as of `today` and report what happened.
    pub fn run(&self, mode: RunMode, today: NaiveDate) -> RunReport {
        let ctx = RunContext::new(self.config, today);
        info!(
            "=== Run started: {mode} (report date {}) ===",
            ctx.report_date()
        );

        let outcomes: Vec<CollectorOutcome> = mode
            .kinds()
            .into_iter()
            .map(|kind| self.run_collector(kind.collector().as_ref(), &ctx))
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let mut status = RunStatus::from_counts(succeeded, outcomes.len());

        // Every mode ends with the retention sweep.
        let (sweep, sweep_error) = match RetentionSweeper::from_config(self.config).sweep(today) {
            Ok(report) => {
                if !report.is_clean() && status == RunStatus::Success {
                    status = RunStatus::Partial;
                }
                (Some(report), None)
            }
            Err(e) => {
                error!("Retention sweep failed: {e}");
                if status == RunStatus::Success {
                    status = RunStatus::Partial;
                }
                (None, Some(e.to_string()))
            }
        };

        info!(
            "=== Run finished: {mode} {status} ({succeeded}/{} collectors) ===",
            outcomes.len()
        );
        RunReport {
            mode,
            report_date: ctx.report_date(),
            outcomes,
            sweep,
            sweep_error,
            status,
        }
    }

    /// Run one collector and write its table, capturing any failure.
    pub fn run_collector(&self, collector: &dyn Collector, ctx: &RunContext<'_>) -> CollectorOutcome {
        let meta = collector.info();
        let name = meta.name;
        let start = Instant::now();
        info!("--- {name}: {} ---", meta.description);

        let result = self.collect_and_write(collector, ctx);
        let elapsed = start.elapsed();
        match result {
            Ok((path, rows)) => {
                info!(
                    "{name}: {rows} rows written to {} in {:.1}s",
                    path.display(),
                    elapsed.as_secs_f64()
                );
                CollectorOutcome {
                    name,
                    path: Some(path),
                    rows,
                    error: None,
                    elapsed,
                }
            }
            Err(e) => {
                warn!("{name} failed: {e} (uses: {})", meta.tools.join(", "));
                CollectorOutcome {
                    name,
                    path: None,
                    rows: 0,
                    error: Some(e.to_string()),
                    elapsed,
                }
            }
        }
    }

    fn collect_and_write(
        &self,
        collector: &dyn Collector,
        ctx: &RunContext<'_>,
    ) -> Result<(PathBuf, usize)> {
        let table = collector.collect(self.runner, ctx)?;
        let file_name = collector.info().artifact.file_name(ctx.report_date());
        let path = self.config.data_dir.join(file_name);
        table.write_csv(&path)?;
        Ok((path, table.len()))
    }
}
