//! # serveraudit-core
//!
//! **Daily host telemetry from the tools already on the box.**
//!
//! `serveraudit-core` shells out to standard Linux diagnostic utilities
//! (`lscpu`, `dmidecode`, sysstat's `sadf` and `pidstat`, `nethogs`, `vnstat`),
//! normalizes their text and JSON output into typed tables, and writes those
//! tables as CSV. A retention sweep keeps a rolling window of files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use serveraudit_core::{AuditConfig, Orchestrator, RunMode, RunStatus, SystemRunner};
//!
//! let config = AuditConfig::default();
//! let runner = SystemRunner::new();
//! let today = chrono::Local::now().date_naive();
//!
//! let report = Orchestrator::new(&runner, &config).run(RunMode::Full, today);
//! assert_ne!(report.status, RunStatus::Failed);
//! ```
//!
//! ## Architecture
//!
//! External tool → [`CommandRunner`] → collector parser → [`Table`] → CSV
//!
//! Every collector implements the [`Collector`] trait and receives the runner
//! and a [`RunContext`] explicitly, so tests substitute a scripted runner and
//! a temporary directory without touching the host.

pub mod collectors;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod retention;
pub mod runner;
pub mod setup;
pub mod table;

pub use collectors::hardware::HardwareCollector;
pub use collectors::interface::primary_interface;
pub use collectors::process::{
    NethogsSample, PidstatSample, ProcessSample, ProcessSnapshotCollector, join_samples,
    parse_nethogs, parse_pidstat,
};
pub use collectors::system::{SysstatArchive, SystemMetricsCollector, parse_sadf};
pub use collectors::traffic::{JsonGeneration, TrafficCollector, TrafficDayEntry, parse_vnstat};
pub use collectors::{Artifact, Collector, CollectorInfo, CollectorKind, RunContext};
pub use config::{AuditConfig, RetentionPolicy};
pub use error::{AuditError, Result};
pub use orchestrator::{CollectorOutcome, Orchestrator, RunMode, RunReport, RunStatus};
pub use platform::{OsRelease, ensure_privileged, os_release};
pub use retention::{RetentionSweeper, SweepReport};
pub use runner::{CommandFailure, CommandResult, CommandRunner, SystemRunner};
pub use setup::{SetupPaths, SetupReport, SysstatStrategy, run_setup};
pub use table::{Table, Value};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
