//! `full`, `hardware`, `system`, `processes` and `traffic`.
//!
//! Once the collectors have been attempted the command exits 0, whatever the
//! run status. Failures are reported in the summary and in `audit.log`.

use std::fmt::Write as _;

use chrono::Local;
use serveraudit_core::{AuditConfig, Orchestrator, RunMode, RunReport, RunStatus, SystemRunner};

pub fn run(mode: RunMode, config: &AuditConfig) {
    let runner = SystemRunner::new();
    let today = Local::now().date_naive();
    let report = Orchestrator::new(&runner, config).run(mode, today);

    print!("{}", render_summary(&report, config));
}

fn render_summary(report: &RunReport, config: &AuditConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Audit {} ({}/{} collectors): {}",
        report.mode,
        report.succeeded(),
        report.outcomes.len(),
        report.status
    );
    for o in &report.outcomes {
        let _ = match (&o.path, &o.error) {
            (Some(path), _) => writeln!(
                out,
                "  {:<10} ok     {:>6} rows  {:>5.1}s  {}",
                o.name,
                o.rows,
                o.elapsed.as_secs_f64(),
                path.display()
            ),
            (None, Some(err)) => writeln!(out, "  {:<10} FAILED {err}", o.name),
            (None, None) => writeln!(out, "  {:<10} skipped", o.name),
        };
    }
    if let Some(sweep) = &report.sweep {
        let _ = writeln!(
            out,
            "  cleanup    {} file(s) removed, {} log entries pruned",
            sweep.files_removed.len(),
            sweep.log_entries_pruned
        );
    }
    if let Some(err) = &report.sweep_error {
        let _ = writeln!(out, "  cleanup    FAILED {err}");
    }
    let _ = writeln!(
        out,
        "Files in {} (date: {})",
        config.data_dir.display(),
        report.report_date
    );
    if report.status != RunStatus::Success {
        let _ = writeln!(out, "Details in {}", config.log_file().display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serveraudit_core::{CollectorOutcome, SweepReport};
    use std::path::PathBuf;
    use std::time::Duration;

    fn report(status: RunStatus, outcomes: Vec<CollectorOutcome>) -> RunReport {
        RunReport {
            mode: RunMode::Full,
            report_date: NaiveDate::from_ymd_opt(2026, 2, 22).unwrap(),
            outcomes,
            sweep: Some(SweepReport::default()),
            sweep_error: None,
            status,
        }
    }

    #[test]
    fn failed_run_points_at_the_log() {
        let config = AuditConfig::default();
        let outcome = CollectorOutcome {
            name: "traffic",
            path: None,
            rows: 0,
            error: Some("vnstat: executable not found".into()),
            elapsed: Duration::ZERO,
        };
        let text = render_summary(&report(RunStatus::Failed, vec![outcome]), &config);
        assert!(text.starts_with("Audit full (0/1 collectors): failed\n"));
        assert!(text.contains("traffic    FAILED vnstat: executable not found"));
        assert!(text.contains("(date: 2026-02-22)"));
        assert!(text.ends_with("Details in /var/log/server-audit/audit.log\n"));
    }

    #[test]
    fn successful_run_lists_files() {
        let config = AuditConfig::default();
        let outcome = CollectorOutcome {
            name: "hardware",
            path: Some(PathBuf::from("/var/log/server-audit/data/hardware_inventory.csv")),
            rows: 42,
            error: None,
            elapsed: Duration::from_millis(1500),
        };
        let text = render_summary(&report(RunStatus::Success, vec![outcome]), &config);
        assert!(text.contains("hardware   ok         42 rows    1.5s"));
        assert!(text.contains("0 file(s) removed"));
        assert!(!text.contains("Details in"));
    }
}
