//! Integration tests for serveraudit-core.
//!
//! These drive the public API end to end with a scripted runner:
//! tool output → collector → CSV on disk → retention sweep.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use serveraudit_core::runner::describe_argv;
use serveraudit_core::{
    AuditConfig, CommandFailure, CommandResult, CommandRunner, Orchestrator, RetentionSweeper,
    RunMode, RunStatus, SweepReport,
};

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

/// Replies keyed by the full command line; the last reply for a key repeats.
#[derive(Default)]
struct Script {
    replies: RefCell<HashMap<String, VecDeque<Option<String>>>>,
    calls: RefCell<Vec<String>>,
}

impl Script {
    fn ok(self, key: &str, stdout: &str) -> Self {
        self.push(key, Some(stdout.to_string()))
    }

    fn fail(self, key: &str) -> Self {
        self.push(key, None)
    }

    fn push(self, key: &str, reply: Option<String>) -> Self {
        self.replies
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn count(&self, key: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == key).count()
    }
}

impl CommandRunner for Script {
    fn run_argv(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<CommandResult, CommandFailure> {
        let key = describe_argv(program, args);
        self.calls.borrow_mut().push(key.clone());
        let mut replies = self.replies.borrow_mut();
        let queue = replies.get_mut(&key).ok_or(CommandFailure::NotFound)?;
        let reply = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().cloned().flatten()
        };
        let result = CommandResult {
            code: 0,
            stdout: reply.clone().unwrap_or_default(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        };
        match reply {
            Some(_) => Ok(result),
            None => Err(CommandFailure::NonZeroExit {
                code: 1,
                result: CommandResult { code: 1, ..result },
            }),
        }
    }

    fn run_shell(&self, line: &str, _timeout: Duration) -> Result<CommandResult, CommandFailure> {
        self.calls.borrow_mut().push(line.to_string());
        Err(CommandFailure::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 23).unwrap()
}

fn config_in(dir: &Path) -> AuditConfig {
    AuditConfig {
        data_dir: dir.join("data"),
        log_dir: dir.to_path_buf(),
        sysstat_dir: dir.join("sysstat"),
        interface: Some("eth0".into()),
        ..Default::default()
    }
}

fn hardware_script() -> Script {
    Script::default()
        .ok(
            "lscpu",
            "Architecture:        x86_64\nCPU(s):              4\nModel name:          AMD EPYC 7R13 Processor\n",
        )
        .ok(
            "free -h",
            "               total        used        free      shared  buff/cache   available\n\
             Mem:           7.6Gi       1.1Gi       5.2Gi       2.0Mi       1.5Gi       6.3Gi\n\
             Swap:             0B          0B          0B\n",
        )
        .ok(
            "df -hP /",
            "Filesystem      Size  Used Avail Use% Mounted on\n/dev/root        48G   12G   36G  25% /\n",
        )
        .ok("lsblk -nd -o NAME,SIZE,TYPE", "nvme0n1  50G disk\n")
        .ok("dmidecode -s system-manufacturer", "Amazon EC2\n")
        .ok("dmidecode -s system-product-name", "c6a.xlarge\n")
        .ok("uname -r", "6.8.0-1021-aws\n")
        .ok("uname -m", "x86_64\n")
        .ok("hostname -f", "ip-10-0-0-5.ec2.internal\n")
        .ok("uptime -p", "up 3 days, 4 hours\n")
        .ok(
            "cat /etc/os-release",
            "PRETTY_NAME=\"Ubuntu 24.04.1 LTS\"\nID=ubuntu\nVERSION_ID=\"24.04\"\n",
        )
}

const VNSTAT_QUERY: &str = "vnstat --json d 24 -i eth0";
const VNSTAT_ADD: &str = "vnstat --add -i eth0";
const VNSTAT_JSON: &str = r#"{"vnstatversion":"2.12","jsonversion":"2","interfaces":[{"name":"eth0",
    "traffic":{"day":[
        {"id":4410,"date":{"year":2026,"month":2,"day":21},"rx":1073741824,"tx":536870912},
        {"id":4411,"date":{"year":2026,"month":2,"day":22},"rx":47472640,"tx":24235008}
    ]}}]}"#;

fn read_csv(path: &Path) -> Vec<String> {
    let raw = fs::read_to_string(path).unwrap();
    let body = raw.strip_prefix('\u{feff}').expect("CSV starts with a BOM");
    body.lines().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Collectors end to end
// ---------------------------------------------------------------------------

#[test]
fn hardware_end_to_end_writes_inventory() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let runner = hardware_script();

    let report = Orchestrator::new(&runner, &config).run(RunMode::Hardware, today());
    assert_eq!(report.status, RunStatus::Success);

    let lines = read_csv(&config.data_dir.join("hardware_inventory.csv"));
    assert_eq!(lines[0], "Category,Key,Value");
    for category in ["CPU", "Memory", "Disk", "Hardware", "Kernel", "System"] {
        assert!(
            lines.iter().any(|l| l.starts_with(&format!("{category},"))),
            "no {category} rows in {lines:?}"
        );
    }
    assert!(lines.contains(&"System,OS,Ubuntu 24.04.1 LTS".to_string()));
    assert!(lines.contains(&"System,Uptime,\"up 3 days, 4 hours\"".to_string()));
}

#[test]
fn traffic_registers_interface_once_then_retries_once() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let runner = Script::default()
        .fail(VNSTAT_QUERY)
        .ok(VNSTAT_QUERY, VNSTAT_JSON)
        .ok(VNSTAT_ADD, "");

    let report = Orchestrator::new(&runner, &config).run(RunMode::Traffic, today());
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(runner.count(VNSTAT_ADD), 1);
    assert_eq!(runner.count(VNSTAT_QUERY), 2);

    let lines = read_csv(&config.data_dir.join("network_traffic_2026-02-22.csv"));
    assert_eq!(
        lines,
        [
            "Interface,Date,RX_Bytes,TX_Bytes,RX_GB,TX_GB",
            "eth0,2026-02-21,1073741824,536870912,1,0.5",
            "eth0,2026-02-22,47472640,24235008,0.04,0.02",
        ]
    );
}

#[test]
fn traffic_gives_up_after_one_retry() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let runner = Script::default().fail(VNSTAT_QUERY).fail(VNSTAT_ADD);

    let report = Orchestrator::new(&runner, &config).run(RunMode::Traffic, today());
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(runner.count(VNSTAT_ADD), 1);
    assert_eq!(runner.count(VNSTAT_QUERY), 2);
    assert!(!config.data_dir.join("network_traffic_2026-02-22.csv").exists());
}

#[test]
fn processes_join_both_samplers() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let runner = Script::default()
        .ok(
            "pidstat -u -r -d -h 1 3",
            "Linux 6.8.0 (web01) \t02/23/2026 \t_x86_64_\t(4 CPU)\n\n\
             # Time UID PID %usr %system %guest %wait %CPU CPU minflt/s majflt/s VSZ RSS %MEM kB_rd/s kB_wr/s kB_ccwr/s iodelay Command\n\
             1771840801 33 2210 1.00 0.00 0.00 0.00 1.00 3 0.00 0.00 501000 88000 0.55 0.00 4.00 0.00 0 nginx: worker process\n",
        )
        .ok(
            "nethogs -t -c 5 -v 0 eth0",
            "Refreshing:\n/usr/sbin/nginx/2210/33\t3.5\t12.25\n/usr/bin/rsync/9001/0\t800.0\t2.0\n",
        );

    let report = Orchestrator::new(&runner, &config).run(RunMode::Processes, today());
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.outcomes[0].rows, 2);

    let lines = read_csv(&config.data_dir.join("processes_2026-02-22.csv"));
    assert_eq!(
        lines[0],
        "PID,UID,Command,%CPU,%MEM,RSS_KB,kB_rd/s,kB_wr/s,Net_Sent_KB/s,Net_Recv_KB/s"
    );
    assert_eq!(lines[1], "2210,33,nginx: worker process,1,0.55,88000,0,4,3.5,12.25");
    assert_eq!(lines[2], "9001,0,/usr/bin/rsync,0,0,0,0,0,800,2");
}

#[test]
fn hardware_without_any_tool_writes_header_only() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());

    let report = Orchestrator::new(&Script::default(), &config).run(RunMode::Hardware, today());
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.outcomes[0].rows, 0);
    let lines = read_csv(&config.data_dir.join("hardware_inventory.csv"));
    assert_eq!(lines, vec!["Category,Key,Value".to_string()]);
}

// ---------------------------------------------------------------------------
// Full run and retention
// ---------------------------------------------------------------------------

#[test]
fn full_run_sweeps_old_files_and_keeps_inventory() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    fs::create_dir_all(&config.data_dir).unwrap();
    let stale = config.data_dir.join("processes_2026-02-01.csv");
    let kept = config.data_dir.join("processes_2026-02-20.csv");
    fs::write(&stale, "PID\n").unwrap();
    fs::write(&kept, "PID\n").unwrap();

    let runner = hardware_script().ok(VNSTAT_QUERY, VNSTAT_JSON);
    let report = Orchestrator::new(&runner, &config).run(RunMode::Full, today());

    // No pidstat in the script: processes fails, the rest succeed.
    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.succeeded(), 3);
    let sweep = report.sweep.expect("full runs sweep");
    assert_eq!(sweep.files_removed, vec![stale.clone()]);
    assert!(!stale.exists());
    assert!(kept.exists());
    assert!(config.data_dir.join("hardware_inventory.csv").exists());
    assert!(config.data_dir.join("system_summary_2026-02-22.csv").exists());

    let again = RetentionSweeper::from_config(&config).sweep(today()).unwrap();
    assert_eq!(again, SweepReport::default());
}

#[test]
fn single_collector_modes_also_sweep() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    fs::create_dir_all(&config.data_dir).unwrap();
    let stale = config.data_dir.join("processes_2025-01-01.csv");
    fs::write(&stale, "PID\n").unwrap();

    let report = Orchestrator::new(&Script::default(), &config).run(RunMode::System, today());
    assert_eq!(report.status, RunStatus::Success);
    let sweep = report.sweep.expect("every mode sweeps");
    assert_eq!(sweep.files_removed, vec![stale.clone()]);
    assert!(!stale.exists());
}
