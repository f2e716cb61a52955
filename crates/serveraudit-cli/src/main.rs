//! CLI for server-audit: daily hardware, sysstat, process and traffic reports.

mod commands;
mod logging;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serveraudit_core::RunMode;
use serveraudit_core::platform::{self, OS_RELEASE_PATH};

#[derive(Parser)]
#[command(name = "server-report")]
#[command(about = "Ubuntu server audit: hardware, sysstat history, processes and traffic as CSV")]
#[command(version = serveraudit_core::VERSION)]
#[command(after_help = "Every collection command ends with the retention cleanup. \
Once collection has been attempted the exit code is 0; failures are listed in the \
summary and in audit.log.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Subcommand to run (default: full)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Debug-level logging, echoed to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory for CSV output (default: /var/log/server-audit/data)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Directory for audit.log (default: /var/log/server-audit)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Report traffic for this interface instead of detecting it
    #[arg(long, global = true)]
    interface: Option<String>,

    /// Days of dated CSV files to keep
    #[arg(long, global = true)]
    data_retention_days: Option<u32>,

    /// Days of log entries to keep
    #[arg(long, global = true)]
    log_retention_days: Option<u32>,

    /// Skip the root check (for testing against fixture tools)
    #[arg(long, global = true)]
    allow_unprivileged: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Full daily audit: hardware, system, processes and traffic
    Full,
    /// Hardware inventory only
    Hardware,
    /// System metrics summary (sysstat, previous 24h) only
    System,
    /// Per-process snapshot (pidstat + nethogs) only
    Processes,
    /// Daily traffic totals (vnstat) only
    Traffic,
    /// First-time install and configuration of dependencies
    Setup,
    /// Show version
    Version,
}

impl Commands {
    fn run_mode(self) -> Option<RunMode> {
        match self {
            Self::Full => Some(RunMode::Full),
            Self::Hardware => Some(RunMode::Hardware),
            Self::System => Some(RunMode::System),
            Self::Processes => Some(RunMode::Processes),
            Self::Traffic => Some(RunMode::Traffic),
            Self::Setup | Self::Version => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Full);

    if command == Commands::Version {
        println!("server-report v{}", serveraudit_core::VERSION);
        return;
    }

    let config = commands::build_config(&cli.global);
    if let Err(e) = logging::init(&config.log_file(), cli.global.verbose) {
        eprintln!(
            "Warning: cannot log to {} ({e}); logging to stderr",
            config.log_file().display()
        );
        logging::init_stderr(cli.global.verbose);
    }
    log::info!(
        "=== Server Audit Started (v{}) === command={command:?}",
        serveraudit_core::VERSION
    );

    if !cli.global.allow_unprivileged {
        if let Err(e) = serveraudit_core::ensure_privileged() {
            log::error!("{e}");
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
    platform::os_release(Path::new(OS_RELEASE_PATH));

    match command.run_mode() {
        Some(mode) => commands::collect::run(mode, &config),
        None => std::process::exit(commands::setup::run(&config)),
    }
}
