//! `setup`: install and enable the collection tools.

use serveraudit_core::{AuditConfig, SetupPaths, SystemRunner, run_setup};

pub fn run(config: &AuditConfig) -> i32 {
    let runner = SystemRunner::new();
    match run_setup(&runner, config, &SetupPaths::default()) {
        Ok(report) => {
            let strategies: Vec<String> = report.strategies.iter().map(ToString::to_string).collect();
            println!("Setup completed. Interface: {}", report.interface);
            if strategies.is_empty() {
                println!("sysstat: no change needed");
            } else {
                println!("sysstat enabled via: {}", strategies.join(", "));
            }
            if report.warnings > 0 {
                println!(
                    "{} step(s) reported warnings; see {}",
                    report.warnings,
                    config.log_file().display()
                );
            }
            println!("sysstat collection will begin within 10 minutes.");
            println!("vnstat will accumulate traffic data over the next hours.");
            0
        }
        Err(e) => {
            log::error!("Setup failed: {e}");
            eprintln!("ERROR: Setup failed: {e}");
            1
        }
    }
}
