pub mod collect;
pub mod setup;

use serveraudit_core::AuditConfig;

use crate::GlobalArgs;

/// Defaults overlaid with command-line flags.
pub fn build_config(args: &GlobalArgs) -> AuditConfig {
    let mut config = AuditConfig::default();
    if let Some(dir) = &args.log_dir {
        config.log_dir = dir.clone();
        config.data_dir = dir.join("data");
    }
    if let Some(dir) = &args.output_dir {
        config.data_dir = dir.clone();
    }
    if let Some(iface) = &args.interface {
        config.interface = Some(iface.clone());
    }
    if let Some(days) = args.data_retention_days {
        config.retention.data_days = days;
    }
    if let Some(days) = args.log_retention_days {
        config.retention.log_days = days;
    }
    config
}
