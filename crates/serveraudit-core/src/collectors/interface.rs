//! Primary network interface resolution.
//!
//! Order of preference:
//! 1. the configured override,
//! 2. the device used for the default outbound route (`ip route get`),
//! 3. the first non-loopback interface that is up (`ip -o link show up`),
//! 4. `eth0`, with a warning.
//!
//! Resolution never fails; a wrong guess only degrades traffic numbers.

use log::{info, warn};

use crate::config::AuditConfig;
use crate::runner::CommandRunner;

use super::run_tool;

/// Last-resort interface name.
pub const FALLBACK_INTERFACE: &str = "eth0";

/// Public address used only to ask the kernel which route it would pick.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8";

/// Resolve the interface to report traffic for.
pub fn primary_interface(runner: &dyn CommandRunner, config: &AuditConfig) -> String {
    if let Some(iface) = config.interface.as_deref() {
        return iface.to_string();
    }

    let timeout = config.probe_timeout;
    if let Ok(out) = run_tool(runner, "ip", &["route", "get", ROUTE_PROBE_ADDR], timeout) {
        if let Some(iface) = parse_route_dev(&out) {
            info!("Detected primary interface: {iface}");
            return iface;
        }
    }

    if let Ok(out) = run_tool(runner, "ip", &["-o", "link", "show", "up"], timeout) {
        if let Some(iface) = parse_first_link(&out) {
            warn!("Default route detection failed; falling back to {iface}");
            return iface;
        }
    }

    warn!("No interface detected; using {FALLBACK_INTERFACE}");
    FALLBACK_INTERFACE.to_string()
}

/// Token following `dev` in `ip route get` output.
pub fn parse_route_dev(raw: &str) -> Option<String> {
    let mut tokens = raw.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == "dev" {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

/// First non-loopback name in `ip -o link show` output
/// (`2: eth0: <BROADCAST,...> ...`, veth names carry an `@peer` suffix).
pub fn parse_first_link(raw: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let mut parts = line.splitn(3, ':');
        let _index = parts.next()?;
        let name = parts.next()?.trim();
        let name = name.split('@').next().unwrap_or(name);
        (!name.is_empty() && name != "lo").then(|| name.to_string())
    })
}
