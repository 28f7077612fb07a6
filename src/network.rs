//! Network service DNS rebinding.
//!
//! Finds the interface holding the default route, maps it to its
//! human-facing network service name, and points that service's DNS at the
//! local resolver. This is the one step that is not idempotent by
//! inspection: a differing DNS list is overwritten, with the previous value
//! printed (not persisted) for manual rollback.

use crate::cmd;
use crate::error::{BootstrapError, Result};
use crate::step::{Step, StepStatus};

/// Where all system DNS queries get pointed.
const LOCAL_RESOLVER: &str = "127.0.0.1";

/// Extracts the device name from `route -n get default` output.
fn parse_default_interface(route_output: &str) -> Option<String> {
    route_output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("interface:"))
        .map(|dev| dev.trim().to_string())
}

/// Maps a device (e.g. `en0`) to its service name (e.g. `Wi-Fi`) using
/// `networksetup -listallhardwareports` output.
///
/// The listing is blocks of `Hardware Port: <name>` / `Device: <dev>` pairs.
fn parse_service_for_device(listing: &str, device: &str) -> Option<String> {
    let mut current_port: Option<&str> = None;
    for line in listing.lines() {
        if let Some(port) = line.strip_prefix("Hardware Port:") {
            current_port = Some(port.trim());
        } else if let Some(dev) = line.strip_prefix("Device:") {
            if dev.trim() == device {
                return current_port.map(ToString::to_string);
            }
        }
    }
    None
}

/// Parses `networksetup -getdnsservers` output into the configured list.
///
/// The tool prints a sentence (`There aren't any DNS Servers set ...`) when
/// the service uses DHCP-supplied servers; that reads as an empty list.
fn parse_dns_servers(output: &str) -> Vec<String> {
    if output.contains("There aren't any") {
        return Vec::new();
    }
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Returns the network service currently holding the default route.
///
/// # Errors
///
/// Fails when there is no default route or the device has no service.
pub fn active_service() -> Result<String> {
    let route = cmd::run("route", &["-n", "get", "default"])?;
    let device = parse_default_interface(&route).ok_or_else(|| {
        BootstrapError::UnparseableOutput {
            command: "route -n get default".into(),
            detail: "no `interface:` line".into(),
        }
    })?;

    let listing = cmd::run("networksetup", &["-listallhardwareports"])?;
    parse_service_for_device(&listing, &device).ok_or_else(|| BootstrapError::UnparseableOutput {
        command: "networksetup -listallhardwareports".into(),
        detail: format!("no service maps to device `{device}`"),
    })
}

/// Points all system DNS at the local resolver.
pub struct NetworkDnsStep;

impl Step for NetworkDnsStep {
    fn name(&self) -> &str {
        "network-dns"
    }

    fn check(&self) -> Result<StepStatus> {
        let service = active_service()?;
        let current = parse_dns_servers(&cmd::run("networksetup", &["-getdnsservers", &service])?);
        if current == [LOCAL_RESOLVER] {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!(
                "set DNS of `{service}` to {LOCAL_RESOLVER} (currently {current:?})"
            )))
        }
    }

    fn apply(&self) -> Result<()> {
        let service = active_service()?;
        let previous =
            parse_dns_servers(&cmd::run("networksetup", &["-getdnsservers", &service])?);

        // No backup is persisted. Print the old list so the user can roll
        // back by hand.
        println!(
            "Rebinding DNS of `{service}` to {LOCAL_RESOLVER}; previous servers: {}",
            if previous.is_empty() {
                "(DHCP-supplied)".to_string()
            } else {
                previous.join(", ")
            }
        );

        cmd::run_elevated("networksetup", &["-setdnsservers", &service, LOCAL_RESOLVER])?;
        tracing::info!(service, "Network DNS rebound to local resolver");
        Ok(())
    }
}
