// ============================================
// File: crates/teavpn2-transport/src/iface.rs
// ============================================
//! # Interface Provisioner
//!
//! ## Creation Reason
//! Assigns addresses and routes to the TUN interface by driving the
//! system `ip` utility. Kept behind two plain calls (`bring_up` /
//! `bring_down`) so the core never sees the shell-out mechanics and tests
//! can stub the whole thing via the mock TUN device.
//!
//! ## Main Functionality
//! - `find_ip_cmd`: locate a usable `ip` executable
//! - `bring_up` / `bring_down`: link state, address, broadcast, routes
//!
//! ## Command Sequence (bring_up)
//! ```text
//! ip link set dev <dev> up mtu <mtu>
//! ip addr add <ipv4>/<cidr> broadcast <bcast> dev <dev>
//! # only with a public IP configured:
//! ip route add <pub>/32 via <host default gateway>
//! # only with a tunnel gateway configured as well:
//! ip route add 0.0.0.0/1 via <gw>
//! ip route add 128.0.0.0/1 via <gw>
//! ```
//!
//! The split `0.0.0.0/1` + `128.0.0.0/1` pair outranks the host's
//! `0.0.0.0/0` default by prefix length without deleting it; the host
//! route keeps the VPN's own upstream traffic off the tunnel.
//!
//! ## ⚠️ Important Note for Next Developer
//! - `bring_down` mirrors `bring_up` with `del` and suppresses failures;
//!   teardown must not abort halfway because one route is already gone
//! - All of this needs CAP_NET_ADMIN
//!
//! ## Last Modified
//! v0.1.0 - Initial provisioner implementation

use std::process::Command;

use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::IfaceInfo;

// ============================================
// Constants
// ============================================

/// Candidate locations for the `ip` executable, probed in order.
const IP_BIN_CANDIDATES: &[&str] = &[
    "/bin/ip",
    "/sbin/ip",
    "/usr/bin/ip",
    "/usr/sbin/ip",
    "/usr/local/bin/ip",
    "/usr/local/sbin/ip",
    "/data/data/com.termux/files/usr/bin/ip",
];

// ============================================
// ip Discovery
// ============================================

/// Locates a usable `ip` executable.
///
/// # Errors
/// Returns `IpCommandNotFound` if no candidate exists and is executable.
pub fn find_ip_cmd() -> Result<&'static str> {
    for candidate in IP_BIN_CANDIDATES {
        if is_executable(candidate) {
            debug!("Located ip executable: {}", candidate);
            return Ok(candidate);
        }
    }
    error!("No ip executable found; tried {:?}", IP_BIN_CANDIDATES);
    Err(TransportError::IpCommandNotFound)
}

#[cfg(unix)]
fn is_executable(path: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

// ============================================
// Public Entry Points
// ============================================

/// Brings the interface up: link state, MTU, address, routes.
///
/// # Errors
/// Returns the first command failure; nothing installed so far is rolled
/// back (the caller tears down via `bring_down`).
pub fn bring_up(info: &IfaceInfo) -> Result<()> {
    toggle(info, true)
}

/// Brings the interface down, removing what `bring_up` installed.
///
/// Individual command failures are logged and swallowed so teardown always
/// runs to completion.
///
/// # Errors
/// Returns an error only if the `ip` executable cannot be located at all.
pub fn bring_down(info: &IfaceInfo) -> Result<()> {
    toggle(info, false)
}

// ============================================
// Implementation
// ============================================

fn toggle(info: &IfaceInfo, up: bool) -> Result<()> {
    let ip = find_ip_cmd()?;
    let suppress = !up;

    let addr_cidr = format!("{}/{}", info.ipv4, info.prefix_len());
    let bcast = info.broadcast().to_string();
    let mtu = info.mtu.to_string();

    info!(
        dev = %info.dev,
        addr = %addr_cidr,
        up,
        "Provisioning virtual network interface"
    );

    run_ip(
        ip,
        &[
            "link",
            "set",
            "dev",
            &info.dev,
            if up { "up" } else { "down" },
            "mtu",
            &mtu,
        ],
        suppress,
    )?;

    run_ip(
        ip,
        &[
            "addr",
            if up { "add" } else { "del" },
            &addr_cidr,
            "broadcast",
            &bcast,
            "dev",
            &info.dev,
        ],
        suppress,
    )?;

    if let Some(public_ip) = info.ipv4_pub {
        let host_gw = default_gateway(ip)?;
        let pub_host = format!("{public_ip}/32");

        run_ip(
            ip,
            &[
                "route",
                if up { "add" } else { "del" },
                &pub_host,
                "via",
                &host_gw,
            ],
            suppress,
        )?;

        if let Some(gw) = info.gateway {
            let gw = gw.to_string();
            for half in ["0.0.0.0/1", "128.0.0.0/1"] {
                run_ip(
                    ip,
                    &["route", if up { "add" } else { "del" }, half, "via", &gw],
                    suppress,
                )?;
            }
        }
    }

    Ok(())
}

/// Runs one `ip` invocation. With `suppress`, failures are demoted to
/// warnings so teardown keeps going.
fn run_ip(ip: &str, args: &[&str], suppress: bool) -> Result<()> {
    let rendered = format!("{} {}", ip, args.join(" "));
    debug!("Executing: {}", rendered);

    let output = Command::new(ip)
        .args(args)
        .output()
        .map_err(|e| TransportError::command_failed(&rendered, e.to_string()))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    // Re-running bring_up after a dirty shutdown hits this; the address is
    // already where we want it.
    if stderr.contains("File exists") {
        debug!("{}: already configured, continuing", rendered);
        return Ok(());
    }

    if suppress {
        warn!("{} failed: {}", rendered, stderr.trim());
        return Ok(());
    }

    Err(TransportError::command_failed(
        rendered,
        format!("{}: {}", output.status, stderr.trim()),
    ))
}

/// Reads the host's current default gateway from `ip route show`.
fn default_gateway(ip: &str) -> Result<String> {
    let rendered = format!("{ip} route show");
    let output = Command::new(ip)
        .args(["route", "show"])
        .output()
        .map_err(|e| TransportError::command_failed(&rendered, e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_default_gateway(&stdout).ok_or(TransportError::NoDefaultGateway)
}

/// Extracts the gateway address from `default via <gw> ...` output.
fn parse_default_gateway(route_show: &str) -> Option<String> {
    for line in route_show.lines() {
        let mut words = line.split_whitespace();
        if words.next() == Some("default") && words.next() == Some("via") {
            return words.next().map(str::to_owned);
        }
    }
    None
}

// ============================================
// Tests
// ============================================
