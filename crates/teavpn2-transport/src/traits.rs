// ============================================
// File: crates/teavpn2-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! Defines the TUN device abstraction so the server core can run against a
//! real kernel interface in production and an in-memory mock in tests.
//!
//! ## Main Functionality
//! - `TunDevice`: async read/write of whole IP datagrams + lifecycle
//! - `IfaceInfo`: interface parameters shared by devices and provisioning
//!
//! ## Design Philosophy
//! - The kernel delivers and accepts whole IP datagrams on a TUN handle;
//!   the trait mirrors that (no partial-packet semantics)
//! - `up()`/`down()` own all side effects of interface provisioning, so a
//!   mock can make them no-ops
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::{Result, TransportError};

// ============================================
// IfaceInfo
// ============================================

/// Parameters describing a virtual network interface.
///
/// Consumed both by TUN device creation and by the external-command
/// provisioner that assigns addresses and routes.
///
/// # Example
/// ```
/// use std::net::Ipv4Addr;
/// use teavpn2_transport::traits::IfaceInfo;
///
/// let info = IfaceInfo::new("teavpn2")
///     .with_ipv4(Ipv4Addr::new(10, 7, 7, 1))
///     .with_netmask(Ipv4Addr::new(255, 255, 255, 0))
///     .with_mtu(1500);
/// assert!(info.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceInfo {
    /// Interface name (15 bytes max, kernel limit).
    pub dev: String,
    /// Address assigned to the interface.
    pub ipv4: Ipv4Addr,
    /// Network mask.
    pub netmask: Ipv4Addr,
    /// MTU.
    pub mtu: u16,
    /// Server's public IP; when set, the provisioner pins a host route to
    /// it via the current default gateway before any tunnel routes go in.
    pub ipv4_pub: Option<Ipv4Addr>,
    /// Tunnel-side default gateway; when set (together with `ipv4_pub`),
    /// split-default routes `0.0.0.0/1` and `128.0.0.0/1` are installed
    /// through it.
    pub gateway: Option<Ipv4Addr>,
}

impl IfaceInfo {
    /// Creates interface parameters with library defaults.
    #[must_use]
    pub fn new(dev: impl Into<String>) -> Self {
        Self {
            dev: dev.into(),
            ipv4: Ipv4Addr::new(10, 7, 7, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            mtu: 1500,
            ipv4_pub: None,
            gateway: None,
        }
    }

    /// Sets the interface address.
    #[must_use]
    pub const fn with_ipv4(mut self, ipv4: Ipv4Addr) -> Self {
        self.ipv4 = ipv4;
        self
    }

    /// Sets the network mask.
    #[must_use]
    pub const fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = netmask;
        self
    }

    /// Sets the MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the public IP used for split-default routing.
    #[must_use]
    pub const fn with_public_ip(mut self, ipv4_pub: Ipv4Addr) -> Self {
        self.ipv4_pub = Some(ipv4_pub);
        self
    }

    /// Sets the tunnel default gateway.
    #[must_use]
    pub const fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Returns the netmask as a CIDR prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.netmask).count_ones() as u8
    }

    /// Returns the broadcast address (network | !netmask).
    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        let ip = u32::from(self.ipv4);
        let mask = u32::from(self.netmask);
        Ipv4Addr::from((ip & mask) | !mask)
    }

    /// Validates the parameters.
    ///
    /// # Errors
    /// Returns `InvalidIfaceConfig` on an empty or oversize device name,
    /// an out-of-range MTU, or a non-contiguous netmask.
    pub fn validate(&self) -> Result<()> {
        if self.dev.is_empty() {
            return Err(TransportError::invalid_iface("dev", "cannot be empty"));
        }
        if self.dev.len() > 15 {
            return Err(TransportError::invalid_iface(
                "dev",
                "cannot exceed 15 characters",
            ));
        }
        if self.mtu < 576 {
            return Err(TransportError::invalid_iface(
                "mtu",
                "must be at least 576",
            ));
        }

        // A valid netmask is a run of ones followed by a run of zeros.
        let mask = u32::from(self.netmask);
        if mask.count_ones() + mask.trailing_zeros() != 32 {
            return Err(TransportError::invalid_iface(
                "netmask",
                "must be contiguous",
            ));
        }

        Ok(())
    }
}

// ============================================
// TunDevice Trait
// ============================================

/// Abstract interface for TUN device operations.
///
/// # Data Format
/// Reads and writes move whole IP datagrams; there are no Ethernet
/// headers and no packet-information prefix.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the reactor shares the device
/// between its TUN-read branch and client-sourced writes.
#[async_trait]
pub trait TunDevice: Send + Sync {
    /// Reads one IP datagram into `buf`, returning its length.
    ///
    /// # Errors
    /// Any error is considered fatal to the data plane; the reactor stops
    /// on it.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Writes one IP datagram, returning the number of bytes written.
    ///
    /// # Errors
    /// Write failures are best-effort at the call site: logged, never
    /// fatal.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns the device name as the kernel knows it.
    fn name(&self) -> &str;

    /// Returns the configured MTU.
    fn mtu(&self) -> u16;

    /// Returns the interface parameters this device was built from.
    fn iface(&self) -> &IfaceInfo;

    /// Brings the interface up (addresses, routes, link state).
    ///
    /// # Errors
    /// Returns an error if provisioning fails; startup aborts on it.
    async fn up(&self) -> Result<()>;

    /// Brings the interface down, removing what `up()` installed.
    ///
    /// # Errors
    /// Returns an error if deprovisioning fails; teardown logs and
    /// continues.
    async fn down(&self) -> Result<()>;

    /// Returns `true` while the interface is up.
    fn is_up(&self) -> bool;
}

// ============================================
// Tests
// ============================================
