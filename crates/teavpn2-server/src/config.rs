// ============================================
// File: crates/teavpn2-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Read-only runtime configuration for the server, loaded from a TOML
//! file and overridable from the command line.
//!
//! ## Main Functionality
//! - `ServerConfig`: top-level configuration structure
//! - TOML loading with per-field defaults
//! - Validation before startup
//!
//! ## Configuration Sections
//! - `[sys]`: data directory, verbosity, worker threads
//! - `[sock]`: socket type, bind address/port, connection limits, TLS
//!   material
//! - `[iface]`: virtual interface name, MTU, addressing
//!
//! ## Example Configuration
//! ```toml
//! [sys]
//! data_dir = "/var/lib/teavpn2"
//! verbose = 1
//! thread = 1
//!
//! [sock]
//! type = "tcp"
//! bind_addr = "0.0.0.0"
//! bind_port = 55555
//! max_conn = 10
//! backlog = 5
//!
//! [iface]
//! dev = "teavpn2"
//! mtu = 1500
//! ipv4 = "10.7.7.1"
//! ipv4_netmask = "255.255.255.0"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Configuration is immutable once the server starts; there is no
//!   hot-reload
//! - `max_conn` sizes the client array and the free stack at startup
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use teavpn2_transport::IfaceInfo;

use crate::error::{Result, ServerError};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/teavpn2/server.toml";

// ============================================
// ServerConfig
// ============================================

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// System-level settings.
    #[serde(default)]
    pub sys: SysConfig,

    /// Listen socket settings.
    #[serde(default)]
    pub sock: SockConfig,

    /// Virtual interface settings.
    #[serde(default)]
    pub iface: IfaceConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigLoad` if the file cannot be read or parsed, or any
    /// validation error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string (used by tests).
    ///
    /// # Errors
    /// Returns `ConfigLoad` on a parse failure or any validation error.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.sock.validate()?;
        self.iface.validate()?;
        Ok(())
    }

    /// Returns the socket address to bind.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.sock.bind_addr, self.sock.bind_port)
    }

    /// Returns the interface parameters for TUN creation and provisioning.
    #[must_use]
    pub fn iface_info(&self) -> IfaceInfo {
        let mut info = IfaceInfo::new(&self.iface.dev)
            .with_ipv4(self.iface.ipv4)
            .with_netmask(self.iface.ipv4_netmask)
            .with_mtu(self.iface.mtu);
        if let Some(public_ip) = self.iface.ipv4_pub {
            info = info.with_public_ip(public_ip);
        }
        if let Some(gateway) = self.iface.ipv4_dgateway {
            info = info.with_gateway(gateway);
        }
        info
    }

    /// Returns the per-user credential directory.
    #[must_use]
    pub fn users_dir(&self) -> PathBuf {
        self.sys.data_dir.join("users")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sys: SysConfig::default(),
            sock: SockConfig::default(),
            iface: IfaceConfig::default(),
        }
    }
}

// ============================================
// SysConfig
// ============================================

/// System-level configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysConfig {
    /// Directory holding server data (credential files live in `users/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log verbosity (0 = warn, 1 = info, 2 = debug, 3+ = trace).
    #[serde(default = "default_verbose")]
    pub verbose: u8,

    /// Requested reactor count. Only 1 is implemented; larger values are
    /// accepted and warned about.
    #[serde(default = "default_thread")]
    pub thread: u16,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/teavpn2")
}

fn default_verbose() -> u8 {
    1
}

fn default_thread() -> u16 {
    1
}

impl Default for SysConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verbose: default_verbose(),
            thread: default_thread(),
        }
    }
}

// ============================================
// SockConfig
// ============================================

/// Transport socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SockType {
    /// Framed TCP stream (the implemented transport).
    Tcp,
    /// Datagram transport; configuration-accepted, not yet implemented.
    Udp,
}

/// Listen socket configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SockConfig {
    /// Transport type.
    #[serde(rename = "type", default = "default_sock_type")]
    pub sock_type: SockType,

    /// Address to bind.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port to bind.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Client slot count; bounds concurrent connections.
    #[serde(default = "default_max_conn")]
    pub max_conn: u16,

    /// Listen backlog.
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Whether the client requested an encrypted data plane. Carried in
    /// the protocol but the TCP data plane is cleartext in this build.
    #[serde(default = "default_use_encrypt")]
    pub use_encrypt: bool,

    /// TLS certificate path (reserved for the encrypted transport).
    #[serde(default)]
    pub ssl_cert: Option<PathBuf>,

    /// TLS private key path (reserved for the encrypted transport).
    #[serde(default)]
    pub ssl_priv_key: Option<PathBuf>,
}

fn default_sock_type() -> SockType {
    SockType::Tcp
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_bind_port() -> u16 {
    55555
}

fn default_max_conn() -> u16 {
    10
}

fn default_backlog() -> u32 {
    5
}

fn default_use_encrypt() -> bool {
    true
}

impl SockConfig {
    fn validate(&self) -> Result<()> {
        if self.bind_port == 0 {
            return Err(ServerError::config_invalid(
                "sock.bind_port",
                "port cannot be 0",
            ));
        }
        if self.max_conn == 0 {
            return Err(ServerError::config_invalid(
                "sock.max_conn",
                "must be at least 1",
            ));
        }
        if self.backlog == 0 {
            return Err(ServerError::config_invalid(
                "sock.backlog",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for SockConfig {
    fn default() -> Self {
        Self {
            sock_type: default_sock_type(),
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            max_conn: default_max_conn(),
            backlog: default_backlog(),
            use_encrypt: default_use_encrypt(),
            ssl_cert: None,
            ssl_priv_key: None,
        }
    }
}

// ============================================
// IfaceConfig
// ============================================

/// Virtual interface configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfaceConfig {
    /// Interface name (15 bytes max).
    #[serde(default = "default_dev")]
    pub dev: String,

    /// MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Address assigned to the server side of the tunnel.
    #[serde(default = "default_ipv4")]
    pub ipv4: Ipv4Addr,

    /// Network mask for the tunnel subnet.
    #[serde(default = "default_netmask")]
    pub ipv4_netmask: Ipv4Addr,

    /// Server's public IP; enables split-default routing when set.
    #[serde(default)]
    pub ipv4_pub: Option<Ipv4Addr>,

    /// Tunnel-side default gateway for split-default routing.
    #[serde(default)]
    pub ipv4_dgateway: Option<Ipv4Addr>,
}

fn default_dev() -> String {
    "teavpn2".to_string()
}

fn default_mtu() -> u16 {
    1500
}

fn default_ipv4() -> Ipv4Addr {
    Ipv4Addr::new(10, 7, 7, 1)
}

fn default_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}

impl IfaceConfig {
    fn validate(&self) -> Result<()> {
        if self.dev.is_empty() {
            return Err(ServerError::config_invalid("iface.dev", "cannot be empty"));
        }
        if self.dev.len() > 15 {
            return Err(ServerError::config_invalid(
                "iface.dev",
                "cannot exceed 15 characters",
            ));
        }
        if self.mtu < 576 {
            return Err(ServerError::config_invalid(
                "iface.mtu",
                "must be at least 576",
            ));
        }
        Ok(())
    }
}

impl Default for IfaceConfig {
    fn default() -> Self {
        Self {
            dev: default_dev(),
            mtu: default_mtu(),
            ipv4: default_ipv4(),
            ipv4_netmask: default_netmask(),
            ipv4_pub: None,
            ipv4_dgateway: None,
        }
    }
}

// ============================================
// Tests
// ============================================
