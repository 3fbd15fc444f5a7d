// ============================================
// File: crates/teavpn2-transport/src/lib.rs
// ============================================
//! # TeaVPN2 Transport - I/O Layer
//!
//! ## Creation Reason
//! Everything that touches the operating system on behalf of the server
//! core: the TUN device, the external-command interface provisioner, and
//! TCP listener setup.
//!
//! ## Main Functionality
//! - [`traits`]: `TunDevice` abstraction + `IfaceInfo` parameters
//! - [`tun`]: Linux and mock TUN implementations
//! - [`iface`]: interface provisioning via the system `ip` utility
//! - [`tcp`]: listen-socket bootstrap
//! - [`error`]: transport error types
//!
//! ## Data Flow
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 kernel / internet             │
//! │                      ▲                        │
//! │            ┌─────────┴─────────┐              │
//! │            │    TUN device     │  (this crate)│
//! │            │  (IP datagrams)   │              │
//! │            └─────────┬─────────┘              │
//! │                      │                        │
//! │            ┌─────────┴─────────┐              │
//! │            │   server core     │              │
//! │            └─────────┬─────────┘              │
//! │                      │                        │
//! │            ┌─────────┴─────────┐              │
//! │            │   TCP listener    │  (this crate)│
//! │            │ (framed packets)  │              │
//! │            └─────────┬─────────┘              │
//! │                      ▼                        │
//! │                   clients                     │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - TUN creation and provisioning require CAP_NET_ADMIN; every test in
//!   this workspace runs against [`tun::MockTun`] instead
//!
//! ## Last Modified
//! v0.1.0 - Initial transport implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod iface;
pub mod tcp;
pub mod traits;
pub mod tun;

// Re-export primary types
pub use error::{Result, TransportError};
pub use traits::{IfaceInfo, TunDevice};
pub use tun::MockTun;

#[cfg(target_os = "linux")]
pub use tun::LinuxTun;
