// ============================================
// File: crates/teavpn2-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for the I/O layer: TUN device management, interface
//! provisioning through external commands, and listener setup.
//!
//! ## Error Categories
//! 1. **TUN errors**: device creation, read/write failures
//! 2. **Provisioning errors**: `ip` command discovery and execution
//! 3. **Socket errors**: bind/listen failures
//! 4. **System errors**: permission problems
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // TUN Device Errors
    // ========================================
    /// Failed to create a TUN device.
    #[error("Failed to create TUN device '{name}': {reason}")]
    TunCreateFailed {
        /// Requested device name.
        name: String,
        /// Why creation failed.
        reason: String,
    },

    /// TUN device read failed.
    #[error("TUN read failed: {reason}")]
    TunReadFailed {
        /// Why the read failed.
        reason: String,
    },

    /// TUN device write failed.
    #[error("TUN write failed: {reason}")]
    TunWriteFailed {
        /// Why the write failed.
        reason: String,
    },

    // ========================================
    // Provisioning Errors
    // ========================================
    /// No usable `ip` executable on this system.
    #[error("Cannot find an executable 'ip' binary in any known location")]
    IpCommandNotFound,

    /// An external provisioning command failed.
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status or stderr excerpt.
        reason: String,
    },

    /// The host default gateway could not be determined.
    #[error("Cannot find a default gateway in `ip route show` output")]
    NoDefaultGateway,

    /// An interface parameter failed validation.
    #[error("Invalid interface config: {field} - {reason}")]
    InvalidIfaceConfig {
        /// Offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },

    // ========================================
    // Socket Errors
    // ========================================
    /// Failed to bind the listen socket.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Why binding failed.
        reason: String,
    },

    // ========================================
    // System Errors
    // ========================================
    /// The operation needs privileges this process does not have.
    #[error("Permission denied: {operation} (need root or CAP_NET_ADMIN)")]
    PermissionDenied {
        /// What we were trying to do.
        operation: String,
    },

    /// Plain I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Creates a `TunCreateFailed` error.
    pub fn tun_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TunCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `CommandFailed` error.
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidIfaceConfig` error.
    pub fn invalid_iface(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidIfaceConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error is a privilege problem the operator can
    /// fix by re-running with CAP_NET_ADMIN.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::tun_create_failed("tun9", "TUNSETIFF failed");
        assert!(err.to_string().contains("tun9"));

        let err = TransportError::PermissionDenied {
            operation: "open /dev/net/tun".into(),
        };
        assert!(err.is_permission());
        assert!(err.to_string().contains("CAP_NET_ADMIN"));
    }
}
