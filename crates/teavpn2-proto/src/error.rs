// ============================================
// File: crates/teavpn2-proto/src/error.rs
// ============================================
//! # Protocol Error Types

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Wire protocol error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtoError {
    /// The buffer does not hold enough bytes for the message.
    #[error("Message too short: need {need} bytes, got {got}")]
    TooShort {
        /// Bytes required.
        need: usize,
        /// Bytes available.
        got: usize,
    },

    /// A payload exceeds the protocol maximum.
    #[error("Payload of {len} bytes exceeds the {max}-byte maximum")]
    PayloadTooLarge {
        /// Offending payload length.
        len: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// A fixed-width text field does not fit its wire slot.
    #[error("Field '{field}' of {len} bytes exceeds its {cap}-byte capacity")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Offending length.
        len: usize,
        /// Wire capacity (including the terminating NUL).
        cap: usize,
    },

    /// A message failed structural validation.
    #[error("Malformed message: {reason}")]
    Malformed {
        /// Why parsing failed.
        reason: String,
    },
}

impl ProtoError {
    /// Creates a `TooShort` error.
    #[must_use]
    pub const fn too_short(need: usize, got: usize) -> Self {
        Self::TooShort { need, got }
    }

    /// Creates a `Malformed` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
