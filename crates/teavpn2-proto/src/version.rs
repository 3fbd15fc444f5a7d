// ============================================
// File: crates/teavpn2-proto/src/version.rs
// ============================================
//! # Protocol Versioning
//!
//! ## Creation Reason
//! Carries the three version triples the server advertises in its banner,
//! so clients can decide whether they speak a compatible dialect.
//!
//! ## Main Functionality
//! - `VersionTriple`: `{major, minor, patch}` wire value (3 bytes)
//! - `CURRENT_VERSION` / `MIN_COMPAT_VERSION` / `MAX_COMPAT_VERSION`
//!
//! ## Versioning Strategy
//! The banner carries current, minimum-compatible and maximum-compatible
//! triples. All three are pinned to `0.0.1` for now; negotiation beyond
//! "the client may refuse to proceed" is not implemented.
//!
//! ## Last Modified
//! v0.1.0 - Initial version definitions

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::{ProtoError, Result};

// ============================================
// Constants
// ============================================

/// Wire size of one version triple.
pub const VERSION_TRIPLE_SIZE: usize = 3;

/// The protocol version this build speaks.
pub const CURRENT_VERSION: VersionTriple = VersionTriple::new(0, 0, 1);

/// Oldest client version this build accepts.
pub const MIN_COMPAT_VERSION: VersionTriple = VersionTriple::new(0, 0, 1);

/// Newest client version this build accepts.
pub const MAX_COMPAT_VERSION: VersionTriple = VersionTriple::new(0, 0, 1);

// ============================================
// VersionTriple
// ============================================

/// A `{major, minor, patch}` protocol version.
///
/// # Wire Format (3 bytes)
/// One `u8` per component, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTriple {
    /// Major version component.
    pub major: u8,
    /// Minor version component.
    pub minor: u8,
    /// Patch version component.
    pub patch: u8,
}

impl VersionTriple {
    /// Creates a new version triple.
    #[must_use]
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Writes the triple into `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.major);
        buf.put_u8(self.minor);
        buf.put_u8(self.patch);
    }

    /// Reads a triple from `buf`.
    ///
    /// # Errors
    /// Returns `TooShort` if fewer than 3 bytes remain.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < VERSION_TRIPLE_SIZE {
            return Err(ProtoError::too_short(VERSION_TRIPLE_SIZE, buf.remaining()));
        }
        Ok(Self {
            major: buf.get_u8(),
            minor: buf.get_u8(),
            patch: buf.get_u8(),
        })
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================
// Tests
// ============================================
