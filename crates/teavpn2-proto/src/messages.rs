// ============================================
// File: crates/teavpn2-proto/src/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines the packet type codes and payload structures exchanged between
//! TeaVPN2 clients and the server over the framed TCP stream.
//!
//! ## Main Functionality
//! - `ClientPacketKind` / `ServerPacketKind`: one-byte type codes
//! - `Banner`: server greeting carrying three version triples
//! - `AuthPayload`: username/password credentials
//! - `IfaceAssign`: interface assignment echoed in `AUTH_OK`
//!
//! ## Frame Layout
//! Every frame is a 4-byte header followed by up to 4096 payload bytes:
//!
//! ```text
//! ┌──────────┬──────────┬────────────────┬──────────────────┐
//! │ type: u8 │ pad: u8  │ length: u16 BE │ payload[length]  │
//! └──────────┴──────────┴────────────────┴──────────────────┘
//! ```
//!
//! Multi-byte payload integers are little-endian; only the frame length
//! travels in network byte order.
//!
//! ## Payload Sizes
//! | Payload | Size (bytes) |
//! |---------|--------------|
//! | Banner | 9 |
//! | AuthPayload | 128 |
//! | IfaceAssign | 50 |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Type code values are wire-visible; never renumber them
//! - Text fields are NUL-padded to fixed widths, the NUL is mandatory
//! - `PAYLOAD_MAX` bounds every frame; the codec enforces it on decode
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use bytes::{Buf, BufMut};

use crate::error::{ProtoError, Result};
use crate::version::{
    VersionTriple, CURRENT_VERSION, MAX_COMPAT_VERSION, MIN_COMPAT_VERSION,
};

// ============================================
// Wire Size Constants
// ============================================

/// Size of the frame header (`type`, `pad`, `length`).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum payload carried by a single frame.
pub const PAYLOAD_MAX: usize = 4096;

/// Maximum on-wire size of one frame.
pub const FRAME_MAX_SIZE: usize = FRAME_HEADER_SIZE + PAYLOAD_MAX;

/// Size of the banner payload (three version triples).
pub const BANNER_SIZE: usize = 9;

/// Wire width of each credential field, including its NUL terminator.
pub const AUTH_FIELD_SIZE: usize = 64;

/// Size of the authentication payload (username + password).
pub const AUTH_PAYLOAD_SIZE: usize = AUTH_FIELD_SIZE * 2;

/// Wire width of each interface text field, including its NUL terminator.
pub const IFACE_STR_SIZE: usize = 16;

/// Size of the interface assignment payload.
pub const IFACE_ASSIGN_SIZE: usize = IFACE_STR_SIZE * 3 + 2;

// ============================================
// ClientPacketKind
// ============================================

/// Type codes for frames sent by the client.
///
/// # Values
/// | Value | Kind |
/// |-------|------|
/// | 0 | Hello |
/// | 1 | Auth |
/// | 2 | IfaceAck |
/// | 3 | IfaceFail |
/// | 4 | IfaceData |
/// | 5 | ReqSync |
/// | 6 | Close |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientPacketKind {
    /// Opens the conversation; the server answers with a banner.
    Hello = 0,
    /// Carries credentials (`AuthPayload`).
    Auth = 1,
    /// Client acknowledged its interface assignment.
    IfaceAck = 2,
    /// Client failed to apply its interface assignment.
    IfaceFail = 3,
    /// Tunneled IP datagram bound for the server's TUN device.
    IfaceData = 4,
    /// Client requests a state resync.
    ReqSync = 5,
    /// Client is closing the connection.
    Close = 6,
}

impl ClientPacketKind {
    /// Converts a wire byte to a packet kind.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Hello),
            1 => Some(Self::Auth),
            2 => Some(Self::IfaceAck),
            3 => Some(Self::IfaceFail),
            4 => Some(Self::IfaceData),
            5 => Some(Self::ReqSync),
            6 => Some(Self::Close),
            _ => None,
        }
    }

    /// Returns the wire byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

// ============================================
// ServerPacketKind
// ============================================

/// Type codes for frames sent by the server.
///
/// # Values
/// | Value | Kind |
/// |-------|------|
/// | 0 | Banner |
/// | 1 | AuthOk |
/// | 2 | AuthReject |
/// | 3 | Data |
/// | 4 | Close |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerPacketKind {
    /// Greeting with the three version triples.
    Banner = 0,
    /// Credentials accepted; payload is an `IfaceAssign`.
    AuthOk = 1,
    /// Credentials refused; empty payload.
    AuthReject = 2,
    /// Tunneled IP datagram read from the server's TUN device.
    Data = 3,
    /// Server is closing the connection.
    Close = 4,
}

impl ServerPacketKind {
    /// Converts a wire byte to a packet kind.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Banner),
            1 => Some(Self::AuthOk),
            2 => Some(Self::AuthReject),
            3 => Some(Self::Data),
            4 => Some(Self::Close),
            _ => None,
        }
    }

    /// Returns the wire byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

// ============================================
// Banner
// ============================================

/// Server greeting payload.
///
/// # Wire Format (9 bytes)
/// Three version triples: current, minimum-compatible, maximum-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Banner {
    /// Version this server speaks.
    pub cur: VersionTriple,
    /// Oldest client version accepted.
    pub min: VersionTriple,
    /// Newest client version accepted.
    pub max: VersionTriple,
}

impl Banner {
    /// Returns the banner advertised by this build.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            cur: CURRENT_VERSION,
            min: MIN_COMPAT_VERSION,
            max: MAX_COMPAT_VERSION,
        }
    }

    /// Writes the banner payload into `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.cur.encode(buf);
        self.min.encode(buf);
        self.max.encode(buf);
    }

    /// Reads a banner payload from `buf`.
    ///
    /// # Errors
    /// Returns `TooShort` if fewer than 9 bytes remain.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < BANNER_SIZE {
            return Err(ProtoError::too_short(BANNER_SIZE, buf.remaining()));
        }
        Ok(Self {
            cur: VersionTriple::decode(buf)?,
            min: VersionTriple::decode(buf)?,
            max: VersionTriple::decode(buf)?,
        })
    }
}

impl Default for Banner {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================
// AuthPayload
// ============================================

/// Credentials carried by an `Auth` frame.
///
/// # Wire Format (128 bytes)
/// `username` and `password`, each NUL-padded to 64 bytes. At least one
/// NUL must fit, so each field holds at most 63 bytes of text.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthPayload {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl AuthPayload {
    /// Creates a new payload, validating field widths.
    ///
    /// # Errors
    /// Returns `FieldTooLong` if either field cannot fit its wire slot.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        check_fixed_str("username", &username, AUTH_FIELD_SIZE)?;
        check_fixed_str("password", &password, AUTH_FIELD_SIZE)?;
        Ok(Self { username, password })
    }

    /// Writes the payload into `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        put_fixed_str(buf, &self.username, AUTH_FIELD_SIZE);
        put_fixed_str(buf, &self.password, AUTH_FIELD_SIZE);
    }

    /// Reads a payload from `buf`.
    ///
    /// # Errors
    /// Returns `TooShort` on a truncated payload or `Malformed` if a field
    /// is not valid UTF-8 up to its first NUL.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < AUTH_PAYLOAD_SIZE {
            return Err(ProtoError::too_short(AUTH_PAYLOAD_SIZE, buf.remaining()));
        }
        Ok(Self {
            username: get_fixed_str(buf, "username", AUTH_FIELD_SIZE)?,
            password: get_fixed_str(buf, "password", AUTH_FIELD_SIZE)?,
        })
    }
}

// Never leak the password through Debug output.
impl std::fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPayload")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================
// IfaceAssign
// ============================================

/// Interface assignment delivered in `AUTH_OK`.
///
/// Tells the client which device name, address, netmask and MTU to apply
/// to its local tunnel interface.
///
/// # Wire Format (50 bytes)
/// ```text
/// ┌──────────────────┬──────────────────┬──────────────────┬────────────┐
/// │ dev (16, NUL pad)│ ipv4 (16, NUL)   │ netmask (16, NUL)│ mtu u16 LE │
/// └──────────────────┴──────────────────┴──────────────────┴────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceAssign {
    /// Device name the client should use.
    pub dev: String,
    /// Dotted-quad IPv4 address.
    pub ipv4: String,
    /// Dotted-quad network mask.
    pub netmask: String,
    /// MTU the client should configure.
    pub mtu: u16,
}

impl IfaceAssign {
    /// Creates a new assignment, validating field widths.
    ///
    /// # Errors
    /// Returns `FieldTooLong` if any text field cannot fit its wire slot.
    pub fn new(
        dev: impl Into<String>,
        ipv4: impl Into<String>,
        netmask: impl Into<String>,
        mtu: u16,
    ) -> Result<Self> {
        let dev = dev.into();
        let ipv4 = ipv4.into();
        let netmask = netmask.into();
        check_fixed_str("dev", &dev, IFACE_STR_SIZE)?;
        check_fixed_str("ipv4", &ipv4, IFACE_STR_SIZE)?;
        check_fixed_str("netmask", &netmask, IFACE_STR_SIZE)?;
        Ok(Self {
            dev,
            ipv4,
            netmask,
            mtu,
        })
    }

    /// Writes the assignment into `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        put_fixed_str(buf, &self.dev, IFACE_STR_SIZE);
        put_fixed_str(buf, &self.ipv4, IFACE_STR_SIZE);
        put_fixed_str(buf, &self.netmask, IFACE_STR_SIZE);
        buf.put_u16_le(self.mtu);
    }

    /// Reads an assignment from `buf`.
    ///
    /// # Errors
    /// Returns `TooShort` on a truncated payload or `Malformed` on an
    /// invalid text field.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < IFACE_ASSIGN_SIZE {
            return Err(ProtoError::too_short(IFACE_ASSIGN_SIZE, buf.remaining()));
        }
        let dev = get_fixed_str(buf, "dev", IFACE_STR_SIZE)?;
        let ipv4 = get_fixed_str(buf, "ipv4", IFACE_STR_SIZE)?;
        let netmask = get_fixed_str(buf, "netmask", IFACE_STR_SIZE)?;
        let mtu = buf.get_u16_le();
        Ok(Self {
            dev,
            ipv4,
            netmask,
            mtu,
        })
    }
}

// ============================================
// Fixed-Width Text Helpers
// ============================================

/// Validates that `value` plus a NUL terminator fits in `cap` bytes.
fn check_fixed_str(field: &'static str, value: &str, cap: usize) -> Result<()> {
    if value.len() >= cap {
        return Err(ProtoError::FieldTooLong {
            field,
            len: value.len(),
            cap,
        });
    }
    Ok(())
}

/// Writes `value` NUL-padded to exactly `cap` bytes.
///
/// Callers must have validated the length via `check_fixed_str`; each
/// message constructor does so.
fn put_fixed_str(buf: &mut impl BufMut, value: &str, cap: usize) {
    debug_assert!(value.len() < cap);
    buf.put_slice(value.as_bytes());
    buf.put_bytes(0, cap - value.len());
}

/// Reads a `cap`-byte NUL-padded field and returns the text before the
/// first NUL.
fn get_fixed_str(buf: &mut impl Buf, field: &'static str, cap: usize) -> Result<String> {
    let mut raw = vec![0u8; cap];
    buf.copy_to_slice(&mut raw);

    let end = raw.iter().position(|&b| b == 0).unwrap_or(cap);
    String::from_utf8(raw[..end].to_vec())
        .map_err(|_| ProtoError::malformed(format!("field '{field}' is not valid UTF-8")))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_client_kind_roundtrip() {
        for kind in [
            ClientPacketKind::Hello,
            ClientPacketKind::Auth,
            ClientPacketKind::IfaceAck,
            ClientPacketKind::IfaceFail,
            ClientPacketKind::IfaceData,
            ClientPacketKind::ReqSync,
            ClientPacketKind::Close,
        ] {
            assert_eq!(ClientPacketKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(ClientPacketKind::from_byte(7), None);
        assert_eq!(ClientPacketKind::from_byte(0xFF), None);
    }

    #[test]
    fn test_server_kind_roundtrip() {
        for kind in [
            ServerPacketKind::Banner,
            ServerPacketKind::AuthOk,
            ServerPacketKind::AuthReject,
            ServerPacketKind::Data,
            ServerPacketKind::Close,
        ] {
            assert_eq!(ServerPacketKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(ServerPacketKind::from_byte(5), None);
    }

    #[test]
    fn test_banner_roundtrip() {
        let banner = Banner::current();

        let mut buf = BytesMut::new();
        banner.encode(&mut buf);
        assert_eq!(buf.len(), BANNER_SIZE);
        // All triples are 0.0.1.
        assert_eq!(&buf[..], &[0, 0, 1, 0, 0, 1, 0, 0, 1]);

        let decoded = Banner::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, banner);
    }

    #[test]
    fn test_auth_payload_roundtrip() {
        let auth = AuthPayload::new("alice", "hunter2").unwrap();

        let mut buf = BytesMut::new();
        auth.encode(&mut buf);
        assert_eq!(buf.len(), AUTH_PAYLOAD_SIZE);
        assert_eq!(&buf[..5], b"alice");
        assert_eq!(buf[5], 0);

        let decoded = AuthPayload::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.password, "hunter2");
    }

    #[test]
    fn test_auth_payload_field_too_long() {
        let long = "x".repeat(AUTH_FIELD_SIZE);
        assert!(matches!(
            AuthPayload::new(long, "pw"),
            Err(ProtoError::FieldTooLong { field: "username", .. })
        ));
    }

    #[test]
    fn test_auth_payload_max_field() {
        // 63 bytes of text plus the mandatory NUL exactly fills the slot.
        let max = "x".repeat(AUTH_FIELD_SIZE - 1);
        let auth = AuthPayload::new(max.clone(), max.clone()).unwrap();

        let mut buf = BytesMut::new();
        auth.encode(&mut buf);
        let decoded = AuthPayload::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.username, max);
    }

    #[test]
    fn test_auth_payload_debug_redacts_password() {
        let auth = AuthPayload::new("alice", "hunter2").unwrap();
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_iface_assign_roundtrip() {
        let assign =
            IfaceAssign::new("teavpn2-srv", "10.8.8.2", "255.255.255.0", 1480).unwrap();

        let mut buf = BytesMut::new();
        assign.encode(&mut buf);
        assert_eq!(buf.len(), IFACE_ASSIGN_SIZE);
        // MTU trails the three 16-byte fields, little-endian.
        assert_eq!(&buf[48..50], &1480u16.to_le_bytes());

        let decoded = IfaceAssign::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, assign);
    }

    #[test]
    fn test_iface_assign_dev_too_long() {
        assert!(matches!(
            IfaceAssign::new("a-very-long-device-name", "10.0.0.1", "255.0.0.0", 1500),
            Err(ProtoError::FieldTooLong { field: "dev", .. })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let mut short = bytes::Bytes::from_static(&[0u8; 10]);
        assert!(AuthPayload::decode(&mut short).is_err());

        let mut short = bytes::Bytes::from_static(&[0u8; 10]);
        assert!(IfaceAssign::decode(&mut short).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut raw = vec![0xFFu8; AUTH_PAYLOAD_SIZE];
        raw[4] = 0;
        let mut bytes = bytes::Bytes::from(raw);
        assert!(matches!(
            AuthPayload::decode(&mut bytes),
            Err(ProtoError::Malformed { .. })
        ));
    }
}
