// ============================================
// File: crates/teavpn2-proto/src/lib.rs
// ============================================
//! # TeaVPN2 Protocol Library
//!
//! ## Creation Reason
//! Defines the TeaVPN2 wire protocol: the framed packet layout spoken over
//! the client ⇄ server TCP stream, and the codec that carves frames out of
//! a byte stream that arrives in arbitrary slices.
//!
//! ## Main Functionality
//! - [`messages`]: packet type codes and payload structures
//! - [`codec`]: frame encoder and the sliding-buffer decoder
//! - [`version`]: banner version triples
//! - [`error`]: protocol error types
//!
//! ## Frame Anatomy
//! ```text
//! ┌──────────┬─────────┬────────────────┬───────────────────────┐
//! │ type: u8 │ pad: u8 │ length: u16 BE │ payload (≤ 4096 bytes)│
//! └──────────┴─────────┴────────────────┴───────────────────────┘
//! ```
//!
//! ## Handshake Sequence
//! ```text
//! client                          server
//!   │ ── HELLO (len 0) ────────────► │
//!   │ ◄──────────── BANNER (9 B) ─── │
//!   │ ── AUTH (128 B) ─────────────► │
//!   │ ◄── AUTH_OK (50 B) / REJECT ── │
//!   │ ⇄  IFACE_DATA / DATA frames    │
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is I/O-free on purpose; everything here is testable
//!   without sockets
//! - The data plane is cleartext; the codec never inspects payloads
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod error;
pub mod messages;
pub mod version;

// Re-export primary types
pub use codec::{Decoded, FrameBuffer, FrameRef};
pub use error::{ProtoError, Result};
pub use messages::{
    AuthPayload, Banner, ClientPacketKind, IfaceAssign, ServerPacketKind,
    FRAME_HEADER_SIZE, FRAME_MAX_SIZE, PAYLOAD_MAX,
};
pub use version::VersionTriple;
