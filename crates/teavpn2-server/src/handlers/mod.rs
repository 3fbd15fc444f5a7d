// ============================================
// File: crates/teavpn2-server/src/handlers/mod.rs
// ============================================
//! # Frame Handlers
//!
//! The per-frame client state machine. The reactor decodes frames and
//! calls [`frame::on_frame`]; the returned [`frame::FrameVerdict`] tells
//! it whether to continue, forward a datagram to the TUN device, or drop
//! the connection.

pub mod frame;

pub use frame::{on_frame, FrameVerdict};
