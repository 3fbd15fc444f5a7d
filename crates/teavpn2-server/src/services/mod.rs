// ============================================
// File: crates/teavpn2-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! The building blocks the reactor composes: the slot allocator, the
//! per-client state, and the authentication adapter.

pub mod auth;
pub mod client;
pub mod slots;

pub use auth::{AuthOutcome, Authenticator, FileAuthenticator};
pub use client::{ClientMeta, ClientSlot, ClientState, ClientTx, FrameSink, MAX_ERR_C};
pub use slots::SlotStack;
