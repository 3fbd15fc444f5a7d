// ============================================
// File: crates/teavpn2-server/src/handlers/frame.rs
// ============================================
//! # Client Frame Handler
//!
//! ## Creation Reason
//! The per-frame state machine: reacts to one decoded client frame,
//! drives the slot through `NEW → ESTABLISHED → AUTHENTICATED →
//! DISCONNECTED`, and emits at most one reply frame per input frame.
//!
//! ## Transition Table
//! | state \ frame | HELLO | AUTH | IFACE_DATA | CLOSE | other |
//! |---------------|-------|------|------------|-------|-------|
//! | NEW           | banner → ESTABLISHED | close | close | close | close |
//! | ESTABLISHED   | no-op | run auth | close | close | close |
//! | AUTHENTICATED | no-op | no-op | → TUN | close | charge budget |
//!
//! "other" covers `IFACE_ACK`, `IFACE_FAIL`, `REQSYNC` and unknown type
//! bytes: tolerated (budget-charged) once authenticated, fatal before.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Send failures are charged to the error budget by `send_frame`; the
//!   handshake sends additionally close the connection outright
//! - `AUTHENTICATED` is only entered after the `AUTH_OK` frame was
//!   accepted by the socket, so a client that never saw its assignment is
//!   never treated as authenticated
//!
//! ## Last Modified
//! v0.1.0 - Initial frame handler

use tracing::{debug, info, trace, warn};

use teavpn2_proto::codec::{auth_ok_frame, auth_reject_frame, banner_frame};
use teavpn2_proto::messages::Banner;
use teavpn2_proto::{AuthPayload, ClientPacketKind};

use crate::services::auth::{AuthOutcome, Authenticator};
use crate::services::client::{ClientMeta, ClientState, FrameSink};

// ============================================
// FrameVerdict
// ============================================

/// What the reactor must do after one frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Keep the connection; move to the next frame.
    Continue,
    /// Forward this frame's payload to the TUN device.
    WriteTun,
    /// Terminate the connection and recycle the slot.
    Close,
}

// ============================================
// Entry Point
// ============================================

/// Handles one decoded frame for the client in `meta`.
pub fn on_frame(
    meta: &mut ClientMeta,
    sink: &dyn FrameSink,
    kind: u8,
    payload: &[u8],
    auth: &dyn Authenticator,
) -> FrameVerdict {
    match ClientPacketKind::from_byte(kind) {
        Some(ClientPacketKind::Hello) => handle_hello(meta, sink),
        Some(ClientPacketKind::Auth) => handle_auth(meta, sink, payload, auth),
        Some(ClientPacketKind::IfaceData) => {
            if meta.state != ClientState::Authenticated {
                warn!(
                    peer = %meta.peer(),
                    state = %meta.state,
                    "Data frame before authentication"
                );
                return FrameVerdict::Close;
            }
            FrameVerdict::WriteTun
        }
        Some(ClientPacketKind::Close) => {
            info!(peer = %meta.peer(), user = %meta.username, "Client requested close");
            FrameVerdict::Close
        }
        Some(ClientPacketKind::IfaceAck | ClientPacketKind::IfaceFail | ClientPacketKind::ReqSync)
        | None => handle_other(meta, kind),
    }
}

// ============================================
// HELLO
// ============================================

fn handle_hello(meta: &mut ClientMeta, sink: &dyn FrameSink) -> FrameVerdict {
    // Only a brand-new connection gets a banner; repeats are harmless.
    if meta.state != ClientState::New {
        trace!(peer = %meta.peer(), "Ignoring repeated hello");
        return FrameVerdict::Continue;
    }

    meta.state = ClientState::Established;
    let frame = banner_frame(&Banner::current());
    if !send_frame(meta, sink, &frame) {
        warn!(peer = %meta.peer(), "Cannot deliver banner, dropping connection");
        return FrameVerdict::Close;
    }

    debug!(peer = %meta.peer(), slot = meta.slot_idx, "Banner sent");
    FrameVerdict::Continue
}

// ============================================
// AUTH
// ============================================

fn handle_auth(
    meta: &mut ClientMeta,
    sink: &dyn FrameSink,
    payload: &[u8],
    auth: &dyn Authenticator,
) -> FrameVerdict {
    // The hello/banner exchange must come first.
    if meta.state == ClientState::New {
        warn!(peer = %meta.peer(), "Auth before hello, dropping connection");
        return FrameVerdict::Close;
    }

    // Re-auth after success is a no-op.
    if meta.is_authenticated {
        trace!(peer = %meta.peer(), user = %meta.username, "Ignoring repeated auth");
        return FrameVerdict::Continue;
    }

    let mut payload = payload;
    let creds = match AuthPayload::decode(&mut payload) {
        Ok(creds) => creds,
        Err(e) => {
            warn!(peer = %meta.peer(), "Unparseable auth payload ({}), dropping connection", e);
            return FrameVerdict::Close;
        }
    };

    meta.set_username(&creds.username);
    info!(peer = %meta.peer(), user = %meta.username, "Authentication attempt");

    match auth.authenticate(&creds.username, &creds.password) {
        AuthOutcome::Assigned(assign) => {
            let frame = auth_ok_frame(&assign);
            if !send_frame(meta, sink, &frame) {
                warn!(
                    peer = %meta.peer(),
                    user = %meta.username,
                    "Cannot deliver auth_ok, dropping connection"
                );
                let _ = sink.send_frame(&auth_reject_frame());
                return FrameVerdict::Close;
            }

            meta.is_authenticated = true;
            meta.state = ClientState::Authenticated;
            info!(
                peer = %meta.peer(),
                user = %meta.username,
                dev = %assign.dev,
                ipv4 = %assign.ipv4,
                netmask = %assign.netmask,
                mtu = assign.mtu,
                "Authentication success, interface assigned"
            );
            FrameVerdict::Continue
        }
        AuthOutcome::Rejected => {
            info!(peer = %meta.peer(), user = %meta.username, "Authentication failed");
            let frame = auth_reject_frame();
            let _ = send_frame(meta, sink, &frame);
            FrameVerdict::Close
        }
    }
}

// ============================================
// Other / Unknown
// ============================================

fn handle_other(meta: &mut ClientMeta, kind: u8) -> FrameVerdict {
    debug!(
        peer = %meta.peer(),
        user = %meta.username,
        kind,
        "Unhandled packet type"
    );

    // Before authentication an unexpected frame is fatal; afterwards it
    // only burns budget.
    if !meta.is_authenticated {
        return FrameVerdict::Close;
    }
    if meta.charge_err() {
        warn!(
            peer = %meta.peer(),
            user = %meta.username,
            "Error budget exhausted, dropping connection"
        );
        return FrameVerdict::Close;
    }
    FrameVerdict::Continue
}

// ============================================
// Send Helper
// ============================================

/// Sends one frame; failures are charged to the error budget.
fn send_frame(meta: &mut ClientMeta, sink: &dyn FrameSink, frame: &[u8]) -> bool {
    if sink.send_frame(frame) {
        meta.send_count += 1;
        trace!(
            peer = %meta.peer(),
            send_count = meta.send_count,
            len = frame.len(),
            "Frame sent"
        );
        true
    } else {
        meta.charge_err();
        false
    }
}

// ============================================
// Tests
// ============================================
