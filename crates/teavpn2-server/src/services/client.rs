// ============================================
// File: crates/teavpn2-server/src/services/client.rs
// ============================================
//! # Client Slot State
//!
//! ## Creation Reason
//! Per-connection state for one entry of the fixed client array: the
//! connection-state machine fields, the receive buffer, diagnostic
//! counters, the error budget, and the non-blocking send half.
//!
//! ## Slot Lifecycle
//! ```text
//! ┌────────┐ accept ┌─────┐ HELLO ┌─────────────┐ AUTH_OK ┌───────────────┐
//! │ (free) │ ──────►│ NEW │ ─────►│ ESTABLISHED │ ───────►│ AUTHENTICATED │
//! └────────┘        └──┬──┘       └──────┬──────┘         └───────┬───────┘
//!      ▲               │                 │                        │
//!      │               ▼                 ▼                        ▼
//!      │          ┌──────────────────────────────────────────────────┐
//!      └──────────│                 DISCONNECTED                     │
//!        reset +  └──────────────────────────────────────────────────┘
//!        push idx
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Slots are owned exclusively by the reactor task; nothing here needs
//!   a lock
//! - `generation` disambiguates events from a previous tenant of the same
//!   slot; always compare it before acting on a reader event
//!
//! ## Last Modified
//! v0.1.0 - Initial client slot implementation

use std::net::SocketAddr;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tracing::trace;

use teavpn2_proto::FrameBuffer;

// ============================================
// Constants
// ============================================

/// Error budget per connection; exceeding it forces a disconnect.
pub const MAX_ERR_C: u8 = 10;

/// Username storage cap (bytes).
pub const USERNAME_MAX: usize = 255;

/// Placeholder username before authentication.
pub const USERNAME_UNSET: &str = "_";

// ============================================
// ClientState
// ============================================

/// Connection-state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Just accepted; nothing received yet.
    New,
    /// Banner sent after `HELLO`.
    Established,
    /// Credentials accepted, interface assignment delivered.
    Authenticated,
    /// Slot about to be recycled.
    Disconnected,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Established => write!(f, "established"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

// ============================================
// FrameSink
// ============================================

/// One-shot, non-blocking frame transmission toward a client.
///
/// The state machine sends through this seam so it can be exercised
/// without sockets.
pub trait FrameSink {
    /// Attempts to send one complete frame; `true` only if every byte was
    /// accepted. A short write counts as failure, per the protocol's
    /// no-partial-send rule.
    fn send_frame(&self, frame: &[u8]) -> bool;
}

// ============================================
// ClientTx
// ============================================

/// Non-blocking sender over the write half of a client socket.
pub struct ClientTx {
    half: OwnedWriteHalf,
}

impl ClientTx {
    /// Wraps the write half of an accepted stream.
    #[must_use]
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self { half }
    }
}

impl FrameSink for ClientTx {
    fn send_frame(&self, frame: &[u8]) -> bool {
        match self.half.try_write(frame) {
            Ok(n) if n == frame.len() => true,
            Ok(n) => {
                trace!(sent = n, len = frame.len(), "Short write to client");
                false
            }
            Err(e) => {
                trace!("try_write failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for ClientTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTx").finish_non_exhaustive()
    }
}

// ============================================
// ClientMeta
// ============================================

/// The state-machine-visible portion of a client slot.
#[derive(Debug)]
pub struct ClientMeta {
    /// Index of this slot in the client array; never changes.
    pub slot_idx: u16,
    /// Whether the slot holds a live connection.
    pub in_use: bool,
    /// Whether the socket is connected.
    pub is_connected: bool,
    /// Whether credentials were accepted.
    pub is_authenticated: bool,
    /// Connection-state machine position.
    pub state: ClientState,
    /// Username; `"_"` until authentication names it.
    pub username: String,
    /// Remote socket address while connected.
    pub src_addr: Option<SocketAddr>,
    /// Tenant counter; bumped on every `activate`.
    pub generation: u64,
    /// Charged protocol errors.
    pub err_count: u8,
    /// Frames sent to this client.
    pub send_count: u32,
    /// Socket reads received from this client.
    pub recv_count: u32,
}

impl ClientMeta {
    fn new(slot_idx: u16) -> Self {
        Self {
            slot_idx,
            in_use: false,
            is_connected: false,
            is_authenticated: false,
            state: ClientState::Disconnected,
            username: USERNAME_UNSET.to_string(),
            src_addr: None,
            generation: 0,
            err_count: 0,
            send_count: 0,
            recv_count: 0,
        }
    }

    /// Charges one error against the budget; `true` means the budget is
    /// exceeded and the connection must be dropped.
    pub fn charge_err(&mut self) -> bool {
        self.err_count = self.err_count.saturating_add(1);
        self.err_count > MAX_ERR_C
    }

    /// Stores the authenticated username, capped at `USERNAME_MAX` bytes
    /// on a character boundary.
    pub fn set_username(&mut self, username: &str) {
        let mut end = username.len().min(USERNAME_MAX);
        while !username.is_char_boundary(end) {
            end -= 1;
        }
        self.username.clear();
        self.username.push_str(&username[..end]);
    }

    /// Remote address rendered for log lines; `?` when not connected.
    #[must_use]
    pub fn peer(&self) -> String {
        self.src_addr
            .map_or_else(|| "?".to_string(), |addr| addr.to_string())
    }
}

// ============================================
// ClientConn
// ============================================

/// I/O handles for a live connection.
#[derive(Debug)]
pub struct ClientConn {
    /// Non-blocking sender.
    pub tx: ClientTx,
    /// The socket reader task feeding the reactor.
    pub reader: JoinHandle<()>,
}

// ============================================
// ClientSlot
// ============================================

/// One entry of the fixed client array.
///
/// The fields are deliberately separate structs so the reactor can borrow
/// the receive buffer, the state machine fields, and the send half
/// disjointly while handling one frame.
#[derive(Debug)]
pub struct ClientSlot {
    /// State machine fields and counters.
    pub meta: ClientMeta,
    /// Sliding receive buffer.
    pub rx: FrameBuffer,
    /// Socket halves; `None` while the slot is free.
    pub conn: Option<ClientConn>,
}

impl ClientSlot {
    /// Creates a free slot for index `slot_idx`.
    #[must_use]
    pub fn new(slot_idx: u16) -> Self {
        Self {
            meta: ClientMeta::new(slot_idx),
            rx: FrameBuffer::new(),
            conn: None,
        }
    }

    /// Installs a freshly accepted connection.
    pub fn activate(
        &mut self,
        src_addr: SocketAddr,
        tx: ClientTx,
        reader: JoinHandle<()>,
        generation: u64,
    ) {
        debug_assert!(!self.meta.in_use, "activating an occupied slot");

        self.meta.in_use = true;
        self.meta.is_connected = true;
        self.meta.is_authenticated = false;
        self.meta.state = ClientState::New;
        self.meta.username.clear();
        self.meta.username.push_str(USERNAME_UNSET);
        self.meta.src_addr = Some(src_addr);
        self.meta.generation = generation;
        self.meta.err_count = 0;
        self.meta.send_count = 0;
        self.meta.recv_count = 0;
        self.rx.reset();
        self.conn = Some(ClientConn { tx, reader });
    }

    /// Returns the slot to its free state. `slot_idx` and `generation`
    /// are preserved; the connection handles must already be gone.
    pub fn reset(&mut self) {
        debug_assert!(self.conn.is_none(), "resetting a slot with live I/O");

        self.meta.in_use = false;
        self.meta.is_connected = false;
        self.meta.is_authenticated = false;
        self.meta.state = ClientState::Disconnected;
        self.meta.username.clear();
        self.meta.username.push_str(USERNAME_UNSET);
        self.meta.src_addr = None;
        self.meta.err_count = 0;
        self.meta.send_count = 0;
        self.meta.recv_count = 0;
        self.rx.reset();
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_free() {
        let slot = ClientSlot::new(3);
        assert_eq!(slot.meta.slot_idx, 3);
        assert!(!slot.meta.in_use);
        assert_eq!(slot.meta.state, ClientState::Disconnected);
        assert_eq!(slot.meta.username, USERNAME_UNSET);
        assert!(slot.conn.is_none());
    }

    #[test]
    fn test_reset_clears_everything_but_identity() {
        let mut slot = ClientSlot::new(7);
        slot.meta.in_use = true;
        slot.meta.is_connected = true;
        slot.meta.is_authenticated = true;
        slot.meta.state = ClientState::Authenticated;
        slot.meta.set_username("alice");
        slot.meta.src_addr = Some("10.0.0.9:1234".parse().unwrap());
        slot.meta.generation = 42;
        slot.meta.err_count = 3;
        slot.meta.send_count = 10;
        slot.meta.recv_count = 20;
        slot.rx.extend(&[1, 2, 3]);

        slot.reset();

        assert_eq!(slot.meta.slot_idx, 7);
        assert_eq!(slot.meta.generation, 42);
        assert!(!slot.meta.in_use);
        assert!(!slot.meta.is_authenticated);
        assert_eq!(slot.meta.state, ClientState::Disconnected);
        assert_eq!(slot.meta.username, USERNAME_UNSET);
        assert_eq!(slot.meta.src_addr, None);
        assert_eq!(slot.meta.err_count, 0);
        assert_eq!(slot.meta.send_count, 0);
        assert_eq!(slot.meta.recv_count, 0);
        assert!(slot.rx.is_empty());
    }

    #[test]
    fn test_error_budget() {
        let mut slot = ClientSlot::new(0);

        // The first MAX_ERR_C charges stay within budget.
        for i in 1..=MAX_ERR_C {
            assert!(!slot.meta.charge_err(), "charge {i} should not disconnect");
        }
        // The next one exceeds it.
        assert!(slot.meta.charge_err());
        assert_eq!(slot.meta.err_count, MAX_ERR_C + 1);
    }

    #[test]
    fn test_username_cap() {
        let mut slot = ClientSlot::new(0);
        let long = "u".repeat(USERNAME_MAX + 50);
        slot.meta.set_username(&long);
        assert_eq!(slot.meta.username.len(), USERNAME_MAX);
    }

    #[test]
    fn test_username_cap_respects_char_boundary() {
        let mut slot = ClientSlot::new(0);
        // 'é' is 2 bytes; 128 of them straddle the 255-byte cap.
        let wide = "é".repeat(128);
        slot.meta.set_username(&wide);
        assert!(slot.meta.username.len() <= USERNAME_MAX);
        assert!(wide.starts_with(&slot.meta.username));
    }

    #[test]
    fn test_peer_rendering() {
        let mut slot = ClientSlot::new(0);
        assert_eq!(slot.meta.peer(), "?");
        slot.meta.src_addr = Some("192.0.2.1:5000".parse().unwrap());
        assert_eq!(slot.meta.peer(), "192.0.2.1:5000");
    }
}
