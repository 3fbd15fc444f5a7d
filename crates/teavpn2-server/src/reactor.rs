// ============================================
// File: crates/teavpn2-server/src/reactor.rs
// ============================================
//! # Reactor Event Loop
//!
//! ## Creation Reason
//! The single loop that multiplexes everything the server reacts to: the
//! listen socket, the TUN device, the shutdown channel, and the byte
//! streams of every connected client.
//!
//! ## Main Functionality
//! - Accept path: slot pop, socket options, reader task spawn
//! - Client path: buffer feed → frame decode → state machine → verdict
//! - TUN path: one datagram read → broadcast to authenticated slots
//! - Disconnect path: reader abort → socket drop → slot reset → index push
//!
//! ## Ownership Model
//! ```text
//!                      ┌──────────────────────────────┐
//!   reader task 0 ──┐  │           Reactor            │
//!   reader task 1 ──┼─►│ mpsc │ clients[] │ SlotStack │──► ClientTx (try_write)
//!   reader task N ──┘  │      │ (exclusive owner)     │──► TunDevice::write
//!                      └──────────────────────────────┘
//! ```
//!
//! Reader tasks only move raw bytes; every state transition happens on
//! the reactor task, so client records need no locks. A generation
//! counter stamped into each event keeps a recycled slot from consuming
//! a dead tenant's stragglers.
//!
//! ## Ordering Guarantees
//! - Per client, frames reach the state machine in byte-stream order
//!   (one reader task, one FIFO channel)
//! - A broadcast walks slots in index order and finishes before the
//!   reactor touches anything else
//!
//! ## ⚠️ Important Note for Next Developer
//! - Client sends use `try_write`; a stalled peer costs budget, never
//!   blocks the loop
//! - A TUN read error stops the whole server; a TUN write error does not
//!
//! ## Last Modified
//! v0.1.0 - Initial reactor implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use teavpn2_proto::codec::{self, Decoded};
use teavpn2_proto::messages::{FRAME_HEADER_SIZE, FRAME_MAX_SIZE, PAYLOAD_MAX};
use teavpn2_transport::tcp as tcp_setup;
use teavpn2_transport::TunDevice;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::handlers::{self, FrameVerdict};
use crate::services::auth::Authenticator;
use crate::services::client::{ClientSlot, ClientState, ClientTx, FrameSink};
use crate::services::slots::SlotStack;

// ============================================
// Constants
// ============================================

/// Depth of the reader-event channel shared by all client reader tasks.
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Idle housekeeping cadence, matching the classic 5-second poll timeout.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

// ============================================
// Reader Events
// ============================================

/// What a client reader task reports to the reactor.
enum ReaderEvent {
    /// A chunk of bytes arrived on a client socket.
    Data {
        idx: u16,
        generation: u64,
        bytes: Bytes,
    },
    /// The socket reached EOF or failed.
    Closed {
        idx: u16,
        generation: u64,
        reason: CloseReason,
    },
}

enum CloseReason {
    Eof,
    Error(std::io::Error),
}

/// One completed wait of the multiplexing loop.
enum Tick {
    Shutdown,
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    TunRead(teavpn2_transport::Result<usize>),
    Reader(Option<ReaderEvent>),
    Stats,
}

// ============================================
// Reactor
// ============================================

/// The server's event loop; exclusive owner of the client array and the
/// free stack.
pub struct Reactor {
    listener: TcpListener,
    tun: Arc<dyn TunDevice>,
    auth: Arc<dyn Authenticator>,
    clients: Vec<ClientSlot>,
    stack: SlotStack,
    events_tx: mpsc::Sender<ReaderEvent>,
    events_rx: mpsc::Receiver<ReaderEvent>,
    next_generation: u64,
    max_conn: u16,
    stop: bool,
}

impl Reactor {
    /// Builds a reactor over an already-bound listener.
    #[must_use]
    pub fn new(
        cfg: &ServerConfig,
        listener: TcpListener,
        tun: Arc<dyn TunDevice>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        let max_conn = cfg.sock.max_conn;
        let clients = (0..max_conn).map(ClientSlot::new).collect();
        let stack = SlotStack::new_full(max_conn);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

        Self {
            listener,
            tun,
            auth,
            clients,
            stack,
            events_tx,
            events_rx,
            next_generation: 0,
            max_conn,
            stop: false,
        }
    }

    /// Returns the listener's bound address.
    ///
    /// # Errors
    /// Propagates the underlying socket error.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns how many slots hold live connections.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.clients.iter().filter(|s| s.meta.in_use).count()
    }

    /// Runs the loop until `shutdown` fires or the data plane dies.
    ///
    /// # Errors
    /// Currently never returns an error; fatal conditions stop the loop
    /// and tear down connections instead.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut tun_buf = vec![0u8; PAYLOAD_MAX];
        let mut stats = tokio::time::interval(STATS_INTERVAL);
        stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Initialization sequence completed");

        while !self.stop {
            let tick = tokio::select! {
                _ = shutdown.recv() => Tick::Shutdown,
                accepted = self.listener.accept() => Tick::Accepted(accepted),
                read = self.tun.read(&mut tun_buf) => Tick::TunRead(read),
                event = self.events_rx.recv() => Tick::Reader(event),
                _ = stats.tick() => Tick::Stats,
            };

            match tick {
                Tick::Shutdown => {
                    info!("Shutdown signal received");
                    self.stop = true;
                }
                Tick::Accepted(Ok((stream, addr))) => self.on_accept(stream, addr),
                Tick::Accepted(Err(e)) => {
                    // Transient accept failures (EMFILE, resets) are not
                    // fatal; the listener stays armed.
                    warn!("accept() failed: {}", e);
                }
                Tick::TunRead(Ok(0)) => {}
                Tick::TunRead(Ok(len)) => self.broadcast(&tun_buf[..len]),
                Tick::TunRead(Err(e)) => {
                    error!("TUN read failed, stopping server: {}", e);
                    self.stop = true;
                }
                Tick::Reader(Some(event)) => self.on_reader_event(event).await,
                Tick::Reader(None) => {
                    // Impossible while we hold a sender clone; treat it
                    // like a shutdown anyway.
                    error!("Reader event channel closed unexpectedly");
                    self.stop = true;
                }
                Tick::Stats => self.log_stats(),
            }
        }

        self.teardown();
        Ok(())
    }

    // ========================================
    // Accept Path
    // ========================================

    fn on_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = tcp_setup::prepare_stream(&stream) {
            warn!(peer = %addr, "Cannot set socket options: {}", e);
        }

        let Some(idx) = self.stack.pop() else {
            // Dropping the stream closes it before any server bytes go
            // out.
            info!(peer = %addr, "Client slot is full, can't accept connection");
            return;
        };

        self.next_generation += 1;
        let generation = self.next_generation;

        let (read_half, write_half) = stream.into_split();
        let reader = spawn_reader(read_half, idx, generation, self.events_tx.clone());

        self.clients[usize::from(idx)].activate(
            addr,
            ClientTx::new(write_half),
            reader,
            generation,
        );
        self.assert_slot_conservation();

        info!(peer = %addr, slot = idx, "New connection");
    }

    // ========================================
    // Client Path
    // ========================================

    async fn on_reader_event(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Data {
                idx,
                generation,
                bytes,
            } => {
                if !self.slot_matches(idx, generation) {
                    trace!(slot = idx, "Dropping stale data event");
                    return;
                }
                self.clients[usize::from(idx)].meta.recv_count += 1;
                self.on_client_bytes(usize::from(idx), &bytes).await;
            }
            ReaderEvent::Closed {
                idx,
                generation,
                reason,
            } => {
                if !self.slot_matches(idx, generation) {
                    trace!(slot = idx, "Dropping stale close event");
                    return;
                }
                let meta = &self.clients[usize::from(idx)].meta;
                match reason {
                    CloseReason::Eof => {
                        info!(
                            peer = %meta.peer(),
                            user = %meta.username,
                            "Peer has closed its connection"
                        );
                    }
                    CloseReason::Error(e) => {
                        warn!(
                            peer = %meta.peer(),
                            user = %meta.username,
                            "Socket error: {}", e
                        );
                    }
                }
                self.disconnect(idx);
            }
        }
    }

    fn slot_matches(&self, idx: u16, generation: u64) -> bool {
        self.clients
            .get(usize::from(idx))
            .is_some_and(|s| s.meta.in_use && s.meta.generation == generation)
    }

    /// Feeds one received chunk through the codec and the state machine.
    async fn on_client_bytes(&mut self, idx: usize, mut chunk: &[u8]) {
        loop {
            let taken = self.clients[idx].rx.extend(chunk);
            chunk = &chunk[taken..];

            // Drain every complete frame currently buffered. The decode
            // outcome is copied out first so the buffer is free to mutate.
            loop {
                let step = match self.clients[idx].rx.decode() {
                    Decoded::NeedMore => None,
                    Decoded::Corrupt { claimed } => Some(Err(claimed)),
                    Decoded::Frame(frame) => Some(Ok((frame.kind, frame.payload.len()))),
                };

                let (kind, payload_len) = match step {
                    None => break,
                    Some(Err(claimed)) => {
                        let slot = &mut self.clients[idx];
                        warn!(
                            peer = %slot.meta.peer(),
                            user = %slot.meta.username,
                            claimed,
                            max = PAYLOAD_MAX,
                            "Invalid packet length, corrupted stream?"
                        );
                        // No resync point exists; everything buffered is
                        // suspect.
                        slot.rx.reset();
                        if slot.meta.charge_err() {
                            warn!(
                                peer = %slot.meta.peer(),
                                user = %slot.meta.username,
                                "Error budget exhausted, dropping connection"
                            );
                            self.disconnect(idx as u16);
                        }
                        return;
                    }
                    Some(Ok(frame)) => frame,
                };

                let verdict = {
                    let slot = &mut self.clients[idx];
                    let Some(conn) = slot.conn.as_ref() else {
                        return;
                    };
                    let payload = &slot.rx.as_slice()
                        [FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload_len];
                    handlers::on_frame(&mut slot.meta, &conn.tx, kind, payload, &*self.auth)
                };

                match verdict {
                    FrameVerdict::Continue => {}
                    FrameVerdict::WriteTun => {
                        let payload = &self.clients[idx].rx.as_slice()
                            [FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload_len];
                        if let Err(e) = self.tun.write(payload).await {
                            // Datagram loss is acceptable on this path.
                            warn!("TUN write failed: {}", e);
                        }
                    }
                    FrameVerdict::Close => {
                        self.disconnect(idx as u16);
                        return;
                    }
                }

                self.clients[idx]
                    .rx
                    .consume(FRAME_HEADER_SIZE + payload_len);
            }

            if chunk.is_empty() {
                return;
            }
        }
    }

    // ========================================
    // TUN Broadcast Path
    // ========================================

    /// Replicates one TUN datagram as a `DATA` frame to every
    /// authenticated slot, in slot-index order.
    fn broadcast(&mut self, datagram: &[u8]) {
        let frame = match codec::data_frame(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping oversize TUN datagram: {}", e);
                return;
            }
        };

        trace!(len = datagram.len(), "Broadcasting TUN datagram");

        let mut evicted: Vec<u16> = Vec::new();
        for slot in &mut self.clients {
            if slot.meta.state != ClientState::Authenticated {
                continue;
            }
            let Some(conn) = slot.conn.as_ref() else {
                continue;
            };

            if conn.tx.send_frame(&frame) {
                slot.meta.send_count += 1;
            } else if slot.meta.charge_err() {
                // One slow recipient never aborts the broadcast for the
                // rest.
                evicted.push(slot.meta.slot_idx);
            }
        }

        for idx in evicted {
            warn!(slot = idx, "Error budget exhausted during broadcast, dropping connection");
            self.disconnect(idx);
        }
    }

    // ========================================
    // Disconnect Path
    // ========================================

    /// Terminates a connection and recycles its slot.
    ///
    /// The order is load-bearing: close the socket, clear the slot, and
    /// only then make the index poppable again.
    fn disconnect(&mut self, idx: u16) {
        let slot = &mut self.clients[usize::from(idx)];
        if !slot.meta.in_use {
            return;
        }

        let peer = slot.meta.peer();
        let user = slot.meta.username.clone();

        if let Some(conn) = slot.conn.take() {
            conn.reader.abort();
            drop(conn.tx);
        }
        slot.reset();
        self.stack.push(idx);
        self.assert_slot_conservation();

        info!(peer = %peer, user = %user, slot = idx, "Connection closed");
    }

    // ========================================
    // Housekeeping
    // ========================================

    fn teardown(&mut self) {
        let open: Vec<u16> = self
            .clients
            .iter()
            .filter(|s| s.meta.in_use)
            .map(|s| s.meta.slot_idx)
            .collect();

        if !open.is_empty() {
            info!("Closing {} remaining connections", open.len());
        }
        for idx in open {
            self.disconnect(idx);
        }
        info!("Reactor stopped");
    }

    fn log_stats(&self) {
        debug!(
            online = self.online_count(),
            free_slots = self.stack.free_count(),
            "Reactor heartbeat"
        );
    }

    fn assert_slot_conservation(&self) {
        debug_assert_eq!(
            self.stack.free_count() + self.online_count(),
            usize::from(self.max_conn),
            "slot conservation violated"
        );
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("max_conn", &self.max_conn)
            .field("online", &self.online_count())
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

// ============================================
// Reader Task
// ============================================

/// Moves bytes from one client socket into the reactor's event channel.
fn spawn_reader(
    mut half: OwnedReadHalf,
    idx: u16,
    generation: u64,
    events: mpsc::Sender<ReaderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; FRAME_MAX_SIZE];
        loop {
            match half.read(&mut buf).await {
                Ok(0) => {
                    let _ = events
                        .send(ReaderEvent::Closed {
                            idx,
                            generation,
                            reason: CloseReason::Eof,
                        })
                        .await;
                    return;
                }
                Ok(n) => {
                    let bytes = Bytes::copy_from_slice(&buf[..n]);
                    if events
                        .send(ReaderEvent::Data {
                            idx,
                            generation,
                            bytes,
                        })
                        .await
                        .is_err()
                    {
                        // Reactor is gone; nothing left to report to.
                        return;
                    }
                }
                Err(e) => {
                    let _ = events
                        .send(ReaderEvent::Closed {
                            idx,
                            generation,
                            reason: CloseReason::Error(e),
                        })
                        .await;
                    return;
                }
            }
        }
    })
}

// ============================================
// Tests
// ============================================
