//! End-to-end tests: a real reactor on a loopback listener, a mock TUN
//! device, and clients speaking the wire protocol over TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use teavpn2_proto::codec::{client_auth_frame, client_data_frame, client_hello_frame};
use teavpn2_proto::messages::{IFACE_ASSIGN_SIZE, PAYLOAD_MAX};
use teavpn2_proto::{AuthPayload, IfaceAssign, ServerPacketKind};
use teavpn2_server::config::ServerConfig;
use teavpn2_server::services::auth::{AuthOutcome, Authenticator};
use teavpn2_server::Reactor;
use teavpn2_transport::traits::TunDevice;
use teavpn2_transport::{IfaceInfo, MockTun};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================
// Harness
// ============================================

/// Accepts `alice`/`p` with a fixed assignment, refuses everyone else.
struct TableAuth;

impl Authenticator for TableAuth {
    fn authenticate(&self, username: &str, password: &str) -> AuthOutcome {
        if username == "alice" && password == "p" {
            AuthOutcome::Assigned(expected_assignment())
        } else {
            AuthOutcome::Rejected
        }
    }
}

fn expected_assignment() -> IfaceAssign {
    IfaceAssign::new("teavpn2-srv", "10.8.8.2", "255.255.255.0", 1480).unwrap()
}

struct TestServer {
    addr: SocketAddr,
    tun: Arc<MockTun>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(max_conn: u16) -> Self {
        let mut cfg = ServerConfig::default();
        cfg.sock.max_conn = max_conn;

        let listener =
            teavpn2_transport::tcp::listen("127.0.0.1:0".parse().unwrap(), 8).unwrap();
        let tun = Arc::new(MockTun::new(IfaceInfo::new("teavpn2-srv")));

        let mut reactor = Reactor::new(
            &cfg,
            listener,
            Arc::clone(&tun) as Arc<dyn TunDevice>,
            Arc::new(TableAuth),
        );
        let addr = reactor.local_addr().unwrap();

        let (shutdown, _) = broadcast::channel(1);
        let rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            let _ = reactor.run(rx).await;
        });

        Self {
            addr,
            tun,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = timeout(IO_TIMEOUT, self.task).await;
    }
}

// ============================================
// Client Helpers
// ============================================

async fn connect(addr: SocketAddr) -> TcpStream {
    timeout(IO_TIMEOUT, TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .expect("connect failed")
}

/// Reads one complete server frame.
async fn read_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    timeout(IO_TIMEOUT, stream.read_exact(&mut header))
        .await
        .expect("frame header timed out")
        .expect("frame header read failed");

    let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
    assert!(len <= PAYLOAD_MAX, "server sent an oversize frame");

    let mut payload = vec![0u8; len];
    timeout(IO_TIMEOUT, stream.read_exact(&mut payload))
        .await
        .expect("frame payload timed out")
        .expect("frame payload read failed");

    (header[0], payload)
}

/// Asserts the server closes the connection without sending anything.
async fn expect_silent_close(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    match timeout(IO_TIMEOUT, stream.read(&mut byte)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!("expected close, server sent {n} byte(s)"),
        Ok(Err(_)) => {} // reset also counts as closed
        Err(_) => panic!("connection was not closed"),
    }
}

/// HELLO → BANNER exchange.
async fn do_hello(stream: &mut TcpStream) {
    stream.write_all(&client_hello_frame()).await.unwrap();
    let (kind, payload) = read_frame(stream).await;
    assert_eq!(kind, ServerPacketKind::Banner.as_byte());
    assert_eq!(payload, [0, 0, 1, 0, 0, 1, 0, 0, 1]);
}

/// AUTH exchange; returns the server's reply frame.
async fn do_auth(stream: &mut TcpStream, user: &str, pass: &str) -> (u8, Vec<u8>) {
    let auth = AuthPayload::new(user, pass).unwrap();
    stream.write_all(&client_auth_frame(&auth)).await.unwrap();
    read_frame(stream).await
}

/// A minimal 20-byte IPv4 header.
fn ipv4_datagram(len: usize) -> Vec<u8> {
    assert!(len >= 20);
    let mut dgram = vec![0u8; len];
    dgram[0] = 0x45;
    dgram[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    dgram[8] = 64; // TTL
    dgram[9] = 17; // UDP
    dgram[12..16].copy_from_slice(&[10, 8, 8, 2]);
    dgram[16..20].copy_from_slice(&[10, 8, 8, 1]);
    dgram
}

// ============================================
// Scenarios
// ============================================

#[tokio::test]
async fn test_handshake_auth_and_tunnel_write() {
    let srv = TestServer::start(4).await;
    let mut client = connect(srv.addr).await;

    do_hello(&mut client).await;

    let (kind, payload) = do_auth(&mut client, "alice", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthOk.as_byte());
    assert_eq!(payload.len(), IFACE_ASSIGN_SIZE);
    let assign = IfaceAssign::decode(&mut payload.as_slice()).unwrap();
    assert_eq!(assign, expected_assignment());

    // A tunneled datagram must land on the TUN write sink byte-for-byte.
    let dgram = ipv4_datagram(20);
    client
        .write_all(&client_data_frame(&dgram).unwrap())
        .await
        .unwrap();

    let written = timeout(IO_TIMEOUT, srv.tun.next_written())
        .await
        .expect("datagram never reached the TUN device");
    assert_eq!(written, dgram);

    srv.stop().await;
}

#[tokio::test]
async fn test_auth_rejection_recycles_slot() {
    // One slot total, so reuse is only possible if rejection releases it.
    let srv = TestServer::start(1).await;

    let mut mallory = connect(srv.addr).await;
    do_hello(&mut mallory).await;

    let (kind, payload) = do_auth(&mut mallory, "mallory", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthReject.as_byte());
    assert!(payload.is_empty());
    expect_silent_close(&mut mallory).await;

    // The slot is back on the free stack; a fresh client gets it.
    let mut next = connect(srv.addr).await;
    do_hello(&mut next).await;

    srv.stop().await;
}

#[tokio::test]
async fn test_slot_exhaustion_drops_extra_client() {
    let srv = TestServer::start(2).await;

    let mut first = connect(srv.addr).await;
    do_hello(&mut first).await;
    let mut second = connect(srv.addr).await;
    do_hello(&mut second).await;

    // Both slots taken: the third connection is closed before the server
    // writes a single byte.
    let mut third = connect(srv.addr).await;
    expect_silent_close(&mut third).await;

    // The first two are unaffected.
    let (kind, _) = do_auth(&mut first, "alice", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthOk.as_byte());

    srv.stop().await;
}

#[tokio::test]
async fn test_auth_before_hello_is_fatal() {
    let srv = TestServer::start(2).await;
    let mut client = connect(srv.addr).await;

    let auth = AuthPayload::new("alice", "p").unwrap();
    client.write_all(&client_auth_frame(&auth)).await.unwrap();

    // No AUTH_OK, no AUTH_REJECT; just a close.
    expect_silent_close(&mut client).await;

    srv.stop().await;
}

#[tokio::test]
async fn test_corrupt_length_keeps_connection() {
    let srv = TestServer::start(2).await;
    let mut client = connect(srv.addr).await;

    do_hello(&mut client).await;

    // IFACE_DATA header claiming 65535 payload bytes: the frame is
    // discarded and charged, but the connection survives.
    client.write_all(&[0x04, 0x00, 0xFF, 0xFF]).await.unwrap();

    // Everything buffered alongside a corrupt frame is discarded with it,
    // so let the server consume the bad header before sending more.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The receive buffer was reset, so a clean auth still goes through.
    let (kind, _) = do_auth(&mut client, "alice", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthOk.as_byte());

    srv.stop().await;
}

#[tokio::test]
async fn test_tun_broadcast_reaches_only_authenticated() {
    let srv = TestServer::start(3).await;

    let mut a = connect(srv.addr).await;
    do_hello(&mut a).await;
    let (kind, _) = do_auth(&mut a, "alice", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthOk.as_byte());

    let mut b = connect(srv.addr).await;
    do_hello(&mut b).await;
    let (kind, _) = do_auth(&mut b, "alice", "p").await;
    assert_eq!(kind, ServerPacketKind::AuthOk.as_byte());

    // c greets but never authenticates.
    let mut c = connect(srv.addr).await;
    do_hello(&mut c).await;

    let dgram = ipv4_datagram(64);
    srv.tun.inject(dgram.clone());

    // Exactly one DATA frame for each authenticated client.
    for client in [&mut a, &mut b] {
        let (kind, payload) = read_frame(client).await;
        assert_eq!(kind, ServerPacketKind::Data.as_byte());
        assert_eq!(payload, dgram);
    }

    // And nothing for the unauthenticated one.
    let mut byte = [0u8; 1];
    let quiet = timeout(Duration::from_millis(300), c.read(&mut byte)).await;
    assert!(quiet.is_err(), "unauthenticated client received data");

    srv.stop().await;
}

#[tokio::test]
async fn test_trickled_handshake() {
    // The same handshake works when every byte arrives alone.
    let srv = TestServer::start(2).await;
    let mut client = connect(srv.addr).await;

    for byte in client_hello_frame().iter() {
        client.write_all(&[*byte]).await.unwrap();
        client.flush().await.unwrap();
    }

    let (kind, payload) = read_frame(&mut client).await;
    assert_eq!(kind, ServerPacketKind::Banner.as_byte());
    assert_eq!(payload.len(), 9);

    srv.stop().await;
}

#[tokio::test]
async fn test_client_close_frame_releases_slot() {
    let srv = TestServer::start(1).await;

    let mut client = connect(srv.addr).await;
    do_hello(&mut client).await;
    client
        .write_all(&[0x06, 0x00, 0x00, 0x00]) // CLOSE, empty payload
        .await
        .unwrap();
    expect_silent_close(&mut client).await;

    let mut next = connect(srv.addr).await;
    do_hello(&mut next).await;

    srv.stop().await;
}
