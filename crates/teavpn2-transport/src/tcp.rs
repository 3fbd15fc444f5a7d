// ============================================
// File: crates/teavpn2-transport/src/tcp.rs
// ============================================
//! # TCP Listener Setup
//!
//! ## Creation Reason
//! Builds the listen socket with the options the server core relies on:
//! `SO_REUSEADDR` so restarts do not fight TIME_WAIT, an explicit backlog,
//! and `TCP_NODELAY` on every accepted stream so small control frames are
//! not held back by Nagle.
//!
//! ## Last Modified
//! v0.1.0 - Initial listener setup

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::info;

use crate::error::{Result, TransportError};

/// Binds a listening socket with `SO_REUSEADDR` and the given backlog.
///
/// # Errors
/// Returns `BindFailed` if the socket cannot be created, configured,
/// bound, or put into listening state.
pub fn listen(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let bind_err = |e: std::io::Error| TransportError::BindFailed {
        addr,
        reason: e.to_string(),
    };

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;

    let listener = socket.listen(backlog).map_err(bind_err)?;
    info!(%addr, backlog, "TCP listener bound");
    Ok(listener)
}

/// Applies per-connection socket options to an accepted stream.
///
/// # Errors
/// Returns the underlying I/O error if `TCP_NODELAY` cannot be set.
pub fn prepare_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listen_ephemeral() {
        let listener = listen("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_prepare_stream_sets_nodelay() {
        let listener = listen("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        let client = client.unwrap();

        prepare_stream(&server).unwrap();
        assert!(server.nodelay().unwrap());
        drop(client);
    }
}
