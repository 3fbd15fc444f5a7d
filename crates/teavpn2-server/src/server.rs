// ============================================
// File: crates/teavpn2-server/src/server.rs
// ============================================
//! # Server Lifecycle Controller
//!
//! ## Creation Reason
//! Constructs and tears down the server's resources in dependency order
//! and owns the shutdown channel the signal handlers fire into.
//!
//! ## Bring-Up Order
//! 1. Authenticator (credential directory)
//! 2. TUN device creation + interface provisioning
//! 3. Listen socket
//! 4. Signal watcher
//! 5. Reactor loop (blocks until shutdown)
//!
//! Tear-down runs in reverse and tolerates partially-initialized state.
//!
//! ## ⚠️ Important Note for Next Developer
//! - The reactor owns the listener and every client socket; dropping it
//!   closes them all
//! - `down()` failures during teardown are logged, never propagated - a
//!   half-removed route must not mask the real exit reason
//!
//! ## Last Modified
//! v0.1.0 - Initial lifecycle implementation

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use teavpn2_transport::tcp as tcp_setup;
use teavpn2_transport::TunDevice;

use crate::config::{ServerConfig, SockType};
use crate::error::{Result, ServerError};
use crate::reactor::Reactor;
use crate::services::auth::FileAuthenticator;

// ============================================
// Server
// ============================================

/// Ties configuration, transport, and the reactor together for one run.
///
/// # Lifecycle
/// 1. `Server::new(config)`
/// 2. `server.run().await` until a signal or fatal data-plane error
/// 3. Resources are released before `run` returns
pub struct Server {
    cfg: ServerConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Creates a server from validated configuration.
    #[must_use]
    pub fn new(cfg: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { cfg, shutdown_tx }
    }

    /// Triggers shutdown programmatically (same path as a signal).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Runs the server until shutdown.
    ///
    /// # Errors
    /// Returns an error when startup fails; a signal-driven exit returns
    /// `Ok`.
    pub async fn run(&self) -> Result<()> {
        self.cfg.validate()?;

        if self.cfg.sock.sock_type == SockType::Udp {
            return Err(ServerError::config_invalid(
                "sock.type",
                "UDP transport is not implemented yet; use \"tcp\"",
            ));
        }
        if self.cfg.sys.thread > 1 {
            warn!(
                requested = self.cfg.sys.thread,
                "Multi-reactor mode is not available in this build; running a single reactor"
            );
        }
        if self.cfg.sock.use_encrypt {
            debug!("Encryption flag is set but the TCP data plane is cleartext in this build");
        }

        info!("Starting TeaVPN2 server v{}", env!("CARGO_PKG_VERSION"));

        let auth = Arc::new(FileAuthenticator::new(self.cfg.users_dir()));

        let tun = self.init_tun().await?;

        let listener = tcp_setup::listen(self.cfg.listen_addr(), self.cfg.sock.backlog)
            .map_err(|e| ServerError::startup_failed(e.to_string()))?;
        info!(
            "Listening on {}:{}...",
            self.cfg.sock.bind_addr, self.cfg.sock.bind_port
        );

        let signal_task = spawn_signal_watcher(self.shutdown_tx.clone());

        let mut reactor = Reactor::new(&self.cfg, listener, Arc::clone(&tun), auth);
        let result = reactor.run(self.shutdown_tx.subscribe()).await;

        // Reverse order: connections and listener die with the reactor,
        // then the interface goes down.
        drop(reactor);
        if let Err(e) = tun.down().await {
            warn!("Interface teardown failed: {}", e);
        }
        signal_task.abort();

        info!("Server shutdown complete");
        result
    }

    #[cfg(target_os = "linux")]
    async fn init_tun(&self) -> Result<Arc<dyn TunDevice>> {
        use teavpn2_transport::LinuxTun;

        let tun = LinuxTun::create(self.cfg.iface_info())
            .map_err(|e| ServerError::startup_failed(e.to_string()))?;
        tun.up()
            .await
            .map_err(|e| ServerError::startup_failed(e.to_string()))?;
        Ok(Arc::new(tun))
    }

    #[cfg(not(target_os = "linux"))]
    async fn init_tun(&self) -> Result<Arc<dyn TunDevice>> {
        Err(ServerError::startup_failed(
            "the TUN data plane requires Linux",
        ))
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listen_addr", &self.cfg.listen_addr())
            .field("dev", &self.cfg.iface.dev)
            .field("max_conn", &self.cfg.sock.max_conn)
            .finish()
    }
}

// ============================================
// Signal Handling
// ============================================

/// Forwards INT/HUP/TERM/QUIT into the shutdown channel.
#[cfg(unix)]
fn spawn_signal_watcher(shutdown_tx: broadcast::Sender<()>) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let installed = (|| {
            Ok::<_, std::io::Error>((
                signal(SignalKind::interrupt())?,
                signal(SignalKind::hangup())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::quit())?,
            ))
        })();

        let (mut sigint, mut sighup, mut sigterm, mut sigquit) = match installed {
            Ok(sigs) => sigs,
            Err(e) => {
                warn!("Cannot install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sighup.recv() => {}
            _ = sigterm.recv() => {}
            _ = sigquit.recv() => {}
        }

        info!("Interrupt signal received");
        let _ = shutdown_tx.send(());
    })
}

#[cfg(not(unix))]
fn spawn_signal_watcher(shutdown_tx: broadcast::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt signal received");
            let _ = shutdown_tx.send(());
        }
    })
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_type_is_refused() {
        let cfg = ServerConfig::from_toml_str("[sock]\ntype = \"udp\"\n").unwrap();
        let server = Server::new(cfg);

        match server.run().await {
            Err(ServerError::ConfigInvalid { field, .. }) => assert_eq!(field, "sock.type"),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }
}
