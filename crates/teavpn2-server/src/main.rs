// ============================================
// File: crates/teavpn2-server/src/main.rs
// ============================================
//! # TeaVPN2 Server Entry Point
//!
//! ## Creation Reason
//! CLI binary: argument parsing, logging setup, configuration loading
//! with flag overrides, and server execution.
//!
//! ## Usage
//! ```bash
//! # Run with a config file
//! teavpn2-server server --config /etc/teavpn2/server.toml
//!
//! # Override pieces of it from the command line
//! teavpn2-server server --bind-port 55556 --max-conn 64 --verbose=2
//!
//! # Check a config file without starting anything
//! teavpn2-server validate --config /etc/teavpn2/server.toml
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Precedence is: built-in defaults < config file < command line
//! - The process exits non-zero on any startup failure; a signal-driven
//!   stop exits zero
//!
//! ## Last Modified
//! v0.1.0 - Initial CLI implementation

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use teavpn2_server::config::{ServerConfig, SockType, DEFAULT_CONFIG_PATH};
use teavpn2_server::Server;

// ============================================
// CLI Definition
// ============================================

/// TeaVPN2 server application.
#[derive(Parser, Debug)]
#[command(name = "teavpn2-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the VPN server
    Server(ServerArgs),

    /// Validate a configuration file and print the effective settings
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Data directory (credential files live in its users/ subdirectory)
    #[arg(short = 'D', long)]
    data_dir: Option<PathBuf>,

    /// Verbosity (0 = warn, 1 = info, 2 = debug, 3+ = trace)
    #[arg(short, long, value_name = "N", num_args = 0..=1, default_missing_value = "2")]
    verbose: Option<u8>,

    /// Reactor thread count (only 1 is implemented)
    #[arg(long, value_name = "N")]
    thread: Option<u16>,

    /// Socket type
    #[arg(long, value_enum, value_name = "TYPE")]
    sock_type: Option<SockTypeArg>,

    /// Bind address
    #[arg(short = 'H', long, value_name = "IP")]
    bind_addr: Option<IpAddr>,

    /// Bind port
    #[arg(short = 'P', long, value_name = "PORT")]
    bind_port: Option<u16>,

    /// Maximum concurrent clients
    #[arg(short = 'M', long, value_name = "N")]
    max_conn: Option<u16>,

    /// Listen backlog
    #[arg(short = 'B', long, value_name = "N")]
    backlog: Option<u32>,

    /// Disable the encryption flag
    #[arg(long)]
    disable_encryption: bool,

    /// TLS certificate file
    #[arg(long, value_name = "FILE")]
    ssl_cert: Option<PathBuf>,

    /// TLS private key file
    #[arg(long, value_name = "FILE")]
    ssl_priv_key: Option<PathBuf>,

    /// Virtual interface name
    #[arg(short, long, value_name = "NAME")]
    dev: Option<String>,

    /// Interface MTU
    #[arg(short, long, value_name = "MTU")]
    mtu: Option<u16>,

    /// Interface IPv4 address
    #[arg(short = '4', long, value_name = "IP")]
    ipv4: Option<Ipv4Addr>,

    /// Interface IPv4 netmask
    #[arg(short = 'b', long, value_name = "MASK")]
    ipv4_netmask: Option<Ipv4Addr>,
}

/// CLI mirror of [`SockType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SockTypeArg {
    Tcp,
    Udp,
}

impl From<SockTypeArg> for SockType {
    fn from(value: SockTypeArg) -> Self {
        match value {
            SockTypeArg::Tcp => Self::Tcp,
            SockTypeArg::Udp => Self::Udp,
        }
    }
}

// ============================================
// Main
// ============================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Server(args) => cmd_server(args).await,
        Commands::Validate { config } => cmd_validate(config).await,
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

// ============================================
// Commands
// ============================================

async fn cmd_server(args: ServerArgs) -> anyhow::Result<()> {
    // Early logging with the CLI verbosity; re-initialized once the final
    // config is known.
    init_logging(args.verbose.unwrap_or(1));

    let mut cfg = if args.config.exists() {
        ServerConfig::load(&args.config).await?
    } else {
        info!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
        ServerConfig::default()
    };

    apply_overrides(&mut cfg, &args);
    cfg.validate()?;
    init_logging(cfg.sys.verbose);

    let server = Server::new(cfg);
    server.run().await?;
    Ok(())
}

async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    init_logging(0);

    if !config_path.exists() {
        println!("Config file not found: {}", config_path.display());
        println!("The server would run with built-in defaults.");
        return Ok(());
    }

    let cfg = ServerConfig::load(&config_path).await?;

    println!("Configuration is valid");
    println!();
    println!("System:");
    println!("  data_dir:   {}", cfg.sys.data_dir.display());
    println!("  verbose:    {}", cfg.sys.verbose);
    println!("  thread:     {}", cfg.sys.thread);
    println!();
    println!("Socket:");
    println!("  type:       {:?}", cfg.sock.sock_type);
    println!("  bind:       {}", cfg.listen_addr());
    println!("  max_conn:   {}", cfg.sock.max_conn);
    println!("  backlog:    {}", cfg.sock.backlog);
    println!();
    println!("Interface:");
    println!("  dev:        {}", cfg.iface.dev);
    println!("  mtu:        {}", cfg.iface.mtu);
    println!("  ipv4:       {}/{}", cfg.iface.ipv4, cfg.iface_info().prefix_len());

    Ok(())
}

// ============================================
// Helpers
// ============================================

/// Applies command-line overrides on top of file configuration.
fn apply_overrides(cfg: &mut ServerConfig, args: &ServerArgs) {
    if let Some(data_dir) = &args.data_dir {
        cfg.sys.data_dir.clone_from(data_dir);
    }
    if let Some(verbose) = args.verbose {
        cfg.sys.verbose = verbose;
    }
    if let Some(thread) = args.thread {
        cfg.sys.thread = thread;
    }
    if let Some(sock_type) = args.sock_type {
        cfg.sock.sock_type = sock_type.into();
    }
    if let Some(bind_addr) = args.bind_addr {
        cfg.sock.bind_addr = bind_addr;
    }
    if let Some(bind_port) = args.bind_port {
        cfg.sock.bind_port = bind_port;
    }
    if let Some(max_conn) = args.max_conn {
        cfg.sock.max_conn = max_conn;
    }
    if let Some(backlog) = args.backlog {
        cfg.sock.backlog = backlog;
    }
    if args.disable_encryption {
        cfg.sock.use_encrypt = false;
    }
    if let Some(ssl_cert) = &args.ssl_cert {
        cfg.sock.ssl_cert = Some(ssl_cert.clone());
    }
    if let Some(ssl_priv_key) = &args.ssl_priv_key {
        cfg.sock.ssl_priv_key = Some(ssl_priv_key.clone());
    }
    if let Some(dev) = &args.dev {
        cfg.iface.dev.clone_from(dev);
    }
    if let Some(mtu) = args.mtu {
        cfg.iface.mtu = mtu;
    }
    if let Some(ipv4) = args.ipv4 {
        cfg.iface.ipv4 = ipv4;
    }
    if let Some(netmask) = args.ipv4_netmask {
        cfg.iface.ipv4_netmask = netmask;
    }
}

/// Initializes the tracing subscriber for the given verbosity.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .ok();
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_server_flags() {
        let cli = Cli::parse_from([
            "teavpn2-server",
            "server",
            "--bind-addr",
            "127.0.0.1",
            "--bind-port",
            "44444",
            "--max-conn",
            "64",
            "--sock-type",
            "tcp",
            "--dev",
            "tvpn0",
            "--disable-encryption",
            "--verbose=3",
        ]);

        let Commands::Server(args) = cli.command else {
            panic!("expected server subcommand");
        };
        assert_eq!(args.bind_port, Some(44444));
        assert_eq!(args.max_conn, Some(64));
        assert_eq!(args.sock_type, Some(SockTypeArg::Tcp));
        assert_eq!(args.dev.as_deref(), Some("tvpn0"));
        assert!(args.disable_encryption);
        assert_eq!(args.verbose, Some(3));
    }

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "teavpn2-server",
            "server",
            "--bind-port",
            "1234",
            "--max-conn",
            "2",
            "--ipv4",
            "10.9.9.1",
            "--disable-encryption",
        ]);
        let Commands::Server(args) = cli.command else {
            panic!("expected server subcommand");
        };

        let mut cfg = ServerConfig::default();
        apply_overrides(&mut cfg, &args);

        assert_eq!(cfg.sock.bind_port, 1234);
        assert_eq!(cfg.sock.max_conn, 2);
        assert_eq!(cfg.iface.ipv4, Ipv4Addr::new(10, 9, 9, 1));
        assert!(!cfg.sock.use_encrypt);
    }

    #[test]
    fn test_bare_verbose_flag_means_debug() {
        let cli = Cli::parse_from(["teavpn2-server", "server", "--verbose"]);
        let Commands::Server(args) = cli.command else {
            panic!("expected server subcommand");
        };
        assert_eq!(args.verbose, Some(2));
    }
}
