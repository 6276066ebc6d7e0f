//! Logcast Daemon - live job log server
//!
//! Receives log lines from running jobs on a Unix socket and streams them to
//! browsers. Each job run is identified by organization, repository,
//! review-request number and project; a viewer opening
//! `/jobs/{org}/{repo}/{pull}/{project}` gets everything printed so far and
//! then every new line as it arrives.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:8080, $XDG_RUNTIME_DIR/logcast/ingest.sock)
//! logcast-daemon
//!
//! # Public listener mounted under a prefix
//! logcast-daemon --listen 0.0.0.0:8080 --base-path /logs
//!
//! # With config file
//! logcast-daemon --config /etc/logcast/config.toml
//!
//! # Verbose logging
//! RUST_LOG=debug logcast-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod config;
mod ingest;
mod routes;
mod server;
mod templates;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use logcast_core::CancellationToken;

use config::{load_config, ConfigOverrides};
use server::DaemonServer;

/// Logcast Daemon - live job log server
#[derive(Parser, Debug)]
#[command(name = "logcast-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "LOGCAST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long = "listen", value_name = "ADDR")]
    listen_addr: Option<SocketAddr>,

    /// Route prefix (for running behind a reverse proxy)
    #[arg(long, value_name = "PATH")]
    base_path: Option<String>,

    /// Unix socket path for job log events
    #[arg(short = 's', long, value_name = "PATH")]
    ingest_socket: Option<PathBuf>,

    /// Pause between lines sent to one viewer, in milliseconds
    #[arg(long, value_name = "MS")]
    throttle_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "LOGCAST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen_addr: self.listen_addr,
            base_path: self.base_path.clone(),
            ingest_socket: self.ingest_socket.clone(),
            throttle_ms: self.throttle_ms,
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("logcast_daemon={level},logcast_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Cancel `shutdown` on SIGTERM or SIGINT
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
            () = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Logcast daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(&args.overrides());
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        file = ?config.config_file_path,
        listen_addr = %config.listen_addr,
        ingest_socket = %config.ingest_socket.display(),
        "Configuration resolved"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let result = DaemonServer::new(config).run(shutdown).await;

    match result {
        Ok(()) => {
            info!("Logcast daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_cli_flags_become_overrides() {
        let args = Args::parse_from([
            "logcast-daemon",
            "--listen",
            "0.0.0.0:9000",
            "--base-path",
            "/logs",
            "--throttle-ms",
            "0",
        ]);
        let overrides = args.overrides();

        assert_eq!(overrides.listen_addr, Some("0.0.0.0:9000".parse().unwrap()));
        assert_eq!(overrides.base_path.as_deref(), Some("/logs"));
        assert_eq!(overrides.throttle_ms, Some(0));
        assert!(overrides.ingest_socket.is_none());
    }

    #[test]
    fn test_bad_listen_flag_is_rejected() {
        assert!(Args::try_parse_from(["logcast-daemon", "--listen", "nowhere"]).is_err());
    }
}
