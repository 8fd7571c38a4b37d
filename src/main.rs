//! wsgate binary: a WebSocket echo server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use wsgate::config::ConfigLoader;
use wsgate::handler::{Handler, HandlerContext, HandlerResult};
use wsgate::server::{Listener, TlsIdentity};
use wsgate::session::{LogEvent, SessionError};

/// wsgate - RFC 6455 WebSocket echo server
#[derive(Parser, Debug)]
#[command(name = "wsgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "wsgate.toml")]
    config: PathBuf,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

/// Echoes every message back to its sender.
#[derive(Debug, Default)]
struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn on_text_message(&mut self, ctx: &HandlerContext, text: &str) -> HandlerResult {
        ctx.session().send_text(text).await?;
        Ok(())
    }

    async fn on_binary_message(&mut self, ctx: &HandlerContext, data: &[u8]) -> HandlerResult {
        ctx.session().send_binary(data).await?;
        Ok(())
    }

    async fn on_log(&mut self, _ctx: &HandlerContext, event: &LogEvent) {
        match event.level {
            Level::ERROR | Level::WARN => warn!(session = %event.session, "{}", event.message),
            Level::INFO => info!(session = %event.session, "{}", event.message),
            _ => debug!(session = %event.session, "{}", event.message),
        }
    }

    async fn on_error(&mut self, ctx: &HandlerContext, error: &SessionError) {
        debug!(session = %ctx.session().id(), error = %error, "Session error");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("wsgate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ConfigLoader::new()
        .load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.listener.port = port;
    }

    let tls = match &config.tls {
        Some(tls) => Some(TlsIdentity::from_pem_files(&tls.cert_path, &tls.key_path)?),
        None => None,
    };

    let mut listener = Listener::bind(config).await?;
    if let Some(identity) = &tls {
        listener = listener.with_tls(identity)?;
    }
    info!(address = %listener.local_addr(), tls = tls.is_some(), "Serving");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    listener.serve::<Echo>(cancel).await?;
    info!("Shutdown complete");
    Ok(())
}
