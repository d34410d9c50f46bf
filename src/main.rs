use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hyper::{Body, Request};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hyper_ws_mux::config::{ListenerState, ServerConfig};
use hyper_ws_mux::endpoints::request_router;
use hyper_ws_mux::server::serve;

/// HTTP, HTTPS and WebSocket on a single port.
#[derive(Debug, Parser)]
#[command(name = "hyper-ws-mux", version)]
struct Cli {
    /// TOML config file; command line values take precedence
    #[arg(long, env = "WS_MUX_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "WS_MUX_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "WS_MUX_PORT")]
    port: Option<u16>,

    /// PEM certificate chain, may contain the private key as well
    #[arg(long, env = "WS_MUX_CERTFILE")]
    certfile: Option<PathBuf>,

    #[arg(long, env = "WS_MUX_KEYFILE")]
    keyfile: Option<PathBuf>,

    /// WebSocket subprotocol to accept, may be repeated
    #[arg(long = "protocol")]
    protocols: Vec<String>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        let ip = match &self.host {
            Some(host) => host
                .parse::<IpAddr>()
                .with_context(|| format!("invalid host {}", host))?,
            None => config.bind.ip(),
        };
        config.bind = SocketAddr::new(ip, self.port.unwrap_or_else(|| config.bind.port()));
        if self.certfile.is_some() {
            config.certfile = self.certfile;
        }
        if self.keyfile.is_some() {
            config.keyfile = self.keyfile;
        }
        if !self.protocols.is_empty() {
            config.websocket.protocols = self.protocols;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = cli.into_config()?;
    let state = Arc::new(ListenerState::from_config(&config));
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let scheme = if state.tls.is_some() { "http(s)" } else { "http" };
    info!("Listening at {}://{}", scheme, listener.local_addr()?);

    let ws_timeout = config.websocket.recv_timeout();
    let router = move |req: Request<Body>| request_router(req, ws_timeout);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    serve(listener, state, router, shutdown).await
}
