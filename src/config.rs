use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::tls::load_acceptor;
use crate::ws::consts::{PERMESSAGE_DEFLATE, SUPPORTED_VERSIONS};

/// Server settings as read from a TOML file; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// PEM file with the certificate chain, and the key unless `keyfile` is set.
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub websocket: WebSocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            certfile: None,
            keyfile: None,
            websocket: WebSocketConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Subprotocols the server speaks; empty means echo whatever the client asks for.
    pub protocols: Vec<String>,
    pub compression_token: String,
    pub compression_level: u32,
    pub max_message_size: u64,
    pub recv_timeout_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            protocols: Vec::new(),
            compression_token: PERMESSAGE_DEFLATE.to_string(),
            compression_level: 7,
            max_message_size: 16 * 1024 * 1024,
            recv_timeout_ms: 1000,
        }
    }
}

impl WebSocketConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

/// Listener wide state, shared read-only by every connection.
pub struct ListenerState {
    pub versions: &'static [&'static str],
    pub websocket: WebSocketConfig,
    pub tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerState")
            .field("versions", &self.versions)
            .field("websocket", &self.websocket)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl ListenerState {
    pub fn new(websocket: WebSocketConfig, tls: Option<TlsAcceptor>) -> Self {
        ListenerState {
            versions: &SUPPORTED_VERSIONS,
            websocket,
            tls,
        }
    }

    /// Unusable TLS material only disables HTTPS, the listener still serves HTTP.
    pub fn from_config(config: &ServerConfig) -> Self {
        let tls = config.certfile.as_deref().and_then(|certfile| {
            match load_acceptor(certfile, config.keyfile.as_deref()) {
                Ok(acceptor) => {
                    info!(certfile = %certfile.display(), "HTTPS enabled");
                    Some(acceptor)
                }
                Err(e) => {
                    warn!("HTTPS disabled: {:#}", e);
                    None
                }
            }
        });
        ListenerState::new(config.websocket.clone(), tls)
    }
}
