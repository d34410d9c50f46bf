use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::field::Empty;
use tracing::{debug, info_span, Instrument, Span};
use uuid::Uuid;

use super::handler::Handler;
use super::interceptor::intercept;
use crate::config::ListenerState;

/// Content type of a TLS handshake record, the first byte of every ClientHello.
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tls,
    Plain,
}

pub fn sniff(first_byte: u8) -> Protocol {
    if first_byte == TLS_HANDSHAKE_RECORD {
        Protocol::Tls
    } else {
        Protocol::Plain
    }
}

/// Per connection facts, attached to every request served on it.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub remote_addr: SocketAddr,
    pub secure: bool,
    pub accepted_at: Instant,
}

/// Serves one accepted socket until it closes. Failures stay local to it.
pub async fn handle_connection<H: Handler>(
    stream: TcpStream,
    remote_addr: SocketAddr,
    state: Arc<ListenerState>,
    handler: Arc<H>,
) {
    let info = ConnectionInfo {
        id: Uuid::new_v4(),
        remote_addr,
        secure: false,
        accepted_at: Instant::now(),
    };
    let span = info_span!("conn", id = %info.id, peer = %remote_addr, secure = Empty);
    async move {
        match serve(stream, info, state, handler).await {
            Ok(()) => debug!("connection closed"),
            Err(e) => debug!("connection dropped: {:#}", e),
        }
    }
    .instrument(span)
    .await
}

async fn serve<H: Handler>(
    stream: TcpStream,
    mut info: ConnectionInfo,
    state: Arc<ListenerState>,
    handler: Arc<H>,
) -> anyhow::Result<()> {
    let mut first = [0u8; 1];
    let peeked = tokio::time::timeout(FIRST_BYTE_TIMEOUT, stream.peek(&mut first))
        .await
        .context("no data before timeout")?
        .context("peek failed")?;
    if peeked == 0 {
        return Ok(());
    }

    match sniff(first[0]) {
        Protocol::Tls => {
            let acceptor = state
                .tls
                .clone()
                .ok_or_else(|| anyhow!("TLS client hello but no certificate configured"))?;
            let stream = acceptor
                .accept(stream)
                .await
                .context("TLS handshake failed")?;
            info.secure = true;
            Span::current().record("secure", true);
            debug!("serving");
            serve_http(stream, info, state, handler).await
        }
        Protocol::Plain => {
            Span::current().record("secure", false);
            debug!("serving");
            serve_http(stream, info, state, handler).await
        }
    }
}

async fn serve_http<S, H>(
    io: S,
    info: ConnectionInfo,
    state: Arc<ListenerState>,
    handler: Arc<H>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: Handler,
{
    let service = service_fn(move |mut req: Request<Body>| {
        req.extensions_mut().insert(info.clone());
        let state = state.clone();
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(intercept(req, state, handler).await) }
    });
    Http::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .context("HTTP connection error")
}
