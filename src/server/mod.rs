use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

mod acceptor;
mod handler;
mod interceptor;

pub use acceptor::{handle_connection, sniff, ConnectionInfo, Protocol, TLS_HANDSHAKE_RECORD};
pub use handler::Handler;
pub use interceptor::{intercept, take_websocket, WebSocketSlot};

use crate::config::ListenerState;

/// Accepts connections until `shutdown` resolves, one task per connection.
///
/// HTTP and HTTPS share the listening socket; see [`sniff`].
pub async fn serve<H, F>(
    listener: TcpListener,
    state: Arc<ListenerState>,
    handler: H,
    shutdown: F,
) -> anyhow::Result<()>
where
    H: Handler,
    F: Future<Output = ()>,
{
    let handler = Arc::new(handler);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("listener stopped");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        remote_addr,
                        state.clone(),
                        handler.clone(),
                    ));
                }
                Err(e) => {
                    // usually out of file descriptors, give in-flight connections a moment
                    warn!("accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
