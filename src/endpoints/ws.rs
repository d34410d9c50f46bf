use std::time::Duration;

use hyper::{Body, Request, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::server::take_websocket;
use crate::ws::WebSocket;

async fn echo(ws: &mut WebSocket, timeout: Duration) {
    let compress = ws.compression();
    while !ws.is_closed() {
        match ws.recv(timeout).await {
            Ok(Some(message)) => {
                debug!(binary = message.is_binary(), len = message.as_bytes().len(), "echo");
                if let Err(e) = ws.send_message(&message, compress).await {
                    warn!("websocket send error: {}", e);
                    break;
                }
            }
            // timed out, check again whether the socket is still open
            Ok(None) => {}
            Err(e) => {
                warn!("websocket recv error: {}", e);
                break;
            }
        }
    }
}

/// Echoes every message back until the peer closes.
pub async fn handle_ws(mut req: Request<Body>, timeout: Duration) -> Response<Body> {
    let mut ws = match take_websocket(&mut req) {
        Some(ws) => ws,
        None => {
            let mut response = Response::new(Body::from("WebSocket not handled by server"));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };
    info!("websocket connected");
    echo(&mut ws, timeout).await;
    info!(reason = ?ws.close_reason(), "websocket closed");
    Response::new(Body::empty())
}
